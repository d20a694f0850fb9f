//! Core traits for faktura abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// INVOICE REPOSITORY
// =============================================================================

/// Response for listing invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListInvoicesResponse {
    pub invoices: Vec<Invoice>,
    pub total: i64,
}

/// Invoice selection criteria for report generation.
///
/// The date window matches on `invoice_date`, falling back to the upload
/// timestamp when extraction produced no date.
#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub project_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
}

/// Repository for invoice lifecycle operations.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Pre-create an invoice row in `uploading` status.
    async fn insert(&self, req: CreateInvoiceRequest) -> Result<Invoice>;

    /// Fetch a full invoice by ID.
    async fn fetch(&self, id: Uuid) -> Result<Invoice>;

    /// List invoices for an organization, newest first.
    async fn list(&self, organization_id: Uuid, req: ListInvoicesRequest)
        -> Result<ListInvoicesResponse>;

    /// Set the processing status without touching other fields.
    async fn set_status(&self, id: Uuid, status: InvoiceStatus) -> Result<()>;

    /// Move an invoice to `error` status with a human-readable note.
    async fn mark_error(&self, id: Uuid, message: &str) -> Result<()>;

    /// Write extracted fields and confidence scores, moving the invoice to
    /// `processed` with `requires_confirmation` set.
    async fn apply_extraction(
        &self,
        id: Uuid,
        payload: &ExtractionCallback,
        confidence: &BTreeMap<String, f64>,
    ) -> Result<Invoice>;

    /// Confirm a `processed` invoice with user-reviewed field values.
    /// Fails with an invalid-status error for any other status.
    async fn confirm(&self, id: Uuid, user_id: Uuid, req: &ConfirmInvoiceRequest)
        -> Result<Invoice>;

    /// Hand a `confirmed` invoice off to the accountant.
    async fn mark_sent(&self, id: Uuid) -> Result<Invoice>;

    /// Check if an invoice exists.
    async fn exists(&self, id: Uuid) -> Result<bool>;

    /// Aggregate VAT totals by direction over a date window.
    async fn pdv_summary(
        &self,
        organization_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<PdvSummary>;

    /// Fetch invoices matching a report filter, oldest first.
    async fn list_for_report(
        &self,
        organization_id: Uuid,
        filter: &ReportFilter,
    ) -> Result<Vec<Invoice>>;
}

// =============================================================================
// PROJECT REPOSITORY
// =============================================================================

/// Repository for project CRUD.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn insert(
        &self,
        organization_id: Uuid,
        created_by: Uuid,
        req: CreateProjectRequest,
    ) -> Result<Project>;

    async fn fetch(&self, id: Uuid) -> Result<Project>;

    /// List projects for an organization together with invoice counts.
    async fn list(&self, organization_id: Uuid) -> Result<Vec<ProjectSummary>>;

    async fn update(&self, id: Uuid, req: UpdateProjectRequest) -> Result<Project>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Whether a project code is already taken within the organization.
    async fn code_exists(&self, organization_id: Uuid, code: &str) -> Result<bool>;
}

// =============================================================================
// REPORT REPOSITORY
// =============================================================================

/// Repository for report artifact rows.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn insert(
        &self,
        organization_id: Uuid,
        created_by: Uuid,
        req: &CreateReportRequest,
    ) -> Result<Report>;

    async fn fetch(&self, id: Uuid) -> Result<Report>;

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Report>>;

    /// Mark a report completed and record where its file is served from.
    async fn mark_completed(&self, id: Uuid, file_url: &str) -> Result<Report>;

    async fn mark_error(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// PROFILE REPOSITORY
// =============================================================================

/// Repository for user profiles and organization membership.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn fetch(&self, user_id: Uuid) -> Result<Profile>;

    async fn membership(&self, organization_id: Uuid, user_id: Uuid)
        -> Result<Option<Membership>>;

    async fn is_member(&self, organization_id: Uuid, user_id: Uuid) -> Result<bool>;
}
