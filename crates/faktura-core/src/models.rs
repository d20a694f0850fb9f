//! Domain models for the faktura invoice platform.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// INVOICE LIFECYCLE
// =============================================================================

/// Invoice processing status.
///
/// The automated pipeline only ever moves an invoice forward:
/// `uploading → processing → processed → confirmed → sent_to_accountant`,
/// with `error` reachable from `uploading` or `processing` and terminal for
/// the pipeline (a manual retry starts a fresh upload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Uploading,
    Processing,
    Processed,
    Confirmed,
    SentToAccountant,
    Error,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Uploading => "uploading",
            InvoiceStatus::Processing => "processing",
            InvoiceStatus::Processed => "processed",
            InvoiceStatus::Confirmed => "confirmed",
            InvoiceStatus::SentToAccountant => "sent_to_accountant",
            InvoiceStatus::Error => "error",
        }
    }

    /// Whether `next` is a legal forward transition from this status.
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Uploading, Processing)
                | (Processing, Processed)
                | (Processed, Confirmed)
                | (Confirmed, SentToAccountant)
                | (Uploading, Error)
                | (Processing, Error)
        )
    }

    /// Terminal states for the automated pipeline.
    pub fn is_terminal(self) -> bool {
        matches!(self, InvoiceStatus::SentToAccountant | InvoiceStatus::Error)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(InvoiceStatus::Uploading),
            "processing" => Ok(InvoiceStatus::Processing),
            "processed" => Ok(InvoiceStatus::Processed),
            "confirmed" => Ok(InvoiceStatus::Confirmed),
            "sent_to_accountant" => Ok(InvoiceStatus::SentToAccountant),
            "error" => Ok(InvoiceStatus::Error),
            other => Err(Error::InvalidInput(format!(
                "unknown invoice status: {other}"
            ))),
        }
    }
}

/// Direction of an invoice relative to the organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Incoming,
    Outgoing,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Incoming => "incoming",
            InvoiceType::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(InvoiceType::Incoming),
            "outgoing" => Ok(InvoiceType::Outgoing),
            other => Err(Error::InvalidInput(format!(
                "invalid invoice type: {other}"
            ))),
        }
    }
}

// =============================================================================
// LINE ITEMS
// =============================================================================

/// A single extracted invoice line item. Every field is optional because the
/// extraction workflow returns whatever it managed to read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// Invoice line items as delivered by the extraction workflow.
///
/// The workflow sometimes sends a proper JSON array and sometimes a string
/// containing JSON that still needs a parse. Consumers should go through
/// [`LineItems::items`], which applies the parse-or-empty fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineItems {
    Parsed(Vec<LineItem>),
    Raw(String),
}

impl Default for LineItems {
    fn default() -> Self {
        LineItems::Parsed(Vec::new())
    }
}

impl LineItems {
    /// Materialize the line items, parsing the raw-string form if needed.
    /// Anything that does not parse to an array yields an empty list.
    pub fn items(&self) -> Vec<LineItem> {
        match self {
            LineItems::Parsed(items) => items.clone(),
            LineItems::Raw(s) => serde_json::from_str::<Vec<LineItem>>(s).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Convert the stored JSON column value back into line items.
    pub fn from_json(value: JsonValue) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// JSON value for storage in the invoice row.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Array(Vec::new()))
    }
}

// =============================================================================
// INVOICE
// =============================================================================

/// A single uploaded invoice document and its extracted business fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub is_general_expense: bool,
    pub invoice_type: InvoiceType,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub original_filename: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub vendor_name: Option<String>,
    pub vendor_address: Option<String>,
    pub vendor_tax_id: Option<String>,
    pub vendor_pdv: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_address: Option<String>,
    pub buyer_tax_id: Option<String>,
    pub subtotal: Option<f64>,
    pub tax_rate: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub currency: String,
    pub line_items: LineItems,
    pub status: InvoiceStatus,
    pub requires_confirmation: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<Uuid>,
    pub extraction_confidence: BTreeMap<String, f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for pre-creating an invoice row at upload time.
#[derive(Debug, Clone)]
pub struct CreateInvoiceRequest {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub is_general_expense: bool,
    pub invoice_type: InvoiceType,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub original_filename: Option<String>,
}

/// Filters for tenant-scoped invoice listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListInvoicesRequest {
    pub status: Option<InvoiceStatus>,
    pub invoice_type: Option<InvoiceType>,
    pub project_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// =============================================================================
// EXTRACTION CALLBACK
// =============================================================================

/// Payload the external extraction workflow POSTs back to the callback
/// endpoint. Either `error` is set, or some subset of the extracted fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionCallback {
    pub invoice_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    /// Dates come back as strings; the workflow does not guarantee a format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_pdv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_items: Option<LineItems>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<BTreeMap<String, f64>>,
}

impl ExtractionCallback {
    pub fn parsed_invoice_date(&self) -> Option<NaiveDate> {
        self.invoice_date.as_deref().and_then(parse_extracted_date)
    }

    pub fn parsed_due_date(&self) -> Option<NaiveDate> {
        self.due_date.as_deref().and_then(parse_extracted_date)
    }
}

/// Parse a date string from the extraction workflow. Accepts ISO dates,
/// RFC 3339 timestamps, and the dotted European form (`31.12.2025`).
pub fn parse_extracted_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.date_naive());
    }
    NaiveDate::parse_from_str(s, "%d.%m.%Y").ok()
}

// =============================================================================
// CONFIRMATION
// =============================================================================

/// User-edited field values submitted when confirming a processed invoice.
/// `None` fields keep whatever extraction wrote; user edits are trusted
/// as-is and are not re-validated against the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmInvoiceRequest {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub vendor_name: Option<String>,
    pub vendor_address: Option<String>,
    pub vendor_tax_id: Option<String>,
    pub subtotal: Option<f64>,
    pub tax_rate: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
}

// =============================================================================
// PROJECTS
// =============================================================================

/// A project invoices can be booked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub color: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project together with its invoice count, as returned by list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub invoice_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

// =============================================================================
// REPORTS
// =============================================================================

/// Output format of a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Csv,
    Html,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Html => "text/html; charset=utf-8",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(ReportFormat::Csv),
            "html" => Ok(ReportFormat::Html),
            other => Err(Error::InvalidInput(format!(
                "invalid report format: {other}"
            ))),
        }
    }
}

/// Lifecycle of a report artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Generating,
    Completed,
    Error,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Error => "error",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(ReportStatus::Generating),
            "completed" => Ok(ReportStatus::Completed),
            "error" => Ok(ReportStatus::Error),
            other => Err(Error::InvalidInput(format!(
                "invalid report status: {other}"
            ))),
        }
    }
}

/// A generated (or failed) report over a date range of invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub format: ReportFormat,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub project_id: Option<Uuid>,
    pub status: ReportStatus,
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReportRequest {
    pub name: String,
    pub format: ReportFormat,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub project_id: Option<Uuid>,
    pub status_filter: Option<InvoiceStatus>,
}

// =============================================================================
// PDV (VAT) SUMMARY
// =============================================================================

/// Aggregated amounts for one invoice direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdvTotals {
    pub count: i64,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
}

/// Incoming vs. outgoing VAT totals over a period.
///
/// A positive [`net_tax`](PdvSummary::net_tax) is VAT owed to the state,
/// a negative one is a refund.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdvSummary {
    pub incoming: PdvTotals,
    pub outgoing: PdvTotals,
}

impl PdvSummary {
    pub fn net_tax(&self) -> f64 {
        self.outgoing.tax_amount - self.incoming.tax_amount
    }
}

// =============================================================================
// TENANCY
// =============================================================================

/// A user profile row. Authentication itself is handled by an external
/// provider; the profile only tracks the currently selected organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: Option<String>,
    pub current_organization_id: Option<Uuid>,
}

/// Membership of a user in an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}
