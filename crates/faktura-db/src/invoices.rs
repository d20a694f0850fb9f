//! Invoice repository: the lifecycle store for uploaded invoice documents.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use faktura_core::defaults::{DEFAULT_CURRENCY, INTERNAL_FETCH_LIMIT, PAGE_LIMIT, PAGE_OFFSET};
use faktura_core::{
    ConfirmInvoiceRequest, CreateInvoiceRequest, Error, ExtractionCallback, Invoice,
    InvoiceRepository, InvoiceStatus, LineItems, ListInvoicesRequest, ListInvoicesResponse,
    PdvSummary, PdvTotals, ReportFilter, Result,
};

/// Statuses that count towards VAT aggregation: everything that made it past
/// upload and did not fail.
const PDV_STATUSES: [&str; 4] = ["processing", "processed", "confirmed", "sent_to_accountant"];

const INVOICE_COLUMNS: &str = "id, organization_id, user_id, project_id, is_general_expense, \
     invoice_type, file_url, file_type, original_filename, invoice_number, invoice_date, \
     due_date, vendor_name, vendor_address, vendor_tax_id, vendor_pdv, buyer_name, \
     buyer_address, buyer_tax_id, subtotal, tax_rate, tax_amount, total_amount, currency, \
     line_items, status, requires_confirmation, confirmed_at, confirmed_by, \
     extraction_confidence, notes, created_at, updated_at";

/// PostgreSQL invoice repository.
#[derive(Clone)]
pub struct PgInvoiceRepository {
    pool: Pool<Postgres>,
}

impl PgInvoiceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> Result<Invoice> {
        let status: String = r.get("status");
        let invoice_type: String = r.get("invoice_type");
        let line_items: serde_json::Value = r.get("line_items");
        let confidence: serde_json::Value = r.get("extraction_confidence");

        Ok(Invoice {
            id: r.get("id"),
            organization_id: r.get("organization_id"),
            user_id: r.get("user_id"),
            project_id: r.get("project_id"),
            is_general_expense: r.get("is_general_expense"),
            invoice_type: invoice_type.parse()?,
            file_url: r.get("file_url"),
            file_type: r.get("file_type"),
            original_filename: r.get("original_filename"),
            invoice_number: r.get("invoice_number"),
            invoice_date: r.get("invoice_date"),
            due_date: r.get("due_date"),
            vendor_name: r.get("vendor_name"),
            vendor_address: r.get("vendor_address"),
            vendor_tax_id: r.get("vendor_tax_id"),
            vendor_pdv: r.get("vendor_pdv"),
            buyer_name: r.get("buyer_name"),
            buyer_address: r.get("buyer_address"),
            buyer_tax_id: r.get("buyer_tax_id"),
            subtotal: r.get("subtotal"),
            tax_rate: r.get("tax_rate"),
            tax_amount: r.get("tax_amount"),
            total_amount: r.get("total_amount"),
            currency: r.get("currency"),
            line_items: LineItems::from_json(line_items),
            status: status.parse()?,
            requires_confirmation: r.get("requires_confirmation"),
            confirmed_at: r.get("confirmed_at"),
            confirmed_by: r.get("confirmed_by"),
            extraction_confidence: serde_json::from_value(confidence).unwrap_or_default(),
            notes: r.get("notes"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        })
    }
}

#[async_trait]
impl InvoiceRepository for PgInvoiceRepository {
    async fn insert(&self, req: CreateInvoiceRequest) -> Result<Invoice> {
        let id = faktura_core::new_v7();
        let now = Utc::now();
        // New rows always await a human look, long before extraction lands.
        sqlx::query(
            "INSERT INTO invoices (id, organization_id, user_id, project_id, is_general_expense, \
             invoice_type, file_url, file_type, original_filename, currency, status, \
             requires_confirmation, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'uploading', true, $11, $11)",
        )
        .bind(id)
        .bind(req.organization_id)
        .bind(req.user_id)
        .bind(req.project_id)
        .bind(req.is_general_expense)
        .bind(req.invoice_type.as_str())
        .bind(&req.file_url)
        .bind(&req.file_type)
        .bind(&req.original_filename)
        .bind(DEFAULT_CURRENCY)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.fetch(id).await
    }

    async fn fetch(&self, id: Uuid) -> Result<Invoice> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(r) => Self::parse_row(&r),
            None => Err(Error::InvoiceNotFound(id)),
        }
    }

    async fn list(
        &self,
        organization_id: Uuid,
        req: ListInvoicesRequest,
    ) -> Result<ListInvoicesResponse> {
        // Negative values would be a Postgres error; out-of-range limits are
        // capped rather than rejected.
        let limit = req.limit.unwrap_or(PAGE_LIMIT).clamp(0, INTERNAL_FETCH_LIMIT);
        let offset = req.offset.unwrap_or(PAGE_OFFSET).max(0);
        let status = req.status.map(|s| s.as_str());
        let invoice_type = req.invoice_type.map(|t| t.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE organization_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR invoice_type = $3)
               AND ($4::uuid IS NULL OR project_id = $4)
             ORDER BY created_at DESC
             LIMIT $5 OFFSET $6"
        ))
        .bind(organization_id)
        .bind(status)
        .bind(invoice_type)
        .bind(req.project_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invoices
             WHERE organization_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR invoice_type = $3)
               AND ($4::uuid IS NULL OR project_id = $4)",
        )
        .bind(organization_id)
        .bind(status)
        .bind(invoice_type)
        .bind(req.project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let invoices = rows
            .iter()
            .map(Self::parse_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(ListInvoicesResponse { invoices, total })
    }

    async fn set_status(&self, id: Uuid, status: InvoiceStatus) -> Result<()> {
        let result = sqlx::query("UPDATE invoices SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::InvoiceNotFound(id));
        }
        Ok(())
    }

    // Touches only status, notes and updated_at; errored invoices keep their
    // confirmation flag so a re-run picks up where the failure left off.
    async fn mark_error(&self, id: Uuid, message: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE invoices SET status = 'error', notes = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(message)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::InvoiceNotFound(id));
        }
        Ok(())
    }

    async fn apply_extraction(
        &self,
        id: Uuid,
        payload: &ExtractionCallback,
        confidence: &BTreeMap<String, f64>,
    ) -> Result<Invoice> {
        let currency = payload
            .currency
            .clone()
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let line_items = payload
            .line_items
            .as_ref()
            .map(|li| li.to_json())
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
        let confidence = serde_json::to_value(confidence)?;

        // Extraction output replaces field values wholesale, including nulls.
        let result = sqlx::query(
            "UPDATE invoices SET
                invoice_number = $1,
                invoice_date = $2,
                due_date = $3,
                vendor_name = $4,
                vendor_address = $5,
                vendor_tax_id = $6,
                vendor_pdv = $7,
                buyer_name = $8,
                buyer_address = $9,
                buyer_tax_id = $10,
                subtotal = $11,
                tax_rate = $12,
                tax_amount = $13,
                total_amount = $14,
                currency = $15,
                line_items = $16,
                extraction_confidence = $17,
                status = 'processed',
                requires_confirmation = true,
                updated_at = $18
             WHERE id = $19",
        )
        .bind(&payload.invoice_number)
        .bind(payload.parsed_invoice_date())
        .bind(payload.parsed_due_date())
        .bind(&payload.vendor_name)
        .bind(&payload.vendor_address)
        .bind(&payload.vendor_tax_id)
        .bind(&payload.vendor_pdv)
        .bind(&payload.buyer_name)
        .bind(&payload.buyer_address)
        .bind(&payload.buyer_tax_id)
        .bind(payload.subtotal)
        .bind(payload.tax_rate)
        .bind(payload.tax_amount)
        .bind(payload.total_amount)
        .bind(currency)
        .bind(line_items)
        .bind(confidence)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::InvoiceNotFound(id));
        }
        self.fetch(id).await
    }

    async fn confirm(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: &ConfirmInvoiceRequest,
    ) -> Result<Invoice> {
        let now = Utc::now();
        // User edits override extraction; untouched fields keep their values.
        let result = sqlx::query(
            "UPDATE invoices SET
                invoice_number = COALESCE($1, invoice_number),
                invoice_date = COALESCE($2, invoice_date),
                due_date = COALESCE($3, due_date),
                vendor_name = COALESCE($4, vendor_name),
                vendor_address = COALESCE($5, vendor_address),
                vendor_tax_id = COALESCE($6, vendor_tax_id),
                subtotal = COALESCE($7, subtotal),
                tax_rate = COALESCE($8, tax_rate),
                tax_amount = COALESCE($9, tax_amount),
                total_amount = COALESCE($10, total_amount),
                currency = COALESCE($11, currency),
                status = 'confirmed',
                requires_confirmation = false,
                confirmed_at = $12,
                confirmed_by = $13,
                updated_at = $12
             WHERE id = $14 AND status = 'processed'",
        )
        .bind(&req.invoice_number)
        .bind(req.invoice_date)
        .bind(req.due_date)
        .bind(&req.vendor_name)
        .bind(&req.vendor_address)
        .bind(&req.vendor_tax_id)
        .bind(req.subtotal)
        .bind(req.tax_rate)
        .bind(req.tax_amount)
        .bind(req.total_amount)
        .bind(&req.currency)
        .bind(now)
        .bind(user_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            // Distinguish a missing invoice from one in the wrong status.
            let current = self.fetch(id).await?;
            return Err(Error::InvalidStatus {
                expected: InvoiceStatus::Processed.to_string(),
                found: current.status.to_string(),
            });
        }
        self.fetch(id).await
    }

    async fn mark_sent(&self, id: Uuid) -> Result<Invoice> {
        let result = sqlx::query(
            "UPDATE invoices SET status = 'sent_to_accountant', updated_at = $1
             WHERE id = $2 AND status = 'confirmed'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            let current = self.fetch(id).await?;
            return Err(Error::InvalidStatus {
                expected: InvoiceStatus::Confirmed.to_string(),
                found: current.status.to_string(),
            });
        }
        self.fetch(id).await
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM invoices WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(exists)
    }

    async fn pdv_summary(
        &self,
        organization_id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<PdvSummary> {
        // Invoices without an extracted date fall back to their upload date.
        let rows = sqlx::query(
            "SELECT invoice_type,
                    COUNT(*) AS count,
                    COALESCE(SUM(subtotal), 0) AS subtotal,
                    COALESCE(SUM(tax_amount), 0) AS tax_amount,
                    COALESCE(SUM(total_amount), 0) AS total
             FROM invoices
             WHERE organization_id = $1
               AND status = ANY($2)
               AND COALESCE(invoice_date, created_at::date) >= $3
               AND COALESCE(invoice_date, created_at::date) <= $4
             GROUP BY invoice_type",
        )
        .bind(organization_id)
        .bind(&PDV_STATUSES[..])
        .bind(date_from)
        .bind(date_to)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut summary = PdvSummary::default();
        for r in rows {
            let totals = PdvTotals {
                count: r.get("count"),
                subtotal: r.get("subtotal"),
                tax_amount: r.get("tax_amount"),
                total: r.get("total"),
            };
            match r.get::<String, _>("invoice_type").as_str() {
                "outgoing" => summary.outgoing = totals,
                _ => summary.incoming = totals,
            }
        }
        Ok(summary)
    }

    async fn list_for_report(
        &self,
        organization_id: Uuid,
        filter: &ReportFilter,
    ) -> Result<Vec<Invoice>> {
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE organization_id = $1
               AND COALESCE(invoice_date, created_at::date) >= $2
               AND COALESCE(invoice_date, created_at::date) <= $3
               AND ($4::uuid IS NULL OR project_id = $4)
               AND ($5::text IS NULL OR status = $5)
             ORDER BY COALESCE(invoice_date, created_at::date) ASC, created_at ASC"
        ))
        .bind(organization_id)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(filter.project_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }
}
