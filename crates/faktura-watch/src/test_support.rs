//! In-memory invoice source for watcher tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use faktura_core::{Invoice, InvoiceStatus, InvoiceType, LineItems, Result};

use crate::source::InvoiceSource;

/// Build a minimal invoice for tests.
pub fn test_invoice(status: InvoiceStatus) -> Invoice {
    let now = Utc::now();
    Invoice {
        id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        project_id: None,
        is_general_expense: false,
        invoice_type: InvoiceType::Incoming,
        file_url: None,
        file_type: None,
        original_filename: None,
        invoice_number: None,
        invoice_date: None,
        due_date: None,
        vendor_name: None,
        vendor_address: None,
        vendor_tax_id: None,
        vendor_pdv: None,
        buyer_name: None,
        buyer_address: None,
        buyer_tax_id: None,
        subtotal: None,
        tax_rate: None,
        tax_amount: None,
        total_amount: None,
        currency: "EUR".to_string(),
        line_items: LineItems::default(),
        status,
        requires_confirmation: false,
        confirmed_at: None,
        confirmed_by: None,
        extraction_confidence: BTreeMap::new(),
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

/// Mutable in-memory source holding a single invoice.
pub struct MockSource {
    invoice: Mutex<Invoice>,
}

impl MockSource {
    pub fn new(invoice: Invoice) -> Self {
        Self {
            invoice: Mutex::new(invoice),
        }
    }

    pub fn set_status(&self, status: InvoiceStatus) {
        let mut invoice = self.invoice.lock().unwrap();
        invoice.status = status;
        invoice.updated_at = Utc::now();
    }
}

#[async_trait]
impl InvoiceSource for MockSource {
    async fn fetch_invoice(&self, id: Uuid) -> Result<Invoice> {
        let invoice = self.invoice.lock().unwrap().clone();
        if invoice.id != id {
            return Err(faktura_core::Error::InvoiceNotFound(id));
        }
        Ok(invoice)
    }
}
