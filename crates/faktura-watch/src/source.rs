//! Read seam the watchers poll through.

use async_trait::async_trait;
use uuid::Uuid;

use faktura_core::{Invoice, InvoiceRepository, Result};
use faktura_db::PgInvoiceRepository;

/// Minimal read access a watcher needs. Tests substitute an in-memory source.
#[async_trait]
pub trait InvoiceSource: Send + Sync {
    async fn fetch_invoice(&self, id: Uuid) -> Result<Invoice>;
}

#[async_trait]
impl InvoiceSource for PgInvoiceRepository {
    async fn fetch_invoice(&self, id: Uuid) -> Result<Invoice> {
        InvoiceRepository::fetch(self, id).await
    }
}
