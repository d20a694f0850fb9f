//! Extraction backend trait and dispatch request type.

use async_trait::async_trait;
use uuid::Uuid;

use faktura_core::Result;

/// Everything the extraction workflow needs to process one invoice document.
///
/// The workflow is asynchronous: dispatch hands over the file and metadata,
/// and results come back later through the callback endpoint.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub invoice_id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub user_email: Option<String>,
    pub invoice_type: String,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub original_filename: Option<String>,
    pub file_bytes: Vec<u8>,
}

/// Pluggable backend that hands an invoice document to the extraction
/// workflow.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Dispatch a document for extraction. Success means the workflow
    /// accepted the job, not that extraction finished.
    async fn dispatch(&self, req: DispatchRequest) -> Result<()>;
}
