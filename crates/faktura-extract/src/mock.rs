//! Mock extraction backend for deterministic testing.
//!
//! Records every dispatch and can be told to fail, so tests can cover both
//! the happy path and the dispatch-failure path without a live workflow.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use faktura_core::{Error, Result};

use crate::backend::{DispatchRequest, ExtractionBackend};

/// Mock extraction backend.
#[derive(Clone, Default)]
pub struct MockExtractionBackend {
    dispatched: Arc<Mutex<Vec<DispatchRequest>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockExtractionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent dispatch fail with the given message.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    /// Clear a previously set failure.
    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Requests the backend has accepted so far.
    pub fn dispatched(&self) -> Vec<DispatchRequest> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }
}

#[async_trait]
impl ExtractionBackend for MockExtractionBackend {
    async fn dispatch(&self, req: DispatchRequest) -> Result<()> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(Error::Dispatch(message));
        }
        self.dispatched.lock().unwrap().push(req);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request() -> DispatchRequest {
        DispatchRequest {
            invoice_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_email: None,
            invoice_type: "incoming".to_string(),
            file_url: None,
            file_type: None,
            original_filename: None,
            file_bytes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_records_dispatches() {
        let mock = MockExtractionBackend::new();
        let req = request();
        let id = req.invoice_id;
        mock.dispatch(req).await.unwrap();

        assert_eq!(mock.dispatch_count(), 1);
        assert_eq!(mock.dispatched()[0].invoice_id, id);
    }

    #[tokio::test]
    async fn test_mock_failure_toggle() {
        let mock = MockExtractionBackend::new();
        mock.fail_with("workflow down");

        let err = mock.dispatch(request()).await.unwrap_err();
        assert!(matches!(err, Error::Dispatch(msg) if msg == "workflow down"));
        assert_eq!(mock.dispatch_count(), 0);

        mock.succeed();
        mock.dispatch(request()).await.unwrap();
        assert_eq!(mock.dispatch_count(), 1);
    }
}
