//! HTTP extraction backend.
//!
//! Posts the invoice document and its metadata as a multipart form to an
//! external workflow engine (n8n or compatible). The workflow later reports
//! results to `callback_url` with the shared webhook secret.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, error, info};

use faktura_core::{Error, Result};

use crate::backend::{DispatchRequest, ExtractionBackend};

/// Environment variable for the workflow's inbound webhook URL.
pub const WEBHOOK_URL_ENV: &str = "EXTRACTION_WEBHOOK_URL";

/// Environment variable for the callback URL the workflow reports back to.
pub const CALLBACK_URL_ENV: &str = "EXTRACTION_CALLBACK_URL";

/// Form field name the workflow expects the document under.
const FILE_FIELD: &str = "Invoice File";

/// HTTP extraction backend.
#[derive(Clone)]
pub struct HttpExtractionBackend {
    client: reqwest::Client,
    webhook_url: String,
    callback_url: String,
}

impl HttpExtractionBackend {
    /// Create a backend for the given workflow webhook and callback URLs.
    ///
    /// The client carries no request timeout: extraction of a large scan can
    /// take minutes, and the workflow acknowledges receipt only after it has
    /// read the whole upload.
    pub fn new(webhook_url: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
            callback_url: callback_url.into(),
        }
    }

    /// Create a backend from `EXTRACTION_WEBHOOK_URL` and
    /// `EXTRACTION_CALLBACK_URL`.
    pub fn from_env() -> Result<Self> {
        let webhook_url = std::env::var(WEBHOOK_URL_ENV)
            .map_err(|_| Error::Config(format!("{WEBHOOK_URL_ENV} is not set")))?;
        let callback_url = std::env::var(CALLBACK_URL_ENV)
            .map_err(|_| Error::Config(format!("{CALLBACK_URL_ENV} is not set")))?;
        Ok(Self::new(webhook_url, callback_url))
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }
}

#[async_trait]
impl ExtractionBackend for HttpExtractionBackend {
    async fn dispatch(&self, req: DispatchRequest) -> Result<()> {
        let file_name = req
            .original_filename
            .clone()
            .unwrap_or_else(|| "invoice".to_string());
        let mime = req
            .file_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let file_size = req.file_bytes.len();

        debug!(
            subsystem = "extract",
            component = "http",
            op = "dispatch",
            invoice_id = %req.invoice_id,
            organization_id = %req.organization_id,
            file_size,
            "Dispatching invoice to extraction workflow"
        );

        let part = Part::bytes(req.file_bytes)
            .file_name(file_name.clone())
            .mime_str(&mime)
            .map_err(|e| Error::Dispatch(format!("invalid file type {mime}: {e}")))?;

        // The field name contains a space; the workflow matches it literally,
        // so the RFC 8187 percent-encoding reqwest applies by default must be
        // turned off.
        let mut form = Form::new()
            .percent_encode_noop()
            .part(FILE_FIELD, part)
            .text("invoice_id", req.invoice_id.to_string())
            .text("organization_id", req.organization_id.to_string())
            .text("user_id", req.user_id.to_string())
            .text("invoice_type", req.invoice_type.clone())
            .text("filename", file_name)
            .text("callback_url", self.callback_url.clone());
        if let Some(email) = req.user_email {
            form = form.text("user_email", email);
        }
        if let Some(url) = req.file_url {
            form = form.text("file_url", url);
        }
        if let Some(file_type) = req.file_type {
            form = form.text("file_type", file_type);
        }

        let response = self
            .client
            .post(&self.webhook_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("extraction workflow unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                subsystem = "extract",
                component = "http",
                op = "dispatch",
                invoice_id = %req.invoice_id,
                status = status.as_u16(),
                error = %body,
                "Extraction workflow rejected dispatch"
            );
            return Err(Error::Dispatch(format!(
                "extraction workflow returned {status}: {body}"
            )));
        }

        info!(
            subsystem = "extract",
            component = "http",
            op = "dispatch",
            invoice_id = %req.invoice_id,
            file_size,
            "Invoice accepted by extraction workflow"
        );
        Ok(())
    }
}
