//! # faktura-extract
//!
//! Extraction workflow dispatch for faktura.
//!
//! This crate provides:
//! - [`ExtractionBackend`]: pluggable trait for handing invoice documents to
//!   an AI extraction workflow
//! - [`HttpExtractionBackend`]: multipart HTTP implementation targeting n8n
//!   or a compatible workflow engine
//! - A mock backend for tests (feature `mock`)
//!
//! Dispatch is fire-and-forget from the API's perspective: results arrive
//! later through the callback webhook.

pub mod backend;
pub mod http;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::{DispatchRequest, ExtractionBackend};
pub use http::HttpExtractionBackend;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockExtractionBackend;
