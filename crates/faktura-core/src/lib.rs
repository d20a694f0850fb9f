//! # faktura-core
//!
//! Core types, traits, and abstractions for the faktura invoice platform.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other faktura crates depend on: the invoice data model and its
//! status lifecycle, the extraction callback payload, the confidence scorer,
//! the server event bus, and the repository traits implemented by the
//! database layer.

pub mod confidence;
pub mod defaults;
pub mod error;
pub mod events;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use confidence::score_extraction;
pub use error::{Error, Result};
pub use events::{EventActor, EventBus, EventContext, EventEnvelope, ServerEvent};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
