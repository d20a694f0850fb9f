//! # faktura-watch
//!
//! Edge-triggered invoice status watching for faktura.
//!
//! This crate provides:
//! - [`InvoiceWatcher`]: follows one invoice through its lifecycle, merging
//!   event-bus pushes with a polling fallback into a deduplicated stream of
//!   status changes
//! - [`OrganizationWatcher`]: push-only stream of every event in one
//!   organization, for list views and SSE fan-out

pub mod organization;
pub mod source;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use organization::{OrganizationWatchHandle, OrganizationWatcher};
pub use source::InvoiceSource;
pub use watcher::{InvoiceUpdate, InvoiceWatcher, WatchHandle};
