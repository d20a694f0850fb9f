//! Centralized default constants for the faktura system.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// INVOICES
// =============================================================================

/// Currency recorded when extraction does not report one.
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Default invoice direction when an upload does not specify one.
pub const DEFAULT_INVOICE_TYPE: &str = "incoming";

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for invoice and project list endpoints.
pub const PAGE_LIMIT: i64 = 50;

/// Internal "fetch everything" limit for report queries.
pub const INTERNAL_FETCH_LIMIT: i64 = 10_000;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default rate limit: max requests per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Maximum upload body size in bytes (25 MB, scanned invoice PDFs).
pub const MAX_BODY_SIZE_BYTES: usize = 25 * 1024 * 1024;

/// SSE keep-alive interval in seconds.
pub const SSE_KEEPALIVE_SECS: u64 = 15;

// =============================================================================
// WATCHING
// =============================================================================

/// Polling interval for the invoice watcher fallback, in seconds.
pub const WATCH_POLL_INTERVAL_SECS: u64 = 3;

/// Buffer size of a watcher's update channel.
pub const WATCH_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// PROJECTS
// =============================================================================

/// Default project color (hex) when none is chosen.
pub const PROJECT_COLOR: &str = "#6366f1";

// =============================================================================
// REPORTS
// =============================================================================

/// Default directory for generated report files.
pub const REPORT_STORAGE_PATH: &str = "./reports";

/// URL path prefix under which report files are served.
pub const REPORT_URL_PREFIX: &str = "/files";
