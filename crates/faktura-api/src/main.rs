//! faktura-api - HTTP API server for the faktura invoice platform

mod reports;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Multipart, Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{Datelike, NaiveDate, Utc};
use futures::stream::BoxStream;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use faktura_core::{
    defaults, score_extraction, ConfirmInvoiceRequest, CreateInvoiceRequest, CreateProjectRequest,
    CreateReportRequest, EventActor, EventBus, EventContext, EventEnvelope, ExtractionCallback,
    Invoice, InvoiceRepository, InvoiceStatus, InvoiceType, ListInvoicesRequest, Profile,
    ProfileRepository, Project, ProjectRepository, ProjectSummary, Report, ReportFilter,
    ReportFormat, ReportRepository, ServerEvent, UpdateProjectRequest,
};
use faktura_db::Database;
use faktura_extract::{DispatchRequest, ExtractionBackend, HttpExtractionBackend};
use faktura_watch::OrganizationWatcher;

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically — useful for
/// correlating an upload with its later extraction callback in the logs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Global rate limiter type (direct quota, no per-client bucketing).
type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    db: Database,
    /// Event bus for real-time notifications (SSE, watchers).
    event_bus: Arc<EventBus>,
    /// Outbound dispatch to the extraction workflow.
    extraction: Arc<dyn ExtractionBackend>,
    /// Global rate limiter (None if rate limiting is disabled).
    rate_limiter: Option<Arc<GlobalRateLimiter>>,
    /// Shared secret the extraction workflow must present on callbacks.
    webhook_secret: Option<String>,
    /// Directory report artifacts are written to.
    report_storage_path: PathBuf,
}

// =============================================================================
// STANDARD RESPONSE TYPES
// =============================================================================

/// Standardized pagination metadata for list responses.
#[derive(Serialize, Deserialize, Debug)]
pub struct PaginationMeta {
    /// Total number of items matching the query (across all pages)
    pub total: usize,
    /// Maximum number of items per page (request parameter)
    pub limit: usize,
    /// Number of items skipped (request parameter)
    pub offset: usize,
    /// True if more items are available after this page
    pub has_more: bool,
}

/// Standardized list response wrapper with pagination metadata.
#[derive(Serialize, Deserialize, Debug)]
pub struct ListResponse<T> {
    /// The list of items for the current page
    pub data: Vec<T>,
    /// Pagination metadata
    pub pagination: PaginationMeta,
}

impl<T: Serialize> ListResponse<T> {
    /// Create a new paginated list response.
    ///
    /// Automatically calculates `has_more` based on offset, data length, and
    /// total count.
    pub fn new(data: Vec<T>, total: usize, limit: usize, offset: usize) -> Self {
        let has_more = offset + data.len() < total;
        Self {
            data,
            pagination: PaginationMeta {
                total,
                limit,
                offset,
                has_more,
            },
        }
    }
}

// =============================================================================
// CORS CONFIGURATION HELPER
// =============================================================================

/// Parse allowed origins from a comma-separated list.
///
/// Invalid entries are skipped with a warning; an empty input falls back to
/// the localhost development origin.
fn parse_allowed_origins(origins_str: &str) -> Vec<HeaderValue> {
    if origins_str.trim().is_empty() {
        return vec![HeaderValue::from_static("http://localhost:3000")];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging.
    //
    // LOG_FORMAT: "json" for structured output, anything else for plain text
    // LOG_FILE:   path for daily-rotated file output (stdout if unset)
    // LOG_ANSI:   "true"/"1" to force ANSI colors, "false"/"0" to disable
    // RUST_LOG:   standard env-filter directives
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "faktura_api=debug,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("faktura-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/faktura".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| defaults::SERVER_PORT.to_string())
        .parse()
        .unwrap_or(defaults::SERVER_PORT);

    let rate_limit_requests: u64 = std::env::var("RATE_LIMIT_REQUESTS")
        .unwrap_or_else(|_| defaults::RATE_LIMIT_REQUESTS.to_string())
        .parse()
        .unwrap_or(defaults::RATE_LIMIT_REQUESTS);
    let rate_limit_period_secs: u64 = std::env::var("RATE_LIMIT_PERIOD_SECS")
        .unwrap_or_else(|_| defaults::RATE_LIMIT_PERIOD_SECS.to_string())
        .parse()
        .unwrap_or(defaults::RATE_LIMIT_PERIOD_SECS);
    let rate_limit_enabled: bool = std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    info!(
        "Rate limiting: {} ({} requests per {} seconds)",
        if rate_limit_enabled {
            "enabled"
        } else {
            "disabled"
        },
        rate_limit_requests,
        rate_limit_period_secs
    );

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect(&database_url).await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Outbound extraction workflow client
    let extraction = HttpExtractionBackend::from_env()?;
    info!(
        webhook_url = extraction.webhook_url(),
        "Extraction backend initialized"
    );

    let webhook_secret = std::env::var("EXTRACTION_WEBHOOK_SECRET").ok();
    if webhook_secret.is_none() {
        warn!("EXTRACTION_WEBHOOK_SECRET not set; extraction callbacks are unauthenticated");
    }

    // Report artifact storage
    let report_storage_path = PathBuf::from(
        std::env::var("REPORT_STORAGE_PATH")
            .unwrap_or_else(|_| defaults::REPORT_STORAGE_PATH.to_string()),
    );
    tokio::fs::create_dir_all(&report_storage_path).await?;
    info!(
        "Report storage initialized at {}",
        report_storage_path.display()
    );

    // Create the event bus
    let event_bus = Arc::new(EventBus::new(defaults::EVENT_BUS_CAPACITY));

    // Create rate limiter if enabled
    let rate_limiter = if rate_limit_enabled {
        let quota = Quota::with_period(std::time::Duration::from_secs(rate_limit_period_secs))
            .ok_or_else(|| anyhow::anyhow!("Rate limit period must be non-zero"))?
            .allow_burst(
                NonZeroU32::new(rate_limit_requests as u32)
                    .ok_or_else(|| anyhow::anyhow!("Rate limit must be non-zero"))?,
            );
        Some(Arc::new(RateLimiter::direct(quota)))
    } else {
        None
    };

    // Create app state
    let state = AppState {
        db,
        event_bus,
        extraction: Arc::new(extraction),
        rate_limiter,
        webhook_secret,
        report_storage_path: report_storage_path.clone(),
    };

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let report_storage_path = state.report_storage_path.clone();
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Invoice lifecycle
        .route("/api/v1/invoices", get(list_invoices).post(upload_invoice))
        .route("/api/v1/invoices/:id", get(get_invoice))
        .route("/api/v1/invoices/:id/confirm", post(confirm_invoice))
        .route(
            "/api/v1/invoices/:id/send-to-accountant",
            post(send_to_accountant),
        )
        // Extraction workflow callback
        .route("/api/v1/webhooks/extraction", post(extraction_callback))
        // Projects
        .route("/api/v1/projects", get(list_projects).post(create_project))
        .route(
            "/api/v1/projects/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
        // Reports
        .route("/api/v1/reports", get(list_reports).post(create_report))
        .route("/api/v1/reports/:id", get(get_report))
        // PDV (VAT) summary
        .route("/api/v1/stats/pdv", get(pdv_stats))
        // SSE events
        .route("/api/v1/events", get(sse_events))
        // Generated report artifacts
        .nest_service(
            defaults::REPORT_URL_PREFIX,
            ServeDir::new(&report_storage_path),
        )
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(CatchPanicLayer::new())
        .layer({
            let origins = std::env::var("ALLOWED_ORIGINS").unwrap_or_default();
            let allowed_origins = parse_allowed_origins(&origins);

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true)
                .max_age(std::time::Duration::from_secs(defaults::CORS_MAX_AGE_SECS))
        })
        .layer(axum::extract::DefaultBodyLimit::max(
            defaults::MAX_BODY_SIZE_BYTES,
        ))
        .layer(RequestBodyLimitLayer::new(defaults::MAX_BODY_SIZE_BYTES))
        .with_state(state)
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    // If rate limiting is disabled, pass through
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            tracing::warn!("Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "error_description": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

/// Authenticated caller, resolved from the `x-user-id` header the fronting
/// auth layer injects.
///
/// The profile must exist, must have a current organization selected, and
/// the caller must be a member of that organization.
struct AuthUser {
    user_id: Uuid,
    email: Option<String>,
    organization_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing x-user-id header".to_string()))?;

        let user_id = Uuid::parse_str(header_value)
            .map_err(|_| ApiError::Unauthorized("Invalid x-user-id header".to_string()))?;

        let profile: Profile = state.db.profiles.fetch(user_id).await?;
        let organization_id = profile
            .current_organization_id
            .ok_or_else(|| ApiError::BadRequest("No organization selected".to_string()))?;

        if !state.db.profiles.is_member(organization_id, user_id).await? {
            return Err(ApiError::Forbidden(
                "Not a member of this organization".to_string(),
            ));
        }

        Ok(AuthUser {
            user_id,
            email: profile.email,
            organization_id,
        })
    }
}

impl AuthUser {
    fn event_context(&self) -> EventContext {
        EventContext {
            actor: Some(EventActor::user(self.user_id.to_string())),
            ..Default::default()
        }
    }
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// INVOICE HANDLERS
// =============================================================================

/// Map the multipart content type to the stored file type, falling back to
/// the filename extension.
fn file_type_from_mime(mime: Option<&str>, filename: Option<&str>) -> Option<String> {
    match mime {
        Some("application/pdf") => Some("pdf".to_string()),
        Some("image/png") => Some("png".to_string()),
        Some("image/jpeg") | Some("image/jpg") => Some("jpg".to_string()),
        _ => filename.and_then(|f| {
            std::path::Path::new(f)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
        }),
    }
}

/// Upload an invoice file and dispatch it to the extraction workflow.
///
/// The row is pre-created in `uploading`, moved to `processing`, and only
/// then dispatched. A dispatch failure lands on the row as `error` so the
/// client still has an invoice id to show.
async fn upload_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut invoice_type = InvoiceType::Incoming;
    let mut project_id: Option<Uuid> = None;
    let mut is_general_expense = false;
    let mut file_url: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                if file_name.is_none() {
                    file_name = field.file_name().map(|s| s.to_string());
                }
                content_type = field.content_type().map(|s| s.to_string());
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            ApiError::BadRequest(format!("Failed to read file data: {}", e))
                        })?
                        .to_vec(),
                );
            }
            Some("invoice_type") => {
                let value = read_text_field(field).await?;
                invoice_type = value.parse().map_err(|_| {
                    ApiError::BadRequest(format!("Invalid invoice_type: {}", value))
                })?;
            }
            Some("project_id") => {
                let value = read_text_field(field).await?;
                if !value.is_empty() {
                    project_id = Some(Uuid::parse_str(&value).map_err(|_| {
                        ApiError::BadRequest(format!("Invalid project_id: {}", value))
                    })?);
                }
            }
            Some("is_general_expense") => {
                let value = read_text_field(field).await?;
                is_general_expense = value == "true" || value == "1";
            }
            Some("file_url") => {
                let value = read_text_field(field).await?;
                if !value.is_empty() {
                    file_url = Some(value);
                }
            }
            Some("filename") => {
                let value = read_text_field(field).await?;
                if !value.is_empty() {
                    file_name = Some(value);
                }
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes
        .ok_or_else(|| ApiError::BadRequest("No file uploaded. Use field name 'file'.".to_string()))?;
    let file_type = file_type_from_mime(content_type.as_deref(), file_name.as_deref());

    let invoice = state
        .db
        .invoices
        .insert(CreateInvoiceRequest {
            organization_id: auth.organization_id,
            user_id: auth.user_id,
            project_id,
            is_general_expense,
            invoice_type,
            file_url: file_url.clone(),
            file_type: file_type.clone(),
            original_filename: file_name.clone(),
        })
        .await?;

    state.event_bus.emit_with_context(
        ServerEvent::InvoiceUploaded {
            invoice_id: invoice.id,
            organization_id: auth.organization_id,
            invoice_type: invoice_type.as_str().to_string(),
            original_filename: file_name.clone(),
        },
        auth.event_context(),
    );

    state
        .db
        .invoices
        .set_status(invoice.id, InvoiceStatus::Processing)
        .await?;
    state.event_bus.emit_with_context(
        ServerEvent::InvoiceStatusChanged {
            invoice_id: invoice.id,
            organization_id: auth.organization_id,
            previous_status: Some(InvoiceStatus::Uploading),
            status: InvoiceStatus::Processing,
        },
        auth.event_context(),
    );

    let file_size = file_bytes.len();
    let dispatch = DispatchRequest {
        invoice_id: invoice.id,
        organization_id: auth.organization_id,
        user_id: auth.user_id,
        user_email: auth.email.clone(),
        invoice_type: invoice_type.as_str().to_string(),
        file_url,
        file_type,
        original_filename: file_name,
        file_bytes,
    };

    // Single attempt, no retry. The workflow reports back asynchronously
    // through the callback endpoint.
    if let Err(e) = state.extraction.dispatch(dispatch).await {
        let message = e.to_string();
        warn!(
            invoice_id = %invoice.id,
            error = %message,
            "Extraction dispatch failed"
        );
        if let Err(db_err) = state.db.invoices.mark_error(invoice.id, &message).await {
            tracing::error!(
                invoice_id = %invoice.id,
                error = %db_err,
                "Failed to record dispatch error"
            );
        }
        state.event_bus.emit(ServerEvent::InvoiceFailed {
            invoice_id: invoice.id,
            organization_id: auth.organization_id,
            error: message.clone(),
        });
        return Err(ApiError::Dispatch {
            invoice_id: invoice.id,
            message,
        });
    }

    info!(
        invoice_id = %invoice.id,
        organization_id = %auth.organization_id,
        file_size = file_size,
        "Invoice uploaded and dispatched for extraction"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Invoice uploaded and sent for processing",
            "invoice_id": invoice.id,
        })),
    ))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read form field: {}", e)))
}

/// Callback endpoint the extraction workflow POSTs results (or failures) to.
async fn extraction_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(callback): Json<ExtractionCallback>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(secret) = &state.webhook_secret {
        let supplied = headers
            .get("x-webhook-secret")
            .and_then(|v| v.to_str().ok());
        if supplied != Some(secret.as_str()) {
            return Err(ApiError::Unauthorized("Invalid webhook secret".to_string()));
        }
    }

    let invoice_id = callback
        .invoice_id
        .ok_or_else(|| ApiError::BadRequest("Missing invoice_id".to_string()))?;

    let invoice = state.db.invoices.fetch(invoice_id).await?;

    if let Some(error) = &callback.error {
        warn!(
            invoice_id = %invoice_id,
            error = %error,
            "Extraction workflow reported failure"
        );
        state.db.invoices.mark_error(invoice_id, error).await?;
        state.event_bus.emit(ServerEvent::InvoiceStatusChanged {
            invoice_id,
            organization_id: invoice.organization_id,
            previous_status: Some(invoice.status),
            status: InvoiceStatus::Error,
        });
        state.event_bus.emit(ServerEvent::InvoiceFailed {
            invoice_id,
            organization_id: invoice.organization_id,
            error: error.clone(),
        });
        return Ok(Json(serde_json::json!({
            "success": true,
            "invoice_id": invoice_id,
            "status": "error",
        })));
    }

    // Trust a confidence map supplied by the workflow; derive one otherwise.
    let confidence = callback
        .extraction_confidence
        .clone()
        .unwrap_or_else(|| score_extraction(&callback));

    let updated = state
        .db
        .invoices
        .apply_extraction(invoice_id, &callback, &confidence)
        .await?;

    state.event_bus.emit(ServerEvent::InvoiceStatusChanged {
        invoice_id,
        organization_id: updated.organization_id,
        previous_status: Some(invoice.status),
        status: InvoiceStatus::Processed,
    });
    state.event_bus.emit(ServerEvent::InvoiceProcessed {
        invoice_id,
        organization_id: updated.organization_id,
        vendor_name: updated.vendor_name.clone(),
        total_amount: updated.total_amount,
        requires_confirmation: updated.requires_confirmation,
    });

    info!(
        invoice_id = %invoice_id,
        vendor = updated.vendor_name.as_deref().unwrap_or("(unknown)"),
        "Extraction applied, invoice ready for review"
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "invoice_id": invoice_id,
        "status": "processed",
    })))
}

async fn list_invoices(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(req): Query<ListInvoicesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = req.limit.unwrap_or(defaults::PAGE_LIMIT).max(0) as usize;
    let offset = req.offset.unwrap_or(defaults::PAGE_OFFSET).max(0) as usize;

    let response = state.db.invoices.list(auth.organization_id, req).await?;
    Ok(Json(ListResponse::new(
        response.invoices,
        response.total as usize,
        limit,
        offset,
    )))
}

/// Fetch an invoice, scoped to the caller's organization.
async fn fetch_owned_invoice(state: &AppState, auth: &AuthUser, id: Uuid) -> Result<Invoice, ApiError> {
    let invoice = state.db.invoices.fetch(id).await?;
    if invoice.organization_id != auth.organization_id {
        return Err(ApiError::NotFound(format!("invoice not found: {}", id)));
    }
    Ok(invoice)
}

async fn get_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice = fetch_owned_invoice(&state, &auth, id).await?;
    Ok(Json(invoice))
}

/// Confirm the reviewed (possibly edited) extraction values.
///
/// Only a `processed` invoice can be confirmed; anything else is a conflict.
async fn confirm_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmInvoiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = fetch_owned_invoice(&state, &auth, id).await?;

    let invoice = state.db.invoices.confirm(id, auth.user_id, &req).await?;

    state.event_bus.emit_with_context(
        ServerEvent::InvoiceStatusChanged {
            invoice_id: id,
            organization_id: auth.organization_id,
            previous_status: Some(existing.status),
            status: InvoiceStatus::Confirmed,
        },
        auth.event_context(),
    );
    state.event_bus.emit_with_context(
        ServerEvent::InvoiceConfirmed {
            invoice_id: id,
            organization_id: auth.organization_id,
            confirmed_by: auth.user_id,
        },
        auth.event_context(),
    );

    info!(
        invoice_id = %id,
        confirmed_by = %auth.user_id,
        "Invoice confirmed"
    );

    Ok(Json(invoice))
}

/// Hand a confirmed invoice off to the accountant.
async fn send_to_accountant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = fetch_owned_invoice(&state, &auth, id).await?;

    let invoice = state.db.invoices.mark_sent(id).await?;

    state.event_bus.emit_with_context(
        ServerEvent::InvoiceStatusChanged {
            invoice_id: id,
            organization_id: auth.organization_id,
            previous_status: Some(existing.status),
            status: InvoiceStatus::SentToAccountant,
        },
        auth.event_context(),
    );
    state.event_bus.emit_with_context(
        ServerEvent::InvoiceSent {
            invoice_id: id,
            organization_id: auth.organization_id,
        },
        auth.event_context(),
    );

    Ok(Json(invoice))
}

// =============================================================================
// PROJECT HANDLERS
// =============================================================================

async fn list_projects(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ProjectSummary>>, ApiError> {
    Ok(Json(state.db.projects.list(auth.organization_id).await?))
}

async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Project name is required".to_string()));
    }
    if let Some(code) = req.code.as_deref() {
        if !code.is_empty()
            && state
                .db
                .projects
                .code_exists(auth.organization_id, code)
                .await?
        {
            return Err(ApiError::Conflict(format!(
                "Project code already in use: {}",
                code
            )));
        }
    }

    let project = state
        .db
        .projects
        .insert(auth.organization_id, auth.user_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn fetch_owned_project(state: &AppState, auth: &AuthUser, id: Uuid) -> Result<Project, ApiError> {
    let project = state.db.projects.fetch(id).await?;
    if project.organization_id != auth.organization_id {
        return Err(ApiError::NotFound(format!("project not found: {}", id)));
    }
    Ok(project)
}

async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let project = fetch_owned_project(&state, &auth, id).await?;
    Ok(Json(project))
}

async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = fetch_owned_project(&state, &auth, id).await?;

    if let Some(code) = req.code.as_deref() {
        if !code.is_empty()
            && existing.code.as_deref() != Some(code)
            && state
                .db
                .projects
                .code_exists(auth.organization_id, code)
                .await?
        {
            return Err(ApiError::Conflict(format!(
                "Project code already in use: {}",
                code
            )));
        }
    }

    Ok(Json(state.db.projects.update(id, req).await?))
}

/// Delete a project. Owner-only; a project that still has invoices is
/// deactivated rather than deleted.
async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    fetch_owned_project(&state, &auth, id).await?;

    let membership = state
        .db
        .profiles
        .membership(auth.organization_id, auth.user_id)
        .await?;
    if membership.map(|m| m.role).as_deref() != Some("owner") {
        return Err(ApiError::Forbidden(
            "Only owners can delete projects".to_string(),
        ));
    }

    let in_use = state
        .db
        .invoices
        .list(
            auth.organization_id,
            ListInvoicesRequest {
                project_id: Some(id),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await?;

    if in_use.total > 0 {
        state
            .db
            .projects
            .update(
                id,
                UpdateProjectRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        return Ok(Json(serde_json::json!({
            "success": true,
            "deactivated": true,
            "message": "Project deactivated (has invoices)",
        })));
    }

    state.db.projects.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// =============================================================================
// REPORT HANDLERS
// =============================================================================

async fn list_reports(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Report>>, ApiError> {
    Ok(Json(state.db.reports.list(auth.organization_id).await?))
}

async fn get_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.db.reports.fetch(id).await?;
    if report.organization_id != auth.organization_id {
        return Err(ApiError::NotFound(format!("report not found: {}", id)));
    }
    Ok(Json(report))
}

/// Create a report row and render it in the background.
///
/// Responds 202 with the `generating` row; the artifact lands under
/// `/files` once rendering completes.
async fn create_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.date_from > req.date_to {
        return Err(ApiError::BadRequest(
            "date_from must not be after date_to".to_string(),
        ));
    }

    let report = state
        .db
        .reports
        .insert(auth.organization_id, auth.user_id, &req)
        .await?;

    let task_state = state.clone();
    let task_report = report.clone();
    let status_filter = req.status_filter;
    tokio::spawn(async move {
        generate_report(task_state, task_report, status_filter).await;
    });

    Ok((StatusCode::ACCEPTED, Json(report)))
}

/// Render the report artifact and settle the row as completed or errored.
async fn generate_report(state: AppState, report: Report, status_filter: Option<InvoiceStatus>) {
    let report_id = report.id;
    let organization_id = report.organization_id;
    let format = report.format;

    match render_report(&state, &report, status_filter).await {
        Ok(file_url) => {
            if let Err(e) = state.db.reports.mark_completed(report_id, &file_url).await {
                tracing::error!(
                    report_id = %report_id,
                    error = %e,
                    "Failed to mark report completed"
                );
                return;
            }
            info!(report_id = %report_id, file_url = %file_url, "Report generated");
            state.event_bus.emit(ServerEvent::ReportGenerated {
                report_id,
                organization_id,
                format: format.as_str().to_string(),
                file_url: Some(file_url),
                success: true,
            });
        }
        Err(e) => {
            warn!(report_id = %report_id, error = %e, "Report generation failed");
            if let Err(db_err) = state.db.reports.mark_error(report_id).await {
                tracing::error!(
                    report_id = %report_id,
                    error = %db_err,
                    "Failed to mark report errored"
                );
            }
            state.event_bus.emit(ServerEvent::ReportGenerated {
                report_id,
                organization_id,
                format: format.as_str().to_string(),
                file_url: None,
                success: false,
            });
        }
    }
}

async fn render_report(
    state: &AppState,
    report: &Report,
    status_filter: Option<InvoiceStatus>,
) -> faktura_core::Result<String> {
    let filter = ReportFilter {
        date_from: report.date_from,
        date_to: report.date_to,
        project_id: report.project_id,
        status: status_filter,
    };
    let invoices = state
        .db
        .invoices
        .list_for_report(report.organization_id, &filter)
        .await?;

    let projects: HashMap<Uuid, Project> = state
        .db
        .projects
        .list(report.organization_id)
        .await?
        .into_iter()
        .map(|summary| (summary.project.id, summary.project))
        .collect();

    let content = match report.format {
        ReportFormat::Csv => reports::render_csv(&invoices, &projects),
        ReportFormat::Html => reports::render_html(
            &report.name,
            report.date_from,
            report.date_to,
            &invoices,
            &projects,
        ),
    };

    let filename = format!("report-{}.{}", report.id, report.format.file_extension());
    tokio::fs::create_dir_all(&state.report_storage_path).await?;
    tokio::fs::write(state.report_storage_path.join(&filename), content.as_bytes()).await?;

    Ok(format!("{}/{}", defaults::REPORT_URL_PREFIX, filename))
}

// =============================================================================
// PDV (VAT) SUMMARY
// =============================================================================

#[derive(Debug, Deserialize)]
struct PdvQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

/// Per-direction VAT totals over a period (defaults to the current month).
async fn pdv_stats(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PdvQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let today = Utc::now().date_naive();
    let from = query.from.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
    let to = query.to.unwrap_or(today);
    if from > to {
        return Err(ApiError::BadRequest(
            "from must not be after to".to_string(),
        ));
    }

    let summary = state
        .db
        .invoices
        .pdv_summary(auth.organization_id, from, to)
        .await?;

    Ok(Json(serde_json::json!({
        "date_from": from,
        "date_to": to,
        "incoming": summary.incoming,
        "outgoing": summary.outgoing,
        "net_tax": summary.net_tax(),
    })))
}

// =============================================================================
// SSE EVENTS
// =============================================================================

#[derive(Debug, Deserialize)]
struct SseQuery {
    organization_id: Option<Uuid>,
}

fn envelope_to_sse(envelope: EventEnvelope) -> Option<Result<Event, std::convert::Infallible>> {
    let event_type = envelope.event_type.clone();
    match serde_json::to_string(&envelope) {
        Ok(json) => Some(Ok(Event::default().event(event_type).data(json))),
        Err(_) => None,
    }
}

/// SSE event stream.
///
/// With `organization_id` the stream is tenant-scoped through an
/// [`OrganizationWatcher`]; without it every event on the bus is forwarded.
async fn sse_events(
    State(state): State<AppState>,
    Query(query): Query<SseQuery>,
) -> Sse<BoxStream<'static, Result<Event, std::convert::Infallible>>> {
    use futures::StreamExt as _;

    let stream: BoxStream<'static, Result<Event, std::convert::Infallible>> =
        match query.organization_id {
            Some(organization_id) => {
                let handle =
                    OrganizationWatcher::new(organization_id).start(&state.event_bus);
                futures::stream::unfold(handle, |mut handle| async move {
                    handle.recv().await.map(|envelope| (envelope, handle))
                })
                .filter_map(|envelope| async move { envelope_to_sse(envelope) })
                .boxed()
            }
            None => {
                let rx = state.event_bus.subscribe();
                tokio_stream::wrappers::BroadcastStream::new(rx)
                    .filter_map(|result| async move { result.ok().and_then(envelope_to_sse) })
                    .boxed()
            }
        };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(defaults::SSE_KEEPALIVE_SECS))
            .text("keepalive"),
    )
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Database(faktura_core::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// Dispatch to the extraction workflow failed after the invoice row was
    /// created; the id is reported so the client can show the errored row.
    Dispatch {
        invoice_id: Uuid,
        message: String,
    },
}

impl From<faktura_core::Error> for ApiError {
    fn from(err: faktura_core::Error) -> Self {
        use faktura_core::Error;
        match &err {
            Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            Error::InvoiceNotFound(id) => ApiError::NotFound(format!("invoice not found: {}", id)),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            Error::InvalidStatus { expected, found } => ApiError::Conflict(format!(
                "invoice status is '{}', expected '{}'",
                found, expected
            )),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg.clone()),
            Error::Forbidden(msg) => ApiError::Forbidden(msg.clone()),
            Error::Database(sqlx_err) => {
                let msg = sqlx_err.to_string();
                if msg.contains("duplicate key") || msg.contains("unique constraint") {
                    let friendly = if msg.contains("idx_projects_org_code") {
                        "A project with this code already exists".to_string()
                    } else {
                        msg
                    };
                    return ApiError::Conflict(friendly);
                }
                if msg.contains("foreign key") {
                    return ApiError::BadRequest(msg);
                }
                ApiError::Database(err)
            }
            _ => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if let ApiError::Dispatch {
            invoice_id,
            message,
        } = self
        {
            let body = Json(serde_json::json!({
                "error": "Failed to dispatch invoice for extraction",
                "details": message,
                "invoice_id": invoice_id,
            }));
            return (StatusCode::BAD_GATEWAY, body).into_response();
        }

        let (status, message) = match self {
            ApiError::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Dispatch { .. } => unreachable!(),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
