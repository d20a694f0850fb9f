//! # faktura-db
//!
//! PostgreSQL database layer for faktura.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for invoices, projects, reports, and profiles
//! - Schema migrations (behind the `migrations` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use faktura_db::Database;
//! use faktura_core::{CreateInvoiceRequest, InvoiceRepository, InvoiceType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/faktura").await?;
//!
//!     let invoice = db.invoices.insert(CreateInvoiceRequest {
//!         organization_id,
//!         user_id,
//!         project_id: None,
//!         is_general_expense: false,
//!         invoice_type: InvoiceType::Incoming,
//!         file_url: Some("https://storage/racun-042.pdf".to_string()),
//!         file_type: Some("application/pdf".to_string()),
//!         original_filename: Some("racun-042.pdf".to_string()),
//!     }).await?;
//!
//!     println!("Created invoice: {}", invoice.id);
//!     Ok(())
//! }
//! ```

pub mod invoices;
pub mod pool;
pub mod profiles;
pub mod projects;
pub mod reports;

// Test fixtures for integration tests
// Note: always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export repository implementations
pub use invoices::PgInvoiceRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use profiles::PgProfileRepository;
pub use projects::PgProjectRepository;
pub use reports::PgReportRepository;

// Re-export core types
pub use faktura_core::*;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Invoice lifecycle repository.
    pub invoices: PgInvoiceRepository,
    /// Project repository.
    pub projects: PgProjectRepository,
    /// Report artifact repository.
    pub reports: PgReportRepository,
    /// Profile and membership repository.
    pub profiles: PgProfileRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            invoices: PgInvoiceRepository::new(pool.clone()),
            projects: PgProjectRepository::new(pool.clone()),
            reports: PgReportRepository::new(pool.clone()),
            profiles: PgProfileRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
