//! Report artifact repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use faktura_core::{CreateReportRequest, Error, Report, ReportRepository, Result};

const REPORT_COLUMNS: &str = "id, organization_id, created_by, name, format, date_from, \
     date_to, project_id, status, file_url, created_at, updated_at";

/// PostgreSQL report repository.
#[derive(Clone)]
pub struct PgReportRepository {
    pool: Pool<Postgres>,
}

impl PgReportRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> Result<Report> {
        let format: String = r.get("format");
        let status: String = r.get("status");
        Ok(Report {
            id: r.get("id"),
            organization_id: r.get("organization_id"),
            created_by: r.get("created_by"),
            name: r.get("name"),
            format: format.parse()?,
            date_from: r.get("date_from"),
            date_to: r.get("date_to"),
            project_id: r.get("project_id"),
            status: status.parse()?,
            file_url: r.get("file_url"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        })
    }
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn insert(
        &self,
        organization_id: Uuid,
        created_by: Uuid,
        req: &CreateReportRequest,
    ) -> Result<Report> {
        let id = faktura_core::new_v7();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO reports (id, organization_id, created_by, name, format, date_from, \
             date_to, project_id, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'generating', $9, $9)
             RETURNING {REPORT_COLUMNS}"
        ))
        .bind(id)
        .bind(organization_id)
        .bind(created_by)
        .bind(&req.name)
        .bind(req.format.as_str())
        .bind(req.date_from)
        .bind(req.date_to)
        .bind(req.project_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn fetch(&self, id: Uuid) -> Result<Report> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(r) => Self::parse_row(&r),
            None => Err(Error::NotFound(format!("report {id}"))),
        }
    }

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Report>> {
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports
             WHERE organization_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn mark_completed(&self, id: Uuid, file_url: &str) -> Result<Report> {
        let row = sqlx::query(&format!(
            "UPDATE reports SET status = 'completed', file_url = $1, updated_at = $2
             WHERE id = $3
             RETURNING {REPORT_COLUMNS}"
        ))
        .bind(file_url)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(r) => Self::parse_row(&r),
            None => Err(Error::NotFound(format!("report {id}"))),
        }
    }

    async fn mark_error(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE reports SET status = 'error', updated_at = $1 WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("report {id}")));
        }
        Ok(())
    }
}
