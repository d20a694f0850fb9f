//! Project repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use faktura_core::defaults::PROJECT_COLOR;
use faktura_core::{
    CreateProjectRequest, Error, Project, ProjectRepository, ProjectSummary,
    Result, UpdateProjectRequest,
};

const PROJECT_COLUMNS: &str = "id, organization_id, created_by, name, code, description, \
     color, is_active, created_at, updated_at";

/// PostgreSQL project repository.
#[derive(Clone)]
pub struct PgProjectRepository {
    pool: Pool<Postgres>,
}

impl PgProjectRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> Project {
        Project {
            id: r.get("id"),
            organization_id: r.get("organization_id"),
            created_by: r.get("created_by"),
            name: r.get("name"),
            code: r.get("code"),
            description: r.get("description"),
            color: r.get("color"),
            is_active: r.get("is_active"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn insert(
        &self,
        organization_id: Uuid,
        created_by: Uuid,
        req: CreateProjectRequest,
    ) -> Result<Project> {
        let id = faktura_core::new_v7();
        let now = Utc::now();
        let color = req.color.unwrap_or_else(|| PROJECT_COLOR.to_string());

        let row = sqlx::query(&format!(
            "INSERT INTO projects (id, organization_id, created_by, name, code, description, \
             color, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(id)
        .bind(organization_id)
        .bind(created_by)
        .bind(&req.name)
        .bind(&req.code)
        .bind(&req.description)
        .bind(color)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(&row))
    }

    async fn fetch(&self, id: Uuid) -> Result<Project> {
        let row = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(r) => Ok(Self::parse_row(&r)),
            None => Err(Error::NotFound(format!("project {id}"))),
        }
    }

    async fn list(&self, organization_id: Uuid) -> Result<Vec<ProjectSummary>> {
        let rows = sqlx::query(
            "SELECT p.id, p.organization_id, p.created_by, p.name, p.code, p.description,
                    p.color, p.is_active, p.created_at, p.updated_at,
                    COUNT(i.id) AS invoice_count
             FROM projects p
             LEFT JOIN invoices i ON i.project_id = p.id
             WHERE p.organization_id = $1
             GROUP BY p.id
             ORDER BY p.created_at DESC",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|r| ProjectSummary {
                project: Self::parse_row(r),
                invoice_count: r.get("invoice_count"),
            })
            .collect())
    }

    async fn update(&self, id: Uuid, req: UpdateProjectRequest) -> Result<Project> {
        let row = sqlx::query(&format!(
            "UPDATE projects SET
                name = COALESCE($1, name),
                code = COALESCE($2, code),
                description = COALESCE($3, description),
                color = COALESCE($4, color),
                is_active = COALESCE($5, is_active),
                updated_at = $6
             WHERE id = $7
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(&req.name)
        .bind(&req.code)
        .bind(&req.description)
        .bind(&req.color)
        .bind(req.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(r) => Ok(Self::parse_row(&r)),
            None => Err(Error::NotFound(format!("project {id}"))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("project {id}")));
        }
        Ok(())
    }

    async fn code_exists(&self, organization_id: Uuid, code: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE organization_id = $1 AND code = $2)",
        )
        .bind(organization_id)
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(exists)
    }
}
