//! Profile and organization membership repository.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use faktura_core::{Error, Membership, Profile, ProfileRepository, Result};

/// PostgreSQL profile repository.
#[derive(Clone)]
pub struct PgProfileRepository {
    pool: Pool<Postgres>,
}

impl PgProfileRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn fetch(&self, user_id: Uuid) -> Result<Profile> {
        let row = sqlx::query(
            "SELECT id, email, current_organization_id FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(r) => Ok(Profile {
                id: r.get("id"),
                email: r.get("email"),
                current_organization_id: r.get("current_organization_id"),
            }),
            None => Err(Error::Unauthorized(format!("unknown user {user_id}"))),
        }
    }

    async fn membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>> {
        let row = sqlx::query(
            "SELECT organization_id, user_id, role FROM organization_members
             WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| Membership {
            organization_id: r.get("organization_id"),
            user_id: r.get("user_id"),
            role: r.get("role"),
        }))
    }

    async fn is_member(&self, organization_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self.membership(organization_id, user_id).await?.is_some())
    }
}
