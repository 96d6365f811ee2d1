//! Organization membership repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_db_timestamp, parse_db_uuid};
use crate::models::{Membership, OrgRole, OrganizationMember};

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    id: String,
    organization_id: String,
    user_id: String,
    role: String,
    external_id: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    user_id: String,
    external_id: String,
    email: String,
    display_name: String,
    role: String,
    joined_at: String,
}

pub struct MembershipRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MembershipRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, organization_id: Uuid, user_id: Uuid) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT id, organization_id, user_id, role, external_id, created_at, updated_at
            FROM organization_memberships
            WHERE organization_id = ? AND user_id = ?
            "#,
        )
        .bind(organization_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to get membership")?;

        Ok(row.map(row_to_membership))
    }

    /// Insert or update the role for `(organization, user)`
    pub async fn upsert(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: &OrgRole,
        external_id: Option<&str>,
    ) -> Result<Membership> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO organization_memberships (
                id, organization_id, user_id, role, external_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(organization_id, user_id) DO UPDATE SET
                role = ?4,
                external_id = COALESCE(?5, external_id),
                updated_at = ?6
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(organization_id.to_string())
        .bind(user_id.to_string())
        .bind(role.as_str())
        .bind(external_id)
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to upsert membership")?;

        self.get(organization_id, user_id)
            .await?
            .context("Failed to retrieve upserted membership")
    }

    /// Insert with the given role unless a membership already exists.
    ///
    /// Existing roles are never downgraded. Returns whether a row was added.
    pub async fn insert_if_absent(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: &OrgRole,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO organization_memberships (
                id, organization_id, user_id, role, external_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)
            ON CONFLICT(organization_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(organization_id.to_string())
        .bind(user_id.to_string())
        .bind(role.as_str())
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to insert membership")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, organization_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM organization_memberships WHERE organization_id = ? AND user_id = ?",
        )
        .bind(organization_id.to_string())
        .bind(user_id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to delete membership")?;

        Ok(result.rows_affected() > 0)
    }

    /// Members of one organization joined with their user record
    pub async fn list_members(&self, organization_id: Uuid) -> Result<Vec<OrganizationMember>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT u.id AS user_id, u.external_id, u.email, u.display_name,
                   m.role, m.created_at AS joined_at
            FROM organization_memberships m
            JOIN app_users u ON u.id = m.user_id
            WHERE m.organization_id = ?
            ORDER BY u.display_name
            "#,
        )
        .bind(organization_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list organization members")?;

        Ok(rows
            .into_iter()
            .map(|row| OrganizationMember {
                user_id: parse_db_uuid(&row.user_id),
                external_id: row.external_id,
                email: row.email,
                display_name: row.display_name,
                role: OrgRole::from_provider(&row.role),
                joined_at: parse_db_timestamp(&row.joined_at),
            })
            .collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organization_memberships")
            .fetch_one(self.pool)
            .await
            .context("Failed to count memberships")?;
        Ok(count)
    }
}

fn row_to_membership(row: MembershipRow) -> Membership {
    Membership {
        id: parse_db_uuid(&row.id),
        organization_id: parse_db_uuid(&row.organization_id),
        user_id: parse_db_uuid(&row.user_id),
        role: OrgRole::from_provider(&row.role),
        external_id: row.external_id,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
