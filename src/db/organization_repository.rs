//! Organization (tenant) repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_db_timestamp, parse_db_uuid, parse_json_column};
use crate::models::{Organization, OrganizationUpsert};

#[derive(Debug, sqlx::FromRow)]
struct OrganizationRow {
    id: String,
    external_id: String,
    name: String,
    slug: Option<String>,
    contact_email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    settings: String,
    plan: Option<String>,
    subscription_status: Option<String>,
    created_at: String,
    updated_at: String,
}

const SELECT_ORGANIZATION: &str = r#"
    SELECT id, external_id, name, slug, contact_email, phone, address, settings,
           plan, subscription_status, created_at, updated_at
    FROM organizations
"#;

pub struct OrganizationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrganizationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Organization>> {
        let sql = format!("{} ORDER BY name", SELECT_ORGANIZATION);
        let rows = sqlx::query_as::<_, OrganizationRow>(&sql)
            .fetch_all(self.pool)
            .await
            .context("Failed to list organizations")?;

        Ok(rows.into_iter().map(row_to_org).collect())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Organization>> {
        let sql = format!("{} WHERE id = ?", SELECT_ORGANIZATION);
        let row = sqlx::query_as::<_, OrganizationRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to get organization")?;

        Ok(row.map(row_to_org))
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Organization>> {
        let sql = format!("{} WHERE external_id = ?", SELECT_ORGANIZATION);
        let row = sqlx::query_as::<_, OrganizationRow>(&sql)
            .bind(external_id)
            .fetch_optional(self.pool)
            .await
            .context("Failed to get organization by external id")?;

        Ok(row.map(row_to_org))
    }

    /// Insert or update by `external_id`; provider fields win
    pub async fn upsert(&self, org: &OrganizationUpsert) -> Result<Organization> {
        let now = Utc::now().to_rfc3339();
        let settings = serde_json::Value::Object(org.settings.clone()).to_string();

        sqlx::query(
            r#"
            INSERT INTO organizations (
                id, external_id, name, slug, contact_email, phone, address,
                settings, plan, subscription_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            ON CONFLICT(external_id) DO UPDATE SET
                name = ?3,
                slug = ?4,
                contact_email = ?5,
                phone = ?6,
                address = ?7,
                settings = ?8,
                plan = ?9,
                subscription_status = ?10,
                updated_at = ?11
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&org.external_id)
        .bind(&org.name)
        .bind(&org.slug)
        .bind(&org.contact_email)
        .bind(&org.phone)
        .bind(&org.address)
        .bind(&settings)
        .bind(&org.plan)
        .bind(&org.subscription_status)
        .bind(&now)
        .execute(self.pool)
        .await
        .with_context(|| format!("Failed to upsert organization {}", org.external_id))?;

        self.get_by_external_id(&org.external_id)
            .await?
            .context("Failed to retrieve upserted organization")
    }

    /// Insert unless a row with the same `external_id` exists.
    ///
    /// Returns the stored organization and whether it was inserted.
    pub async fn insert_if_absent(&self, org: &OrganizationUpsert) -> Result<(Organization, bool)> {
        let now = Utc::now().to_rfc3339();
        let settings = serde_json::Value::Object(org.settings.clone()).to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO organizations (
                id, external_id, name, slug, contact_email, phone, address,
                settings, plan, subscription_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            ON CONFLICT(external_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&org.external_id)
        .bind(&org.name)
        .bind(&org.slug)
        .bind(&org.contact_email)
        .bind(&org.phone)
        .bind(&org.address)
        .bind(&settings)
        .bind(&org.plan)
        .bind(&org.subscription_status)
        .bind(&now)
        .execute(self.pool)
        .await
        .with_context(|| format!("Failed to insert organization {}", org.external_id))?;

        let stored = self
            .get_by_external_id(&org.external_id)
            .await?
            .context("Failed to retrieve inserted organization")?;

        Ok((stored, result.rows_affected() > 0))
    }

    /// Hard delete; memberships and tenant data cascade
    pub async fn delete_by_external_id(&self, external_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM organizations WHERE external_id = ?")
            .bind(external_id)
            .execute(self.pool)
            .await
            .context("Failed to delete organization")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations")
            .fetch_one(self.pool)
            .await
            .context("Failed to count organizations")?;
        Ok(count)
    }
}

fn row_to_org(row: OrganizationRow) -> Organization {
    Organization {
        id: parse_db_uuid(&row.id),
        external_id: row.external_id,
        name: row.name,
        slug: row.slug,
        contact_email: row.contact_email,
        phone: row.phone,
        address: row.address,
        settings: parse_json_column(Some(&row.settings)).unwrap_or_else(|| serde_json::json!({})),
        plan: row.plan,
        subscription_status: row.subscription_status,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
