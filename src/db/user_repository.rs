//! Application user repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_db_timestamp, parse_db_uuid, parse_json_column};
use crate::models::{AppUser, AppUserUpsert};

#[derive(Debug, sqlx::FromRow)]
struct AppUserRow {
    id: String,
    external_id: String,
    email: String,
    display_name: String,
    role: String,
    is_admin: bool,
    is_verified: bool,
    last_login_at: Option<String>,
    onboarding: Option<String>,
    created_at: String,
    updated_at: String,
}

const SELECT_USER: &str = r#"
    SELECT id, external_id, email, display_name, role, is_admin, is_verified,
           last_login_at, onboarding, created_at, updated_at
    FROM app_users
"#;

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<AppUser>> {
        let sql = format!("{} WHERE id = ?", SELECT_USER);
        let row = sqlx::query_as::<_, AppUserRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to get user")?;

        Ok(row.map(row_to_user))
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<AppUser>> {
        let sql = format!("{} WHERE external_id = ?", SELECT_USER);
        let row = sqlx::query_as::<_, AppUserRow>(&sql)
            .bind(external_id)
            .fetch_optional(self.pool)
            .await
            .context("Failed to get user by external id")?;

        Ok(row.map(row_to_user))
    }

    /// Insert or update by `external_id`; provider fields win
    pub async fn upsert(&self, user: &AppUserUpsert) -> Result<AppUser> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO app_users (
                id, external_id, email, display_name, role, is_admin, is_verified,
                last_login_at, onboarding, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(external_id) DO UPDATE SET
                email = ?3,
                display_name = ?4,
                role = ?5,
                is_admin = ?6,
                is_verified = ?7,
                last_login_at = COALESCE(?8, last_login_at),
                onboarding = COALESCE(?9, onboarding),
                updated_at = ?10
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.external_id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.role)
        .bind(user.is_admin)
        .bind(user.is_verified)
        .bind(user.last_login_at.map(|t| t.to_rfc3339()))
        .bind(user.onboarding.as_ref().map(|v| v.to_string()))
        .bind(&now)
        .execute(self.pool)
        .await
        .with_context(|| format!("Failed to upsert user {}", user.external_id))?;

        self.get_by_external_id(&user.external_id)
            .await?
            .context("Failed to retrieve upserted user")
    }

    /// Insert unless a row with the same `external_id` exists
    pub async fn insert_if_absent(&self, user: &AppUserUpsert) -> Result<(AppUser, bool)> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO app_users (
                id, external_id, email, display_name, role, is_admin, is_verified,
                last_login_at, onboarding, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(external_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.external_id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.role)
        .bind(user.is_admin)
        .bind(user.is_verified)
        .bind(user.last_login_at.map(|t| t.to_rfc3339()))
        .bind(user.onboarding.as_ref().map(|v| v.to_string()))
        .bind(&now)
        .execute(self.pool)
        .await
        .with_context(|| format!("Failed to insert user {}", user.external_id))?;

        let stored = self
            .get_by_external_id(&user.external_id)
            .await?
            .context("Failed to retrieve inserted user")?;

        Ok((stored, result.rows_affected() > 0))
    }

    /// Hard delete; memberships cascade, assignments keep a NULL user
    pub async fn delete_by_external_id(&self, external_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM app_users WHERE external_id = ?")
            .bind(external_id)
            .execute(self.pool)
            .await
            .context("Failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_users")
            .fetch_one(self.pool)
            .await
            .context("Failed to count users")?;
        Ok(count)
    }
}

fn row_to_user(row: AppUserRow) -> AppUser {
    AppUser {
        id: parse_db_uuid(&row.id),
        external_id: row.external_id,
        email: row.email,
        display_name: row.display_name,
        role: row.role,
        is_admin: row.is_admin,
        is_verified: row.is_verified,
        last_login_at: row.last_login_at.as_deref().map(parse_db_timestamp),
        onboarding: parse_json_column(row.onboarding.as_deref()),
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
