//! Database migrations
//!
//! Migrations are handled by SQLx and embedded from the `migrations/`
//! directory at compile time.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Apply all pending migrations
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}

/// Check that the database answers and the schema is in place
pub async fn check(pool: &SqlitePool) -> Result<bool> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'organizations'",
    )
    .fetch_one(pool)
    .await
    .context("Failed to query schema")?;

    Ok(count == 1)
}
