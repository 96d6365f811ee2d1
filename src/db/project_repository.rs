//! Project repository

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_db_timestamp, parse_db_uuid, Filter};
use crate::models::{CreateProjectRequest, Project, ProjectQuery, UpdateProjectRequest};

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: String,
    organization_id: String,
    name: String,
    code: Option<String>,
    address: Option<String>,
    status: String,
    start_date: Option<String>,
    end_date: Option<String>,
    created_at: String,
    updated_at: String,
}

const SELECT_PROJECT: &str = r#"
    SELECT id, organization_id, name, code, address, status, start_date, end_date,
           created_at, updated_at
    FROM projects
"#;

pub struct ProjectRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProjectRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, organization_id: Uuid, query: &ProjectQuery) -> Result<Vec<Project>> {
        let filter = Filter::new()
            .equals("organization_id", organization_id.to_string())
            .equals_opt("status", query.status.map(|s| s.as_str()))
            .search(&["name", "code", "address"], query.search.as_deref())
            .paginate(query.limit, query.offset);

        let sql = filter.build(SELECT_PROJECT, "name");
        let rows = filter
            .bind_to(sqlx::query_as::<_, ProjectRow>(&sql))
            .fetch_all(self.pool)
            .await
            .context("Failed to list projects")?;

        Ok(rows.into_iter().map(row_to_project).collect())
    }

    pub async fn get(&self, organization_id: Uuid, id: Uuid) -> Result<Option<Project>> {
        let sql = format!("{} WHERE organization_id = ? AND id = ?", SELECT_PROJECT);
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(organization_id.to_string())
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to get project")?;

        Ok(row.map(row_to_project))
    }

    pub async fn create(&self, organization_id: Uuid, req: &CreateProjectRequest) -> Result<Project> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO projects (
                id, organization_id, name, code, address, status, start_date, end_date,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .bind(&req.name)
        .bind(&req.code)
        .bind(&req.address)
        .bind(req.status.unwrap_or_default().as_str())
        .bind(req.start_date.map(|d| d.to_string()))
        .bind(req.end_date.map(|d| d.to_string()))
        .bind(&now)
        .execute(self.pool)
        .await
        .context("Failed to create project")?;

        self.get(organization_id, id)
            .await?
            .context("Failed to retrieve created project")
    }

    pub async fn update(
        &self,
        organization_id: Uuid,
        id: Uuid,
        req: &UpdateProjectRequest,
    ) -> Result<Option<Project>> {
        let Some(existing) = self.get(organization_id, id).await? else {
            return Ok(None);
        };

        let name = req.name.clone().unwrap_or(existing.name);
        let code = req.code.clone().or(existing.code);
        let address = req.address.clone().or(existing.address);
        let status = req.status.unwrap_or(existing.status);
        let start_date = req.start_date.or(existing.start_date);
        let end_date = req.end_date.or(existing.end_date);

        sqlx::query(
            r#"
            UPDATE projects
            SET name = ?, code = ?, address = ?, status = ?, start_date = ?, end_date = ?,
                updated_at = ?
            WHERE organization_id = ? AND id = ?
            "#,
        )
        .bind(&name)
        .bind(&code)
        .bind(&address)
        .bind(status.as_str())
        .bind(start_date.map(|d| d.to_string()))
        .bind(end_date.map(|d| d.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(organization_id.to_string())
        .bind(id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to update project")?;

        self.get(organization_id, id).await
    }

    pub async fn delete(&self, organization_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE organization_id = ? AND id = ?")
            .bind(organization_id.to_string())
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to delete project")?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn row_to_project(row: ProjectRow) -> Project {
    Project {
        id: parse_db_uuid(&row.id),
        organization_id: parse_db_uuid(&row.organization_id),
        name: row.name,
        code: row.code,
        address: row.address,
        status: row.status.parse().unwrap_or_default(),
        start_date: parse_date(row.start_date.as_deref()),
        end_date: parse_date(row.end_date.as_deref()),
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
