//! Assignment repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_db_timestamp, parse_db_uuid, Filter};
use crate::models::{Assignment, AssignmentQuery, CreateAssignmentRequest, EquipmentStatus};

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: String,
    organization_id: String,
    equipment_id: String,
    user_id: Option<String>,
    project_id: Option<String>,
    assigned_by: Option<String>,
    assigned_at: String,
    returned_at: Option<String>,
    notes: Option<String>,
}

const SELECT_ASSIGNMENT: &str = r#"
    SELECT id, organization_id, equipment_id, user_id, project_id, assigned_by,
           assigned_at, returned_at, notes
    FROM assignments
"#;

pub struct AssignmentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AssignmentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        organization_id: Uuid,
        query: &AssignmentQuery,
    ) -> Result<Vec<Assignment>> {
        let mut filter = Filter::new()
            .equals("organization_id", organization_id.to_string())
            .equals_opt("equipment_id", query.equipment_id.map(|id| id.to_string()))
            .equals_opt("user_id", query.user_id.map(|id| id.to_string()))
            .equals_opt("project_id", query.project_id.map(|id| id.to_string()))
            .paginate(query.limit, query.offset);
        if query.open_only {
            filter = filter.is_null("returned_at", true);
        }

        let sql = filter.build(SELECT_ASSIGNMENT, "assigned_at DESC");
        let rows = filter
            .bind_to(sqlx::query_as::<_, AssignmentRow>(&sql))
            .fetch_all(self.pool)
            .await
            .context("Failed to list assignments")?;

        Ok(rows.into_iter().map(row_to_assignment).collect())
    }

    pub async fn get(&self, organization_id: Uuid, id: Uuid) -> Result<Option<Assignment>> {
        let sql = format!("{} WHERE organization_id = ? AND id = ?", SELECT_ASSIGNMENT);
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(organization_id.to_string())
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to get assignment")?;

        Ok(row.map(row_to_assignment))
    }

    /// Record an assignment and mark the equipment as assigned, atomically
    pub async fn create(
        &self,
        organization_id: Uuid,
        assigned_by: Uuid,
        req: &CreateAssignmentRequest,
    ) -> Result<Assignment> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO assignments (
                id, organization_id, equipment_id, user_id, project_id, assigned_by,
                assigned_at, returned_at, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .bind(req.equipment_id.to_string())
        .bind(req.user_id.map(|u| u.to_string()))
        .bind(req.project_id.map(|p| p.to_string()))
        .bind(assigned_by.to_string())
        .bind(&now)
        .bind(&req.notes)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE equipment SET status = ?, updated_at = ? WHERE organization_id = ? AND id = ?",
        )
        .bind(EquipmentStatus::Assigned.as_str())
        .bind(&now)
        .bind(organization_id.to_string())
        .bind(req.equipment_id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to mark equipment as assigned")?;

        tx.commit().await.context("Failed to commit assignment")?;

        self.get(organization_id, id)
            .await?
            .context("Failed to retrieve created assignment")
    }

    /// Close an open assignment and make the equipment available again.
    ///
    /// Returns `None` when the assignment does not exist in this organization
    /// and the unchanged assignment when it was already returned.
    pub async fn mark_returned(&self, organization_id: Uuid, id: Uuid) -> Result<Option<Assignment>> {
        let Some(existing) = self.get(organization_id, id).await? else {
            return Ok(None);
        };
        if !existing.is_open() {
            return Ok(Some(existing));
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "UPDATE assignments SET returned_at = ? WHERE organization_id = ? AND id = ? AND returned_at IS NULL",
        )
        .bind(&now)
        .bind(organization_id.to_string())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to return assignment")?;

        sqlx::query(
            "UPDATE equipment SET status = ?, updated_at = ? WHERE organization_id = ? AND id = ?",
        )
        .bind(EquipmentStatus::Available.as_str())
        .bind(&now)
        .bind(organization_id.to_string())
        .bind(existing.equipment_id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to mark equipment as available")?;

        tx.commit().await.context("Failed to commit return")?;

        self.get(organization_id, id).await
    }
}

fn row_to_assignment(row: AssignmentRow) -> Assignment {
    Assignment {
        id: parse_db_uuid(&row.id),
        organization_id: parse_db_uuid(&row.organization_id),
        equipment_id: parse_db_uuid(&row.equipment_id),
        user_id: row.user_id.as_deref().map(parse_db_uuid),
        project_id: row.project_id.as_deref().map(parse_db_uuid),
        assigned_by: row.assigned_by.as_deref().map(parse_db_uuid),
        assigned_at: parse_db_timestamp(&row.assigned_at),
        returned_at: row.returned_at.as_deref().map(parse_db_timestamp),
        notes: row.notes,
    }
}
