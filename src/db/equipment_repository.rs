//! Equipment repository
//!
//! Every query is scoped by `organization_id`.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_db_timestamp, parse_db_uuid, Filter};
use crate::models::{
    CreateEquipmentRequest, Equipment, EquipmentQuery, UpdateEquipmentRequest,
};

#[derive(Debug, sqlx::FromRow)]
struct EquipmentRow {
    id: String,
    organization_id: String,
    code: String,
    name: String,
    category: Option<String>,
    serial_number: Option<String>,
    status: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

const SELECT_EQUIPMENT: &str = r#"
    SELECT id, organization_id, code, name, category, serial_number, status, notes,
           created_at, updated_at
    FROM equipment
"#;

pub struct EquipmentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EquipmentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, organization_id: Uuid, query: &EquipmentQuery) -> Result<Vec<Equipment>> {
        let filter = Filter::new()
            .equals("organization_id", organization_id.to_string())
            .equals_opt("status", query.status.map(|s| s.as_str()))
            .equals_opt("category", query.category.clone())
            .search(&["name", "code", "serial_number"], query.search.as_deref())
            .paginate(query.limit, query.offset);

        let sql = filter.build(SELECT_EQUIPMENT, "name, code");
        let rows = filter
            .bind_to(sqlx::query_as::<_, EquipmentRow>(&sql))
            .fetch_all(self.pool)
            .await
            .context("Failed to list equipment")?;

        Ok(rows.into_iter().map(row_to_equipment).collect())
    }

    pub async fn get(&self, organization_id: Uuid, id: Uuid) -> Result<Option<Equipment>> {
        let sql = format!("{} WHERE organization_id = ? AND id = ?", SELECT_EQUIPMENT);
        let row = sqlx::query_as::<_, EquipmentRow>(&sql)
            .bind(organization_id.to_string())
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to get equipment")?;

        Ok(row.map(row_to_equipment))
    }

    pub async fn get_by_code(&self, organization_id: Uuid, code: &str) -> Result<Option<Equipment>> {
        let sql = format!("{} WHERE organization_id = ? AND code = ?", SELECT_EQUIPMENT);
        let row = sqlx::query_as::<_, EquipmentRow>(&sql)
            .bind(organization_id.to_string())
            .bind(code)
            .fetch_optional(self.pool)
            .await
            .context("Failed to get equipment by code")?;

        Ok(row.map(row_to_equipment))
    }

    pub async fn create(
        &self,
        organization_id: Uuid,
        req: &CreateEquipmentRequest,
    ) -> Result<Equipment> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let status = req.status.unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO equipment (
                id, organization_id, code, name, category, serial_number, status, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .bind(&req.code)
        .bind(&req.name)
        .bind(&req.category)
        .bind(&req.serial_number)
        .bind(status.as_str())
        .bind(&req.notes)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(organization_id, id)
            .await?
            .context("Failed to retrieve created equipment")
    }

    pub async fn update(
        &self,
        organization_id: Uuid,
        id: Uuid,
        req: &UpdateEquipmentRequest,
    ) -> Result<Option<Equipment>> {
        let Some(existing) = self.get(organization_id, id).await? else {
            return Ok(None);
        };

        let code = req.code.clone().unwrap_or(existing.code);
        let name = req.name.clone().unwrap_or(existing.name);
        let category = req.category.clone().or(existing.category);
        let serial_number = req.serial_number.clone().or(existing.serial_number);
        let status = req.status.unwrap_or(existing.status);
        let notes = req.notes.clone().or(existing.notes);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            UPDATE equipment
            SET code = ?, name = ?, category = ?, serial_number = ?, status = ?, notes = ?,
                updated_at = ?
            WHERE organization_id = ? AND id = ?
            "#,
        )
        .bind(&code)
        .bind(&name)
        .bind(&category)
        .bind(&serial_number)
        .bind(status.as_str())
        .bind(&notes)
        .bind(&now)
        .bind(organization_id.to_string())
        .bind(id.to_string())
        .execute(self.pool)
        .await?;

        self.get(organization_id, id).await
    }

    pub async fn delete(&self, organization_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM equipment WHERE organization_id = ? AND id = ?")
            .bind(organization_id.to_string())
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to delete equipment")?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_equipment(row: EquipmentRow) -> Equipment {
    Equipment {
        id: parse_db_uuid(&row.id),
        organization_id: parse_db_uuid(&row.organization_id),
        code: row.code,
        name: row.name,
        category: row.category,
        serial_number: row.serial_number,
        status: row.status.parse().unwrap_or_default(),
        notes: row.notes,
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}
