//! Equipment service
//!
//! Every operation runs against the caller's resolved organization and is
//! gated by [`SecurityContext::authorize`]. Rows of other tenants are never
//! visible: repository queries are organization-scoped.

use uuid::Uuid;
use validator::Validate;

use crate::db::{is_unique_violation, DbPool, EquipmentRepository};
use crate::models::{CreateEquipmentRequest, Equipment, EquipmentQuery, UpdateEquipmentRequest};
use crate::services::security::{check_permission, AccessLevel, SecurityContext};
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::normalize_equipment_code;

#[derive(Clone)]
pub struct EquipmentService {
    db: DbPool,
}

impl EquipmentService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, ctx: &SecurityContext, query: &EquipmentQuery) -> AppResult<Vec<Equipment>> {
        let org = ctx.require_organization()?;
        ctx.authorize("equipment.list", org, AccessLevel::Read)?;

        Ok(EquipmentRepository::new(&self.db).list(org, query).await?)
    }

    pub async fn get(&self, ctx: &SecurityContext, id: Uuid) -> AppResult<Equipment> {
        let org = ctx.require_organization()?;
        let equipment = EquipmentRepository::new(&self.db)
            .get(org, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Equipment {} not found", id)))?;

        ctx.authorize("equipment.get", equipment.organization_id, AccessLevel::Read)?;
        Ok(equipment)
    }

    /// Resolve a scanned QR/NFC code.
    ///
    /// Returns `None` both when the code is unknown and when it belongs to
    /// another organization, so existence never leaks across tenants.
    pub async fn find_by_code(&self, ctx: &SecurityContext, raw_code: &str) -> AppResult<Option<Equipment>> {
        let org = ctx.require_organization()?;
        let code = normalize_equipment_code(raw_code);
        if code.is_empty() {
            return Ok(None);
        }

        let found = EquipmentRepository::new(&self.db)
            .get_by_code(org, &code)
            .await?;

        Ok(found.filter(|e| check_permission(e.organization_id, ctx, false)))
    }

    pub async fn create(&self, ctx: &SecurityContext, mut req: CreateEquipmentRequest) -> AppResult<Equipment> {
        let org = ctx.require_organization()?;
        ctx.authorize("equipment.create", org, AccessLevel::Write)?;

        req.code = normalize_equipment_code(&req.code);
        req.validate()?;

        EquipmentRepository::new(&self.db)
            .create(org, &req)
            .await
            .map_err(|e| duplicate_code(e, &req.code))
    }

    pub async fn update(
        &self,
        ctx: &SecurityContext,
        id: Uuid,
        mut req: UpdateEquipmentRequest,
    ) -> AppResult<Equipment> {
        let org = ctx.require_organization()?;
        ctx.authorize("equipment.update", org, AccessLevel::Write)?;

        req.code = req.code.as_deref().map(normalize_equipment_code);
        req.validate()?;

        EquipmentRepository::new(&self.db)
            .update(org, id, &req)
            .await
            .map_err(|e| duplicate_code(e, req.code.as_deref().unwrap_or_default()))?
            .ok_or_else(|| AppError::not_found(format!("Equipment {} not found", id)))
    }

    pub async fn delete(&self, ctx: &SecurityContext, id: Uuid) -> AppResult<()> {
        let org = ctx.require_organization()?;
        ctx.authorize("equipment.delete", org, AccessLevel::Admin)?;

        if EquipmentRepository::new(&self.db).delete(org, id).await? {
            Ok(())
        } else {
            Err(AppError::not_found(format!("Equipment {} not found", id)))
        }
    }
}

fn duplicate_code(err: anyhow::Error, code: &str) -> AppError {
    if is_unique_violation(&err) {
        AppError::conflict(format!("Equipment code '{}' is already in use", code))
    } else {
        err.into()
    }
}
