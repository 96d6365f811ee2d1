//! Assignment service: hands equipment to a user or a project and takes it back

use uuid::Uuid;
use validator::Validate;

use crate::db::{
    is_unique_violation, AssignmentRepository, DbPool, EquipmentRepository, MembershipRepository,
    ProjectRepository,
};
use crate::models::{Assignment, AssignmentQuery, CreateAssignmentRequest, EquipmentStatus};
use crate::services::security::{AccessLevel, SecurityContext};
use crate::utils::error::{AppError, AppResult};

#[derive(Clone)]
pub struct AssignmentService {
    db: DbPool,
}

impl AssignmentService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, ctx: &SecurityContext, query: &AssignmentQuery) -> AppResult<Vec<Assignment>> {
        let org = ctx.require_organization()?;
        ctx.authorize("assignments.list", org, AccessLevel::Read)?;

        Ok(AssignmentRepository::new(&self.db).list(org, query).await?)
    }

    /// Assign available equipment. Every referenced record must belong to the
    /// caller's organization.
    pub async fn assign(&self, ctx: &SecurityContext, req: CreateAssignmentRequest) -> AppResult<Assignment> {
        let org = ctx.require_organization()?;
        ctx.authorize("assignments.create", org, AccessLevel::Write)?;
        req.validate()?;

        let equipment = EquipmentRepository::new(&self.db)
            .get(org, req.equipment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Equipment {} not found", req.equipment_id)))?;

        if equipment.status != EquipmentStatus::Available {
            return Err(AppError::conflict(format!(
                "Equipment {} is {}",
                equipment.code,
                equipment.status.as_str()
            )));
        }

        if let Some(user_id) = req.user_id {
            MembershipRepository::new(&self.db)
                .get(org, user_id)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!("User {} is not a member of this organization", user_id))
                })?;
        }

        if let Some(project_id) = req.project_id {
            ProjectRepository::new(&self.db)
                .get(org, project_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Project {} not found", project_id)))?;
        }

        AssignmentRepository::new(&self.db)
            .create(org, ctx.user_id, &req)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::conflict(format!("Equipment {} is already assigned", equipment.code))
                } else {
                    e.into()
                }
            })
    }

    /// Close an assignment. Returning twice is a no-op.
    pub async fn return_equipment(&self, ctx: &SecurityContext, id: Uuid) -> AppResult<Assignment> {
        let org = ctx.require_organization()?;
        ctx.authorize("assignments.return", org, AccessLevel::Write)?;

        AssignmentRepository::new(&self.db)
            .mark_returned(org, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Assignment {} not found", id)))
    }
}
