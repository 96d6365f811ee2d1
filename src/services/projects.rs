//! Project (job site) service

use uuid::Uuid;
use validator::Validate;

use crate::db::{DbPool, ProjectRepository};
use crate::models::{CreateProjectRequest, Project, ProjectQuery, UpdateProjectRequest};
use crate::services::security::{AccessLevel, SecurityContext};
use crate::utils::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ProjectService {
    db: DbPool,
}

impl ProjectService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, ctx: &SecurityContext, query: &ProjectQuery) -> AppResult<Vec<Project>> {
        let org = ctx.require_organization()?;
        ctx.authorize("projects.list", org, AccessLevel::Read)?;

        Ok(ProjectRepository::new(&self.db).list(org, query).await?)
    }

    pub async fn get(&self, ctx: &SecurityContext, id: Uuid) -> AppResult<Project> {
        let org = ctx.require_organization()?;
        let project = ProjectRepository::new(&self.db)
            .get(org, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Project {} not found", id)))?;

        ctx.authorize("projects.get", project.organization_id, AccessLevel::Read)?;
        Ok(project)
    }

    pub async fn create(&self, ctx: &SecurityContext, req: CreateProjectRequest) -> AppResult<Project> {
        let org = ctx.require_organization()?;
        ctx.authorize("projects.create", org, AccessLevel::Write)?;
        req.validate()?;

        Ok(ProjectRepository::new(&self.db).create(org, &req).await?)
    }

    pub async fn update(
        &self,
        ctx: &SecurityContext,
        id: Uuid,
        req: UpdateProjectRequest,
    ) -> AppResult<Project> {
        let org = ctx.require_organization()?;
        ctx.authorize("projects.update", org, AccessLevel::Write)?;
        req.validate()?;

        ProjectRepository::new(&self.db)
            .update(org, id, &req)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Project {} not found", id)))
    }

    pub async fn delete(&self, ctx: &SecurityContext, id: Uuid) -> AppResult<()> {
        let org = ctx.require_organization()?;
        ctx.authorize("projects.delete", org, AccessLevel::Admin)?;

        if ProjectRepository::new(&self.db).delete(org, id).await? {
            Ok(())
        } else {
            Err(AppError::not_found(format!("Project {} not found", id)))
        }
    }
}
