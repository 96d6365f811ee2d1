//! Organization (tenant) API endpoints

use axum::{extract::State, routing::get, Json, Router};

use crate::{
    db::{MembershipRepository, OrganizationRepository},
    models::{Organization, OrganizationMember},
    services::{AccessLevel, SecurityContext},
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/current", get(get_current_organization))
        .route("/current/members", get(list_current_members))
}

async fn get_current_organization(
    State(state): State<AppState>,
    ctx: SecurityContext,
) -> Result<Json<Organization>, AppError> {
    let org_id = ctx.require_organization()?;
    ctx.authorize("organizations.get", org_id, AccessLevel::Read)?;

    let org = OrganizationRepository::new(&state.db)
        .get_by_id(org_id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization not found"))?;

    Ok(Json(org))
}

async fn list_current_members(
    State(state): State<AppState>,
    ctx: SecurityContext,
) -> Result<Json<Vec<OrganizationMember>>, AppError> {
    let org_id = ctx.require_organization()?;
    ctx.authorize("organizations.members", org_id, AccessLevel::Read)?;

    let members = MembershipRepository::new(&state.db)
        .list_members(org_id)
        .await?;

    Ok(Json(members))
}
