//! Current user endpoints

use axum::{extract::State, routing::{get, patch}, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{
    db::{OrganizationRepository, UserRepository},
    middleware::UserContext,
    models::{AppUser, OrgRole, Organization},
    services::ProviderSession,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_me))
        .route("/onboarding", patch(update_onboarding))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: AppUser,
    pub organization: Option<Organization>,
    pub role: Option<OrgRole>,
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    pub onboarding: serde_json::Value,
}

/// Sync the caller's identity (cached) and return the local view of it
async fn get_me(
    State(state): State<AppState>,
    session: ProviderSession,
) -> Result<Json<MeResponse>, AppError> {
    let synced = state.reconciler.lazy_sync(&session).await?;

    let user = UserRepository::new(&state.db)
        .get_by_id(synced.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let organization = match synced.organization_id {
        Some(id) => OrganizationRepository::new(&state.db).get_by_id(id).await?,
        None => None,
    };

    let provider_admin = session
        .org_role
        .as_deref()
        .is_some_and(|r| OrgRole::from_provider(r) == OrgRole::Admin);

    Ok(Json(MeResponse {
        is_admin: user.is_admin || provider_admin,
        user,
        organization,
        role: synced.role,
    }))
}

/// Store onboarding progress in the identity provider and mirror it locally
async fn update_onboarding(
    State(state): State<AppState>,
    UserContext(ctx): UserContext,
    Json(payload): Json<OnboardingRequest>,
) -> Result<Json<AppUser>, AppError> {
    if !payload.onboarding.is_object() {
        return Err(AppError::bad_request("onboarding must be a JSON object"));
    }

    let user = state
        .reconciler
        .update_onboarding(&ctx, payload.onboarding)
        .await?;
    Ok(Json(user))
}
