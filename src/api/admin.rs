//! Operator endpoints
//!
//! `POST /admin/reconcile` accepts either the internal API key (`X-API-Key`)
//! or a provider session. Errors use the `{error, status: "error"}` shape
//! expected by the operator tooling.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use crate::{
    middleware::resolve_with_sync,
    models::OrgRole,
    services::{ReconcileScope, SyncError},
    utils::AppError,
    AppState,
};

const API_KEY_HEADER: &str = "x-api-key";

pub fn routes() -> Router<AppState> {
    Router::new().route("/reconcile", post(reconcile))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
}

impl ReconcileRequest {
    pub fn scope(&self) -> Result<ReconcileScope, String> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        match self.kind.as_str() {
            "full" => Ok(ReconcileScope::Full),
            "user" => non_empty(&self.user_id)
                .map(ReconcileScope::User)
                .ok_or_else(|| "userId is required for user reconciliation".to_string()),
            "organization" => non_empty(&self.organization_id)
                .map(ReconcileScope::Organization)
                .ok_or_else(|| {
                    "organizationId is required for organization reconciliation".to_string()
                }),
            other => Err(format!("Unknown reconciliation type: {}", other)),
        }
    }
}

fn admin_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": message.into(), "status": "error" })),
    )
        .into_response()
}

/// Identity problems map to `denied`; upstream and store failures are 500
fn resolution_error(denied: StatusCode, err: AppError) -> Response {
    match err {
        AppError::Unauthenticated(_) | AppError::NotFound(_) | AppError::Forbidden(_) => {
            admin_error(denied, err.to_string())
        }
        other => {
            error!(error = %other, "Failed to resolve reconciliation caller");
            admin_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn api_key_matches(state: &AppState, presented: &[u8]) -> bool {
    match state.config.admin.internal_api_key.as_deref() {
        Some(expected) if !expected.is_empty() => {
            bool::from(expected.as_bytes().ct_eq(presented))
        }
        _ => false,
    }
}

/// Session callers: global admins for every scope, organization admins for
/// their own organization only.
async fn authorize_session(
    state: &AppState,
    headers: &HeaderMap,
    scope: &ReconcileScope,
) -> Result<(), Response> {
    let session = state
        .sessions
        .authenticate(headers)
        .map_err(|e| admin_error(StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = resolve_with_sync(state, &session, false)
        .await
        .map_err(|e| resolution_error(StatusCode::UNAUTHORIZED, e))?;
    if user.user_is_admin {
        return Ok(());
    }

    if let ReconcileScope::Organization(target) = scope {
        if session.selected_org() == Some(target.as_str()) {
            let ctx = resolve_with_sync(state, &session, true)
                .await
                .map_err(|e| resolution_error(StatusCode::FORBIDDEN, e))?;
            if ctx.is_admin || ctx.role == Some(OrgRole::Admin) {
                return Ok(());
            }
        }
    }

    warn!(
        user = %session.user_id,
        scope = scope.kind(),
        "Reconciliation denied"
    );
    Err(admin_error(
        StatusCode::FORBIDDEN,
        "Administrator privileges required",
    ))
}

async fn reconcile(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request: ReconcileRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return admin_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e)),
    };
    let scope = match request.scope() {
        Ok(scope) => scope,
        Err(message) => return admin_error(StatusCode::BAD_REQUEST, message),
    };

    match headers.get(API_KEY_HEADER) {
        Some(key) => {
            if !api_key_matches(&state, key.as_bytes()) {
                warn!("Reconciliation rejected: invalid API key");
                return admin_error(StatusCode::UNAUTHORIZED, "Invalid API key");
            }
        }
        None => {
            if let Err(response) = authorize_session(&state, &headers, &scope).await {
                return response;
            }
        }
    }

    info!(scope = scope.kind(), target = ?scope.target(), "Reconciliation requested");

    match state.reconciler.reconcile(scope).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(SyncError::Provider(e)) if e.is_not_found() => {
            admin_error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Reconciliation failed");
            admin_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
