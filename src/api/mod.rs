//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use axum::{routing::get, Router};
use uuid::Uuid;

use crate::{utils::AppError, AppState};

mod admin;
mod assignments;
mod equipment;
mod health;
mod me;
mod organizations;
mod projects;
mod webhooks;

pub use admin::ReconcileRequest;
pub use health::*;
pub use me::MeResponse;

/// Public API routes (no session required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // Health check endpoints
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Identity provider webhooks (signature verification instead of a session)
        .nest("/webhooks", webhooks::routes())
        // API key or session, checked by the handler
        .nest("/admin", admin::routes())
}

/// Session-authenticated routes. Handlers take a `ProviderSession`,
/// `UserContext` or `SecurityContext` extractor.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/me", me::routes())
        .nest("/organizations", organizations::routes())
        .nest("/equipment", equipment::routes())
        .nest("/projects", projects::routes())
        .nest("/assignments", assignments::routes())
}

/// Create the full API router (public + protected; useful for tests)
pub fn routes() -> Router<AppState> {
    public_routes().merge(protected_routes())
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request(format!("Invalid {} ID", what)))
}
