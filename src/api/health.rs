//! Health check endpoints
//!
//! Provides health check endpoints for monitoring and load balancers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{db::migrations, AppState};

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Detailed health response with component status
#[derive(Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub components: ComponentHealth,
}

/// Health status of individual components
#[derive(Serialize)]
pub struct ComponentHealth {
    pub database: ComponentStatus,
    pub webhooks: ComponentStatus,
    pub sync_cache: ComponentStatus,
}

/// Status of a single component
#[derive(Serialize)]
pub struct ComponentStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    fn with_message(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: Some(message.into()),
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_message("unhealthy", message)
    }

    fn is_healthy(&self) -> bool {
        self.status != "unhealthy"
    }
}

async fn database_status(state: &AppState) -> ComponentStatus {
    match migrations::check(&state.db).await {
        Ok(true) => ComponentStatus::healthy(),
        Ok(false) => ComponentStatus::unhealthy("Schema not initialized"),
        Err(e) => ComponentStatus::unhealthy(e.to_string()),
    }
}

/// Simple health check endpoint (for load balancers)
///
/// Returns 200 OK if the service is running.
/// Does not check component health.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Detailed health check endpoint
///
/// Returns 200 if the database is usable, 503 otherwise. Webhook secrets and
/// the sync cache are reported but never make the service unhealthy.
pub async fn health_check_detailed(
    State(state): State<AppState>,
) -> (StatusCode, Json<DetailedHealthResponse>) {
    let database = database_status(&state).await;

    let w = &state.config.webhooks;
    let configured = [
        &w.organizations_secret,
        &w.memberships_secret,
        &w.users_secret,
    ]
    .iter()
    .filter(|s| s.is_some())
    .count();
    let webhooks = if configured == 3 {
        ComponentStatus::healthy()
    } else {
        ComponentStatus::with_message(
            "degraded",
            format!("{} of 3 webhook secrets configured", configured),
        )
    };

    let sync_cache = if state.config.sync_cache.enabled {
        ComponentStatus::with_message("healthy", format!("{} entries", state.sync_cache.len()))
    } else {
        ComponentStatus::with_message("disabled", "lazy sync runs on every request")
    };

    let overall_healthy = database.is_healthy();
    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = DetailedHealthResponse {
        status: if overall_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        components: ComponentHealth {
            database,
            webhooks,
            sync_cache,
        },
    };

    (status_code, Json(response))
}

/// Liveness probe (for Kubernetes)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: the database answers and migrations have run
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if database_status(&state).await.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
