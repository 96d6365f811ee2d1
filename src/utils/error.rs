//! Error types and handling
//!
//! All request-facing failures are converted to a consistent JSON response
//! format. Security failures, validation failures and upstream failures stay
//! distinguishable so clients can tell "not authorized" from "service
//! unavailable".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::services::identity_provider::ProviderError;
use crate::services::reconciliation::SyncError;
use crate::services::security::SecurityError;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// No verified caller identity (401)
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller known but not allowed: tenant mismatch or insufficient role (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource or local mirror record not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request - unparseable input (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input failed validation; carries field-level details (422)
    #[error("Validation failed: {message}")]
    ValidationFailed {
        message: String,
        fields: serde_json::Value,
    },

    /// Identity provider or other upstream call failed (502)
    #[error("Upstream failure during {operation}: {message}")]
    Upstream { operation: String, message: String },

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        AppError::Unauthenticated(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }

    pub fn upstream(operation: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Upstream {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, should_log) = match &self {
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated", false),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", true),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", false),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", false),
            AppError::ValidationFailed { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", false)
            }
            AppError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream_failure", true),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error", true),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", true),
        };

        if should_log {
            error!(error = %self, error_type = error_type, "Request error");
        }

        let mut body = ErrorResponse::new(error_type, self.to_string());
        if let AppError::ValidationFailed { fields, .. } = self {
            body = body.with_details(fields);
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.message().contains("UNIQUE constraint failed") {
                    AppError::Conflict("Resource already exists".to_string())
                } else {
                    AppError::Database(db_err.to_string())
                }
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let fields = err
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let codes: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                (field.to_string(), serde_json::json!(codes))
            })
            .collect::<serde_json::Map<_, _>>();

        AppError::ValidationFailed {
            message: err.to_string(),
            fields: serde_json::Value::Object(fields),
        }
    }
}

impl From<SecurityError> for AppError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Unauthenticated(msg) => AppError::Unauthenticated(msg),
            SecurityError::Forbidden { operation, reason } => {
                AppError::Forbidden(format!("{}: {}", operation, reason))
            }
            SecurityError::NotFound(what) => AppError::NotFound(what),
            SecurityError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::Upstream {
            operation: err.operation().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Unauthenticated(msg) => AppError::Unauthenticated(msg),
            // The provider does not know the caller; the session is stale
            SyncError::Provider(e) if e.is_not_found() => {
                AppError::Unauthenticated(format!("Identity not recognised: {}", e))
            }
            SyncError::Provider(e) => e.into(),
            SyncError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
