//! Identity provider webhook endpoints
//!
//! One route per event category, each verified with its own signing secret.
//! The raw body is verified before it is parsed.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tracing::warn;

use crate::{
    models::{EventCategory, IdentityEvent, WebhookEnvelope},
    services::{OutcomeKind, WebhookOutcome},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/organizations", post(organizations_webhook))
        .route("/memberships", post(memberships_webhook))
        .route("/users", post(users_webhook))
}

async fn organizations_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_delivery(&state, EventCategory::Organizations, &headers, &body).await
}

async fn memberships_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_delivery(&state, EventCategory::Memberships, &headers, &body).await
}

async fn users_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_delivery(&state, EventCategory::Users, &headers, &body).await
}

fn reply(status: StatusCode, outcome: WebhookOutcome) -> Response {
    (status, Json(outcome)).into_response()
}

async fn handle_delivery(
    state: &AppState,
    category: EventCategory,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let Some(verifier) = state.webhooks.for_category(category) else {
        warn!(category = category.as_str(), "No signing secret configured; rejecting delivery");
        return reply(
            StatusCode::UNAUTHORIZED,
            WebhookOutcome::failed("Webhook endpoint is not configured"),
        );
    };

    if let Err(e) = verifier.verify(headers, body) {
        warn!(category = category.as_str(), error = %e, "Webhook signature rejected");
        return reply(
            StatusCode::UNAUTHORIZED,
            WebhookOutcome::failed(format!("Invalid signature: {}", e)),
        );
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return reply(
                StatusCode::BAD_REQUEST,
                WebhookOutcome::failed(format!("Malformed payload: {}", e)),
            )
        }
    };
    let event_type = envelope.event_type.clone();

    let event = match IdentityEvent::decode(envelope) {
        Ok(Some(event)) => event,
        Ok(None) => {
            return reply(
                StatusCode::OK,
                WebhookOutcome::skipped(format!("Ignored unsupported event type {}", event_type)),
            )
        }
        Err(e) => {
            return reply(
                StatusCode::BAD_REQUEST,
                WebhookOutcome::failed(format!("Malformed {} payload: {}", event_type, e)),
            )
        }
    };

    if event.category() != category {
        return reply(
            StatusCode::BAD_REQUEST,
            WebhookOutcome::failed(format!(
                "Event {} is not accepted on the {} endpoint",
                event_type,
                category.as_str()
            )),
        );
    }

    let outcome = state.reconciler.handle_event(event).await;
    let status = match outcome.kind {
        OutcomeKind::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    reply(status, outcome)
}
