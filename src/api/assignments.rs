//! Assignment API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::{
    api::parse_id,
    models::{Assignment, AssignmentQuery, CreateAssignmentRequest},
    services::SecurityContext,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assignments).post(create_assignment))
        .route("/{id}/return", post(return_assignment))
}

async fn list_assignments(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Query(query): Query<AssignmentQuery>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    Ok(Json(state.assignments.list(&ctx, &query).await?))
}

async fn create_assignment(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Json(payload): Json<CreateAssignmentRequest>,
) -> Result<(StatusCode, Json<Assignment>), AppError> {
    let assignment = state.assignments.assign(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn return_assignment(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(id): Path<String>,
) -> Result<Json<Assignment>, AppError> {
    let id = parse_id(&id, "assignment")?;
    Ok(Json(state.assignments.return_equipment(&ctx, id).await?))
}
