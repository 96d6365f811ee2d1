//! Project API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::{
    api::parse_id,
    models::{CreateProjectRequest, Project, ProjectQuery, UpdateProjectRequest},
    services::SecurityContext,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
}

async fn list_projects(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.projects.list(&ctx, &query).await?))
}

async fn get_project(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(id): Path<String>,
) -> Result<Json<Project>, AppError> {
    let id = parse_id(&id, "project")?;
    Ok(Json(state.projects.get(&ctx, id).await?))
}

async fn create_project(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let project = state.projects.create(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn update_project(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    let id = parse_id(&id, "project")?;
    Ok(Json(state.projects.update(&ctx, id, payload).await?))
}

async fn delete_project(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id, "project")?;
    state.projects.delete(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
