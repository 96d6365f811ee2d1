//! Equipment API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::{
    api::parse_id,
    models::{CreateEquipmentRequest, Equipment, EquipmentQuery, UpdateEquipmentRequest},
    services::SecurityContext,
    utils::AppError,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_equipment).post(create_equipment))
        .route("/by-code/{code}", get(find_by_code))
        .route(
            "/{id}",
            get(get_equipment)
                .put(update_equipment)
                .delete(delete_equipment),
        )
}

async fn list_equipment(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Query(query): Query<EquipmentQuery>,
) -> Result<Json<Vec<Equipment>>, AppError> {
    Ok(Json(state.equipment.list(&ctx, &query).await?))
}

/// Unknown codes and codes of other organizations both answer 404
async fn find_by_code(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(code): Path<String>,
) -> Result<Json<Equipment>, AppError> {
    state
        .equipment
        .find_by_code(&ctx, &code)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Equipment not found"))
}

async fn get_equipment(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(id): Path<String>,
) -> Result<Json<Equipment>, AppError> {
    let id = parse_id(&id, "equipment")?;
    Ok(Json(state.equipment.get(&ctx, id).await?))
}

async fn create_equipment(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Json(payload): Json<CreateEquipmentRequest>,
) -> Result<(StatusCode, Json<Equipment>), AppError> {
    let equipment = state.equipment.create(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(equipment)))
}

async fn update_equipment(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(id): Path<String>,
    Json(payload): Json<UpdateEquipmentRequest>,
) -> Result<Json<Equipment>, AppError> {
    let id = parse_id(&id, "equipment")?;
    Ok(Json(state.equipment.update(&ctx, id, payload).await?))
}

async fn delete_equipment(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id, "equipment")?;
    state.equipment.delete(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
