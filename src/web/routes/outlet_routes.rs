use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use sea_orm::DbErr;
use serde_json::json;
use std::sync::Arc;

use crate::db::services::outlet_service::{self, OutletInput};
use crate::web::models::{AssignMachineRequest, OutletRequest};
use crate::web::{AppState, error::AppError};

fn outlet_input(payload: OutletRequest) -> Result<OutletInput, AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::InvalidInput("name required".to_string()));
    }
    Ok(OutletInput {
        name,
        location: payload.location,
        address: payload.address,
        contact_person: payload.contact_person,
        contact_phone: payload.contact_phone,
    })
}

fn map_unique_violation(err: DbErr) -> AppError {
    if matches!(err.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_))) {
        return AppError::Conflict("An outlet with this name already exists.".to_string());
    }
    AppError::DatabaseError(err.to_string())
}

async fn list_outlets_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outlets = outlet_service::list_overview(&app_state.db).await?;
    Ok(Json(json!({ "outlets": outlets })))
}

async fn create_outlet_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<OutletRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let input = outlet_input(payload)?;
    let created = outlet_service::create(&app_state.db, &input)
        .await
        .map_err(map_unique_violation)?;
    Ok((StatusCode::CREATED, Json(json!({ "outlet": created }))))
}

async fn update_outlet_handler(
    State(app_state): State<Arc<AppState>>,
    Path(outlet_id): Path<i32>,
    Json(payload): Json<OutletRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let existing = outlet_service::get(&app_state.db, outlet_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Outlet not found".to_string()))?;
    let input = outlet_input(payload)?;
    let updated = outlet_service::update(&app_state.db, existing, &input)
        .await
        .map_err(map_unique_violation)?;
    Ok(Json(json!({ "outlet": updated })))
}

async fn delete_outlet_handler(
    State(app_state): State<Arc<AppState>>,
    Path(outlet_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let existing = outlet_service::get(&app_state.db, outlet_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Outlet not found".to_string()))?;
    outlet_service::delete(&app_state.db, existing).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_machine_handler(
    State(app_state): State<Arc<AppState>>,
    Path(outlet_id): Path<i32>,
    Json(payload): Json<AssignMachineRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    outlet_service::get(&app_state.db, outlet_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Outlet not found".to_string()))?;
    let updated = outlet_service::assign_machine(&app_state.db, outlet_id, payload.machine_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Machine not found".to_string()))?;
    Ok(Json(json!({
        "status": "assigned",
        "outlet_id": outlet_id,
        "machine_id": updated.id,
    })))
}

async fn outlet_machines_handler(
    State(app_state): State<Arc<AppState>>,
    Path(outlet_id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    outlet_service::get(&app_state.db, outlet_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Outlet not found".to_string()))?;
    let machines = outlet_service::machines_of(&app_state.db, outlet_id).await?;
    Ok(Json(json!({ "machines": machines })))
}

pub fn create_outlets_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_outlets_handler).post(create_outlet_handler))
        .route(
            "/{outlet_id}",
            put(update_outlet_handler).delete(delete_outlet_handler),
        )
        .route("/{outlet_id}/machines", get(outlet_machines_handler))
        .route("/{outlet_id}/assign-machine", post(assign_machine_handler))
}
