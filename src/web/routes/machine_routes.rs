use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde_json::json;
use std::sync::Arc;

use crate::db::services::machine_service;
use crate::web::models::{AssignOutletRequest, CreateMachineRequest};
use crate::web::{AppState, error::AppError};

async fn list_machines_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let machines = machine_service::list_overview(&app_state.db).await?;
    Ok(Json(json!({ "machines": machines })))
}

async fn create_machine_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateMachineRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("name required".to_string()));
    }
    let created =
        machine_service::create(&app_state.db, name, payload.machine_type.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "machine": created }))))
}

async fn delete_machine_handler(
    State(app_state): State<Arc<AppState>>,
    Path(machine_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let existing = machine_service::get(&app_state.db, machine_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Machine not found".to_string()))?;
    machine_service::delete(&app_state.db, existing).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_outlet_handler(
    State(app_state): State<Arc<AppState>>,
    Path(machine_id): Path<i32>,
    Json(payload): Json<AssignOutletRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let existing = machine_service::get(&app_state.db, machine_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Machine not found".to_string()))?;
    let updated =
        machine_service::assign_outlet(&app_state.db, existing, Some(payload.outlet_id)).await?;
    Ok(Json(json!({
        "status": "assigned",
        "machine_id": updated.id,
        "outlet_id": updated.outlet_id,
    })))
}

async fn unassign_outlet_handler(
    State(app_state): State<Arc<AppState>>,
    Path(machine_id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    let existing = machine_service::get(&app_state.db, machine_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Machine not found".to_string()))?;
    let updated = machine_service::assign_outlet(&app_state.db, existing, None).await?;
    Ok(Json(json!({
        "status": "unassigned",
        "machine_id": updated.id,
    })))
}

async fn unregistered_machines_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let machines = machine_service::list_unregistered(&app_state.db).await?;
    Ok(Json(json!({ "machines": machines })))
}

/// Treatment/reset history for a machine's bound device.
async fn machine_logs_handler(
    State(app_state): State<Arc<AppState>>,
    Path(machine_id): Path<i32>,
) -> Result<Json<machine_service::TreatmentLogs>, AppError> {
    let existing = machine_service::get(&app_state.db, machine_id)
        .await?
        .ok_or_else(|| AppError::NotFound("machine_not_found".to_string()))?;
    let logs = machine_service::treatment_logs(&app_state.db, &existing).await?;
    Ok(Json(logs))
}

pub fn create_machines_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_machines_handler).post(create_machine_handler))
        .route("/unregistered", get(unregistered_machines_handler))
        .route("/{machine_id}", delete(delete_machine_handler))
        .route("/{machine_id}/assign-outlet", post(assign_outlet_handler))
        .route(
            "/{machine_id}/unassign-outlet",
            post(unassign_outlet_handler),
        )
        .route("/{machine_id}/logs", get(machine_logs_handler))
}
