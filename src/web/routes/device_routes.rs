use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;

use crate::db::services::device_service::{self, BindError};
use crate::web::models::BindDeviceRequest;
use crate::web::{AppState, error::AppError};

impl From<BindError> for AppError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::DeviceNotFound => AppError::NotFound("device not found".to_string()),
            BindError::MachineNotFound => AppError::NotFound("machine not found".to_string()),
            BindError::Db(db_err) => AppError::DatabaseError(db_err.to_string()),
        }
    }
}

async fn list_devices_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let devices = device_service::list_overview(&app_state.db).await?;
    Ok(Json(json!({ "devices": devices })))
}

async fn list_online_devices_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let devices = device_service::list_online(&app_state.db).await?;
    Ok(Json(json!({ "devices": devices })))
}

/// Binds a device to a machine, releasing prior bindings on both sides.
async fn bind_device_handler(
    State(app_state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(payload): Json<BindDeviceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    device_service::bind_to_machine(&app_state.db, &device_id, payload.machine_id).await?;
    Ok(Json(json!({
        "status": "bound",
        "machine_id": payload.machine_id,
        "device_id": device_id,
    })))
}

async fn unbind_device_handler(
    State(app_state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    device_service::unbind_from_machine(&app_state.db, &device_id).await?;
    Ok(Json(json!({
        "status": "unbound",
        "device_id": device_id,
    })))
}

pub fn create_devices_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_devices_handler))
        .route("/online", get(list_online_devices_handler))
        .route("/{device_id}/bind", post(bind_device_handler))
        .route("/{device_id}/unbind", post(unbind_device_handler))
}
