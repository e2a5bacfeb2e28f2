use axum::{
    Extension, Json, Router,
    extract::State,
    routing::post,
};
use serde_json::json;
use std::sync::Arc;

use crate::db::entities::device;
use crate::db::services::device_service;
use crate::db::services::ingest_service::{self, IngestError};
use crate::web::models::{DeviceEventRequest, HandshakeRequest, LegacyIngestRequest};
use crate::web::{AppState, error::AppError};

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MissingField(field) => AppError::InvalidInput(format!("{field} required")),
            IngestError::InvalidEvent => {
                AppError::InvalidInput("invalid event/treatment".to_string())
            }
            IngestError::InvalidCounter => {
                AppError::InvalidInput("counter must be int".to_string())
            }
            IngestError::Db(db_err) => AppError::DatabaseError(db_err.to_string()),
        }
    }
}

async fn handshake_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<HandshakeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mac = payload
        .mac
        .as_deref()
        .map(str::trim)
        .filter(|mac| !mac.is_empty())
        .ok_or_else(|| AppError::InvalidInput("mac required".to_string()))?;
    let firmware = payload
        .firmware
        .as_deref()
        .map(str::trim)
        .filter(|fw| !fw.is_empty());

    let result = device_service::handshake(&app_state.db, mac, firmware).await?;
    Ok(Json(json!({
        "device_id": result.device_id,
        "token": result.token,
        "assigned": result.assigned,
    })))
}

/// Legacy ESP32 ingest: form-urlencoded, keyed by MAC, no authentication.
async fn iot_ingest_handler(
    State(app_state): State<Arc<AppState>>,
    axum::extract::Form(payload): axum::extract::Form<LegacyIngestRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    ingest_service::ingest_legacy(&app_state.db, &payload).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Authenticated event ingest. A duplicate event_id is acknowledged
/// identically to the first submission.
async fn device_events_handler(
    Extension(dev): Extension<device::Model>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<DeviceEventRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ack = ingest_service::ingest_event(&app_state.db, &dev, &payload).await?;
    Ok(Json(json!({ "ack": true, "event_id": ack.event_id })))
}

/// Open endpoints: handshake and the legacy ingest path.
pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/handshake", post(handshake_handler))
        .route("/iot", post(iot_ingest_handler))
}

/// Bearer-authenticated device event submission, nested under /api/device.
pub fn create_device_events_router() -> Router<Arc<AppState>> {
    Router::new().route("/events", post(device_events_handler))
}
