use axum::{
    Json, Router,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::db::services::{flush_service, stats_service};
use crate::web::models::ExportParams;
use crate::web::{AppState, error::AppError};

const DEFAULT_EXPORT_DAYS: i64 = 30;

/// Per-device raw event export as CSV.
async fn export_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, AppError> {
    let device_id = params
        .device_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidInput("device_id required".to_string()))?;
    let days = params.days.unwrap_or(DEFAULT_EXPORT_DAYS).max(1);

    let events = stats_service::events_for_export(&app_state.db, device_id, days).await?;
    let body = stats_service::events_csv(&events);

    let end = Utc::now().date_naive();
    let start = end - Duration::days(days);
    let disposition = format!(
        "attachment; filename=\"telemetry_{device_id}_{start}_to_{end}.csv\""
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn flush_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    flush_service::flush_telemetry(&app_state.db).await?;
    Ok(Json(json!({ "status": "flushed" })))
}

async fn flush_all_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    flush_service::flush_all_except_admins(&app_state.db).await?;
    Ok(Json(json!({ "status": "flushed_except_admin" })))
}

pub fn create_export_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(export_handler))
}

/// Destructive flush endpoints; the admin-role gate is layered on top in
/// the main router.
pub fn create_flush_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(flush_handler))
        .route("/all", post(flush_all_handler))
}
