use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::db::entities::{command, device};
use crate::db::enums::{CommandPriority, CommandType};
use crate::db::services::command_service::{self, CommandError, NewCommand};
use crate::db::services::device_service;
use crate::web::models::{
    AuthenticatedUser, BulkCommandRequest, CommandResultRequest, CreateCommandRequest,
};
use crate::web::{AppState, error::AppError};

impl From<CommandError> for AppError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NotFound => AppError::NotFound("Command not found".to_string()),
            CommandError::NotRetryable => AppError::InvalidInput(
                "Command cannot be retried (max retries reached or invalid status)".to_string(),
            ),
            CommandError::Db(db_err) => AppError::DatabaseError(db_err.to_string()),
        }
    }
}

fn command_payload(cmd: &command::Model) -> serde_json::Value {
    json!({
        // "id" duplicates "command_id" for firmware compatibility.
        "id": cmd.command_id,
        "command_id": cmd.command_id,
        "command_type": cmd.command_type,
        "priority": cmd.priority,
        "payload": cmd.payload,
        "description": cmd.description,
        "created_at": cmd.created_at.to_rfc3339(),
        "expires_at": cmd.expires_at.map(|ts| ts.to_rfc3339()),
    })
}

fn parse_new_command(
    command_type: Option<&str>,
    priority: Option<&str>,
    payload: Option<serde_json::Value>,
    description: Option<String>,
    expires_in_hours: Option<i64>,
    created_by: Option<i32>,
) -> Result<NewCommand, AppError> {
    let command_type = command_type
        .and_then(CommandType::parse)
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Invalid command type. Valid types: {:?}",
                CommandType::valid_values()
            ))
        })?;
    let priority = match priority {
        None => CommandPriority::Normal,
        Some(value) => CommandPriority::parse(value)
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid priority: {value}")))?,
    };
    Ok(NewCommand {
        command_type,
        priority,
        payload: payload.unwrap_or_else(|| json!({})),
        description,
        expires_in_hours: expires_in_hours.unwrap_or(command_service::DEFAULT_TTL_HOURS),
        created_by,
    })
}

/// Device poll. Pending commands are marked sent as they are handed out;
/// the device id in the path must match the authenticated device.
async fn poll_commands_handler(
    Extension(dev): Extension<device::Model>,
    State(app_state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if dev.device_id != device_id {
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }
    let commands = command_service::poll(&app_state.db, &dev).await?;
    let command_list: Vec<serde_json::Value> = commands.iter().map(command_payload).collect();
    Ok(Json(json!({
        "commands": command_list,
        "count": command_list.len(),
        "device_id": device_id,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn report_result_handler(
    Extension(dev): Extension<device::Model>,
    State(app_state): State<Arc<AppState>>,
    Path((device_id, command_id)): Path<(String, String)>,
    Json(payload): Json<CommandResultRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if dev.device_id != device_id {
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }
    if command_id.is_empty() || command_id == "null" || command_id == "None" {
        return Err(AppError::InvalidInput(format!(
            "Invalid command_id: '{command_id}'. Command ID cannot be null or empty."
        )));
    }
    let updated =
        command_service::report_result(&app_state.db, &dev, &command_id, &payload).await?;
    Ok(Json(json!({
        "status": "updated",
        "command_id": updated.command_id,
        "success": payload.success,
    })))
}

async fn create_command_handler(
    Extension(account): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(payload): Json<CreateCommandRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let dev = device_service::find_by_device_id(&app_state.db, &device_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".to_string()))?;

    let new = parse_new_command(
        Some(payload.command_type.as_str()),
        payload.priority.as_deref(),
        payload.payload,
        payload.description,
        payload.expires_in_hours,
        Some(account.id),
    )?;
    let created = command_service::enqueue(&app_state.db, &dev, &new).await?;
    Ok(Json(json!({
        "status": "created",
        "command_id": created.command_id,
        "command_type": created.command_type,
        "device_id": device_id,
        "expires_at": created.expires_at.map(|ts| ts.to_rfc3339()),
    })))
}

async fn command_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let dev = device_service::find_by_device_id(&app_state.db, &device_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".to_string()))?;

    let (counts, recent) = command_service::status_summary(&app_state.db, &dev, 10).await?;
    let recent_commands: Vec<serde_json::Value> = recent
        .iter()
        .map(|cmd| {
            json!({
                "command_id": cmd.command_id,
                "command_type": cmd.command_type,
                "status": cmd.status,
                "priority": cmd.priority,
                "created_at": cmd.created_at.to_rfc3339(),
                "executed_at": cmd.executed_at.map(|ts| ts.to_rfc3339()),
                "error_message": cmd.error_message,
                "retry_count": cmd.retry_count,
            })
        })
        .collect();

    Ok(Json(json!({
        "device_id": device_id,
        "stats": counts,
        "recent_commands": recent_commands,
    })))
}

async fn retry_command_handler(
    State(app_state): State<Arc<AppState>>,
    Path(command_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let retried = command_service::retry(&app_state.db, &command_id).await?;
    Ok(Json(json!({
        "status": "retried",
        "command_id": retried.command_id,
        "retry_count": retried.retry_count,
    })))
}

async fn bulk_create_handler(
    Extension(account): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<BulkCommandRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if payload.device_ids.is_empty() || payload.command_type.is_none() {
        return Err(AppError::InvalidInput(
            "device_ids and command_type are required".to_string(),
        ));
    }
    let new = parse_new_command(
        payload.command_type.as_deref(),
        payload.priority.as_deref(),
        payload.payload,
        payload.description,
        payload.expires_in_hours,
        Some(account.id),
    )?;
    let outcome = command_service::bulk_create(&app_state.db, &payload.device_ids, &new).await?;
    Ok(Json(json!({
        "status": "bulk_created",
        "created_count": outcome.created.len(),
        "failed_count": outcome.failed_devices.len(),
        "created_commands": outcome.created,
        "failed_devices": outcome.failed_devices,
    })))
}

/// Device-facing poll/report endpoints, nested under /api/device behind
/// device bearer auth.
pub fn create_device_command_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{device_id}/commands", get(poll_commands_handler))
        .route(
            "/{device_id}/commands/{command_id}/result",
            post(report_result_handler),
        )
}

/// Operator command management under /api/devices/{device_id}.
pub fn create_device_admin_command_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{device_id}/commands", post(create_command_handler))
        .route("/{device_id}/commands/status", get(command_status_handler))
}

/// Operator command utilities under /api/commands.
pub fn create_command_admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{command_id}/retry", post(retry_command_handler))
        .route("/bulk", post(bulk_create_handler))
}
