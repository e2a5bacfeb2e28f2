use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::db::entities::{command, device, device_status};
use crate::db::enums::{CommandPriority, CommandStatus, CommandType};
use crate::db::services::device_service;
use crate::web::models::CommandResultRequest;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Command not found")]
    NotFound,
    #[error("Command cannot be retried (max retries reached or invalid status)")]
    NotRetryable,
    #[error(transparent)]
    Db(#[from] DbErr),
}

#[derive(Debug, Clone)]
pub struct NewCommand {
    pub command_type: CommandType,
    pub priority: CommandPriority,
    pub payload: serde_json::Value,
    pub description: Option<String>,
    pub expires_in_hours: i64,
    pub created_by: Option<i32>,
}

pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const DEFAULT_TTL_HOURS: i64 = 24;

fn generate_command_id(device_id: &str, command_type: CommandType) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", device_id, command_type, &suffix[..8])
}

/// Queues a command for a device. The expiry is advisory: expired commands
/// are excluded from poll responses but never actively reaped.
pub async fn enqueue<C: ConnectionTrait>(
    db: &C,
    dev: &device::Model,
    new: &NewCommand,
) -> Result<command::Model, DbErr> {
    let now = Utc::now();
    command::ActiveModel {
        command_id: Set(generate_command_id(&dev.device_id, new.command_type)),
        device_id: Set(dev.id),
        command_type: Set(new.command_type),
        priority: Set(new.priority),
        status: Set(CommandStatus::Pending),
        payload: Set(new.payload.clone()),
        description: Set(new.description.clone()),
        response_data: Set(None),
        error_message: Set(None),
        retry_count: Set(0),
        max_retries: Set(DEFAULT_MAX_RETRIES),
        created_at: Set(now),
        sent_at: Set(None),
        executed_at: Set(None),
        expires_at: Set(Some(now + Duration::hours(new.expires_in_hours))),
        created_by: Set(new.created_by),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Returns all non-expired pending commands, highest priority first and
/// oldest first within a priority, marking each one `sent` as a side
/// effect of the read. There is no lease on the pending->sent transition,
/// so delivery is at-least-once: two concurrent polls can both observe
/// the same pending command.
pub async fn poll(
    db: &DatabaseConnection,
    dev: &device::Model,
) -> Result<Vec<command::Model>, DbErr> {
    let now = Utc::now();

    let status = device_service::get_or_create_status(db, &dev.device_id).await?;
    let mut status_active: device_status::ActiveModel = status.into();
    status_active.last_poll = Set(Some(now));
    status_active.update(db).await?;

    let pending = command::Entity::find()
        .filter(command::Column::DeviceId.eq(dev.id))
        .filter(command::Column::Status.eq(CommandStatus::Pending))
        .filter(
            Condition::any()
                .add(command::Column::ExpiresAt.is_null())
                .add(command::Column::ExpiresAt.gte(now)),
        )
        .order_by_desc(command::Column::Priority)
        .order_by_asc(command::Column::CreatedAt)
        .all(db)
        .await?;

    for cmd in &pending {
        let mut active: command::ActiveModel = cmd.clone().into();
        active.status = Set(CommandStatus::Sent);
        active.sent_at = Set(Some(now));
        active.update(db).await?;
    }

    if !pending.is_empty() {
        info!(
            device_id = %dev.device_id,
            count = pending.len(),
            "dispatched pending commands"
        );
    }
    Ok(pending)
}

/// Applies a device's execution report: sent -> executed on success
/// (merging any reported counter snapshot into the live status), or
/// sent -> failed with the device's error message.
pub async fn report_result(
    db: &DatabaseConnection,
    dev: &device::Model,
    command_id: &str,
    report: &CommandResultRequest,
) -> Result<command::Model, CommandError> {
    let cmd = command::Entity::find()
        .filter(command::Column::CommandId.eq(command_id))
        .filter(command::Column::DeviceId.eq(dev.id))
        .one(db)
        .await?
        .ok_or(CommandError::NotFound)?;

    let now = Utc::now();
    let txn = db.begin().await?;

    let mut active: command::ActiveModel = cmd.into();
    if report.success {
        active.status = Set(CommandStatus::Executed);
        active.executed_at = Set(Some(now));
        active.response_data = Set(report.response_data.clone());
        active.error_message = Set(None);
    } else {
        active.status = Set(CommandStatus::Failed);
        active.response_data = Set(report.response_data.clone());
        active.error_message = Set(report.error_message.clone());
    }
    let updated = active.update(&txn).await?;

    if report.success {
        let mut device_active: device::ActiveModel = dev.clone().into();
        device_active.last_seen = Set(Some(now));
        device_active.update(&txn).await?;

        let status = device_service::get_or_create_status(&txn, &dev.device_id).await?;
        let mut status_active: device_status::ActiveModel = status.clone().into();
        status_active.last_seen = Set(now);
        if let Some(counters) = &report.current_counters {
            status_active.current_count_basic =
                Set(counters.basic.unwrap_or(status.current_count_basic));
            status_active.current_count_standard =
                Set(counters.standard.unwrap_or(status.current_count_standard));
            status_active.current_count_premium =
                Set(counters.premium.unwrap_or(status.current_count_premium));
        }
        status_active.update(&txn).await?;
    }

    txn.commit().await?;
    Ok(updated)
}

/// Resets a failed or timed-out command to pending, bounded by the
/// per-command retry ceiling.
pub async fn retry(db: &DatabaseConnection, command_id: &str) -> Result<command::Model, CommandError> {
    let cmd = command::Entity::find()
        .filter(command::Column::CommandId.eq(command_id))
        .one(db)
        .await?
        .ok_or(CommandError::NotFound)?;

    if !cmd.can_retry() {
        return Err(CommandError::NotRetryable);
    }

    let retry_count = cmd.retry_count;
    let mut active: command::ActiveModel = cmd.into();
    active.status = Set(CommandStatus::Pending);
    active.retry_count = Set(retry_count + 1);
    active.sent_at = Set(None);
    active.executed_at = Set(None);
    active.error_message = Set(None);
    Ok(active.update(db).await?)
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkCreateOutcome {
    pub created: Vec<CreatedCommand>,
    pub failed_devices: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedCommand {
    pub command_id: String,
    pub device_id: String,
}

/// Creates one command per device in a single transaction. Unknown device
/// identifiers are collected rather than failing the batch.
pub async fn bulk_create(
    db: &DatabaseConnection,
    device_ids: &[String],
    new: &NewCommand,
) -> Result<BulkCreateOutcome, DbErr> {
    let txn = db.begin().await?;
    let mut created = Vec::new();
    let mut failed_devices = Vec::new();

    for device_id in device_ids {
        match device_service::find_by_device_id(&txn, device_id).await? {
            Some(dev) => {
                let cmd = enqueue(&txn, &dev, new).await?;
                created.push(CreatedCommand {
                    command_id: cmd.command_id,
                    device_id: device_id.clone(),
                });
            }
            None => failed_devices.push(device_id.clone()),
        }
    }

    txn.commit().await?;
    Ok(BulkCreateOutcome {
        created,
        failed_devices,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandCounts {
    pub total: u64,
    pub pending: u64,
    pub sent: u64,
    pub executed: u64,
    pub failed: u64,
    pub timeout: u64,
}

/// Per-status totals plus the most recent commands for a device.
pub async fn status_summary(
    db: &DatabaseConnection,
    dev: &device::Model,
    recent_limit: u64,
) -> Result<(CommandCounts, Vec<command::Model>), DbErr> {
    let base = command::Entity::find().filter(command::Column::DeviceId.eq(dev.id));

    let count_for = |status: CommandStatus| {
        base.clone()
            .filter(command::Column::Status.eq(status))
            .count(db)
    };

    let counts = CommandCounts {
        total: base.clone().count(db).await?,
        pending: count_for(CommandStatus::Pending).await?,
        sent: count_for(CommandStatus::Sent).await?,
        executed: count_for(CommandStatus::Executed).await?,
        failed: count_for(CommandStatus::Failed).await?,
        timeout: count_for(CommandStatus::Timeout).await?,
    };

    let recent = base
        .order_by_desc(command::Column::CreatedAt)
        .limit(recent_limit)
        .all(db)
        .await?;

    Ok((counts, recent))
}

/// RESET_COUNTERS history for a machine's treatment log view.
pub async fn reset_commands_for_device(
    db: &DatabaseConnection,
    device_pk: i32,
    limit: u64,
) -> Result<Vec<command::Model>, DbErr> {
    command::Entity::find()
        .filter(command::Column::DeviceId.eq(device_pk))
        .filter(command::Column::CommandType.eq(CommandType::ResetCounters))
        .order_by_desc(command::Column::CreatedAt)
        .limit(limit)
        .all(db)
        .await
}
