use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use ozone_telemetry::db::entities::{device, device_status};
use ozone_telemetry::db::enums::{CommandPriority, CommandStatus, CommandType};
use ozone_telemetry::db::services::{command_service, device_service};
use ozone_telemetry::db::setup_schema;
use ozone_telemetry::web::models::{CommandResultRequest, CurrentCounters};

async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    setup_schema(&db).await.unwrap();
    db
}

async fn registered_device(db: &DatabaseConnection, mac: &str) -> device::Model {
    let result = device_service::handshake(db, mac, None).await.unwrap();
    let found = device_service::find_by_device_id(db, &result.device_id)
        .await
        .unwrap()
        .unwrap();
    let mut active: device::ActiveModel = found.into();
    active.assigned = Set(true);
    active.update(db).await.unwrap()
}

fn new_command(command_type: CommandType, priority: CommandPriority) -> command_service::NewCommand {
    command_service::NewCommand {
        command_type,
        priority,
        payload: serde_json::json!({}),
        description: None,
        expires_in_hours: command_service::DEFAULT_TTL_HOURS,
        created_by: None,
    }
}

fn failure_report(message: &str) -> CommandResultRequest {
    CommandResultRequest {
        success: false,
        response_data: None,
        error_message: Some(message.to_string()),
        current_counters: None,
    }
}

#[tokio::test]
async fn full_lifecycle_with_retry() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:10").await;

    let created = command_service::enqueue(
        &db,
        &dev,
        &new_command(CommandType::Restart, CommandPriority::Normal),
    )
    .await
    .unwrap();
    assert_eq!(created.status, CommandStatus::Pending);
    assert_eq!(created.retry_count, 0);

    // Poll hands the command out and marks it sent.
    let polled = command_service::poll(&db, &dev).await.unwrap();
    assert_eq!(polled.len(), 1);
    let after_poll = find_command(&db, &created.command_id).await;
    assert_eq!(after_poll.status, CommandStatus::Sent);
    assert!(after_poll.sent_at.is_some());

    // A second poll has nothing pending.
    assert!(command_service::poll(&db, &dev).await.unwrap().is_empty());

    // Device reports failure.
    let failed = command_service::report_result(
        &db,
        &dev,
        &created.command_id,
        &failure_report("sensor busy"),
    )
    .await
    .unwrap();
    assert_eq!(failed.status, CommandStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("sensor busy"));

    // Retry resets it to pending and increments the counter.
    let retried = command_service::retry(&db, &created.command_id).await.unwrap();
    assert_eq!(retried.status, CommandStatus::Pending);
    assert_eq!(retried.retry_count, 1);
    assert!(retried.sent_at.is_none());
    assert!(retried.error_message.is_none());

    // The retried command is polled again.
    let polled = command_service::poll(&db, &dev).await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].command_id, created.command_id);
}

#[tokio::test]
async fn retry_beyond_ceiling_is_rejected() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:11").await;

    let created = command_service::enqueue(
        &db,
        &dev,
        &new_command(CommandType::SyncTime, CommandPriority::Normal),
    )
    .await
    .unwrap();

    for attempt in 1..=3 {
        command_service::poll(&db, &dev).await.unwrap();
        command_service::report_result(&db, &dev, &created.command_id, &failure_report("nope"))
            .await
            .unwrap();
        let retried = command_service::retry(&db, &created.command_id).await.unwrap();
        assert_eq!(retried.retry_count, attempt);
    }

    command_service::poll(&db, &dev).await.unwrap();
    command_service::report_result(&db, &dev, &created.command_id, &failure_report("nope"))
        .await
        .unwrap();
    let denied = command_service::retry(&db, &created.command_id).await;
    assert!(matches!(
        denied,
        Err(command_service::CommandError::NotRetryable)
    ));
}

#[tokio::test]
async fn retry_is_only_valid_after_failure() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:12").await;

    let created = command_service::enqueue(
        &db,
        &dev,
        &new_command(CommandType::Restart, CommandPriority::Normal),
    )
    .await
    .unwrap();

    let denied = command_service::retry(&db, &created.command_id).await;
    assert!(matches!(
        denied,
        Err(command_service::CommandError::NotRetryable)
    ));
}

#[tokio::test]
async fn poll_orders_by_priority_then_age() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:13").await;

    let low = command_service::enqueue(
        &db,
        &dev,
        &new_command(CommandType::StatusReport, CommandPriority::Low),
    )
    .await
    .unwrap();
    let urgent = command_service::enqueue(
        &db,
        &dev,
        &new_command(CommandType::Restart, CommandPriority::Urgent),
    )
    .await
    .unwrap();
    let normal = command_service::enqueue(
        &db,
        &dev,
        &new_command(CommandType::SyncTime, CommandPriority::Normal),
    )
    .await
    .unwrap();

    let polled = command_service::poll(&db, &dev).await.unwrap();
    let order: Vec<&str> = polled.iter().map(|cmd| cmd.command_id.as_str()).collect();
    assert_eq!(
        order,
        vec![
            urgent.command_id.as_str(),
            normal.command_id.as_str(),
            low.command_id.as_str()
        ]
    );
}

#[tokio::test]
async fn expired_commands_are_not_dispatched() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:14").await;

    let mut expired = new_command(CommandType::Restart, CommandPriority::Urgent);
    expired.expires_in_hours = -1;
    command_service::enqueue(&db, &dev, &expired).await.unwrap();

    let live = command_service::enqueue(
        &db,
        &dev,
        &new_command(CommandType::SyncTime, CommandPriority::Low),
    )
    .await
    .unwrap();

    let polled = command_service::poll(&db, &dev).await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].command_id, live.command_id);
}

#[tokio::test]
async fn poll_records_last_poll_timestamp() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:15").await;

    command_service::poll(&db, &dev).await.unwrap();

    let status = device_status::Entity::find()
        .filter(device_status::Column::DeviceId.eq(dev.device_id.as_str()))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert!(status.last_poll.is_some());
}

#[tokio::test]
async fn successful_result_merges_reported_counters() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:16").await;

    let created = command_service::enqueue(
        &db,
        &dev,
        &new_command(CommandType::ResetCounters, CommandPriority::High),
    )
    .await
    .unwrap();
    command_service::poll(&db, &dev).await.unwrap();

    let report = CommandResultRequest {
        success: true,
        response_data: Some(serde_json::json!({ "reset": true })),
        error_message: None,
        current_counters: Some(CurrentCounters {
            basic: Some(0),
            standard: Some(0),
            premium: Some(0),
        }),
    };
    let executed = command_service::report_result(&db, &dev, &created.command_id, &report)
        .await
        .unwrap();
    assert_eq!(executed.status, CommandStatus::Executed);
    assert!(executed.executed_at.is_some());

    let status = device_status::Entity::find()
        .filter(device_status::Column::DeviceId.eq(dev.device_id.as_str()))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.current_count_basic, 0);
    assert_eq!(status.current_count_standard, 0);
    assert_eq!(status.current_count_premium, 0);
}

#[tokio::test]
async fn unknown_command_report_is_not_found() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:17").await;

    let result =
        command_service::report_result(&db, &dev, "missing-cmd", &failure_report("x")).await;
    assert!(matches!(result, Err(command_service::CommandError::NotFound)));
}

#[tokio::test]
async fn bulk_create_collects_unknown_devices() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:18").await;

    let outcome = command_service::bulk_create(
        &db,
        &[dev.device_id.clone(), "ghost-device".to_string()],
        &new_command(CommandType::UpdateConfig, CommandPriority::Normal),
    )
    .await
    .unwrap();

    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].device_id, dev.device_id);
    assert_eq!(outcome.failed_devices, vec!["ghost-device".to_string()]);
}

async fn find_command(
    db: &DatabaseConnection,
    command_id: &str,
) -> ozone_telemetry::db::entities::command::Model {
    ozone_telemetry::db::entities::command::Entity::find()
        .filter(ozone_telemetry::db::entities::command::Column::CommandId.eq(command_id))
        .one(db)
        .await
        .unwrap()
        .unwrap()
}
