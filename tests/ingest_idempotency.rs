use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};

use ozone_telemetry::db::entities::{device, device_status, telemetry_event, usage_statistic};
use ozone_telemetry::db::services::{device_service, ingest_service};
use ozone_telemetry::db::setup_schema;
use ozone_telemetry::web::models::{CurrentCounters, DeviceEventRequest};

async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    setup_schema(&db).await.unwrap();
    db
}

async fn registered_device(db: &DatabaseConnection, mac: &str) -> device::Model {
    let result = device_service::handshake(db, mac, Some("1.0.4")).await.unwrap();
    let found = device_service::find_by_device_id(db, &result.device_id)
        .await
        .unwrap()
        .unwrap();
    let mut active: device::ActiveModel = found.into();
    active.assigned = Set(true);
    active.update(db).await.unwrap()
}

fn event_request(event_id: &str, treatment: &str, counter: i64) -> DeviceEventRequest {
    DeviceEventRequest {
        event_id: Some(event_id.to_string()),
        event: Some("treatment".to_string()),
        treatment: Some(treatment.to_string()),
        counter: Some(serde_json::json!(counter)),
        ts: Some(serde_json::json!("2025-03-01 10:00:00")),
        current_counters: None,
    }
}

#[tokio::test]
async fn duplicate_event_id_is_acknowledged_once() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:01").await;

    let first = ingest_service::ingest_event(&db, &dev, &event_request("evt-1", "BASIC", 5))
        .await
        .unwrap();
    assert_eq!(first.event_id, "evt-1");
    assert!(!first.duplicate);

    let replay = ingest_service::ingest_event(&db, &dev, &event_request("evt-1", "BASIC", 5))
        .await
        .unwrap();
    assert_eq!(replay.event_id, "evt-1");
    assert!(replay.duplicate);

    let stored = telemetry_event::Entity::find()
        .filter(telemetry_event::Column::EventId.eq("evt-1"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(stored, 1);

    // The rollup was bumped exactly once.
    let rollup = usage_statistic::Entity::find()
        .filter(usage_statistic::Column::DeviceId.eq(dev.device_id.as_str()))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rollup.basic_count, 1);
    assert_eq!(rollup.total_events, 1);
}

#[tokio::test]
async fn event_updates_single_counter() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:02").await;

    ingest_service::ingest_event(&db, &dev, &event_request("evt-a", "STANDARD", 7))
        .await
        .unwrap();

    let status = device_status::Entity::find()
        .filter(device_status::Column::DeviceId.eq(dev.device_id.as_str()))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.current_count_standard, 7);
    assert_eq!(status.current_count_basic, 0);
    assert!(status.wifi_connected);
}

#[tokio::test]
async fn full_counter_snapshot_wins_over_single_counter() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:03").await;

    let mut request = event_request("evt-b", "PREMIUM", 9);
    request.current_counters = Some(CurrentCounters {
        basic: Some(11),
        standard: Some(22),
        premium: Some(33),
    });
    ingest_service::ingest_event(&db, &dev, &request).await.unwrap();

    let status = device_status::Entity::find()
        .filter(device_status::Column::DeviceId.eq(dev.device_id.as_str()))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.current_count_basic, 11);
    assert_eq!(status.current_count_standard, 22);
    assert_eq!(status.current_count_premium, 33);
}

#[tokio::test]
async fn invalid_treatment_is_rejected_without_side_effects() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:04").await;

    let result =
        ingest_service::ingest_event(&db, &dev, &event_request("evt-c", "DELUXE", 1)).await;
    assert!(result.is_err());

    let stored = telemetry_event::Entity::find().count(&db).await.unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn missing_event_id_is_rejected() {
    let db = test_db().await;
    let dev = registered_device(&db, "AA:BB:CC:DD:EE:05").await;

    let mut request = event_request("", "BASIC", 1);
    request.event_id = Some("   ".to_string());
    assert!(ingest_service::ingest_event(&db, &dev, &request).await.is_err());

    let mut request = event_request("x", "BASIC", 1);
    request.event_id = None;
    assert!(ingest_service::ingest_event(&db, &dev, &request).await.is_err());
}

#[tokio::test]
async fn legacy_heartbeat_updates_status_without_history() {
    let db = test_db().await;

    let request = ozone_telemetry::web::models::LegacyIngestRequest {
        mode: Some("status".to_string()),
        macaddr: Some("AA:BB:CC:DD:EE:06".to_string()),
        count1: Some("3".to_string()),
        count2: Some("4".to_string()),
        count3: Some("5".to_string()),
        rtc_available: Some("true".to_string()),
        ..Default::default()
    };
    ingest_service::ingest_legacy(&db, &request).await.unwrap();

    let status = device_status::Entity::find()
        .filter(device_status::Column::DeviceId.eq("AA:BB:CC:DD:EE:06"))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.current_count_basic, 3);
    assert!(status.rtc_available);

    // Heartbeats never append history or bump the rollup.
    assert_eq!(telemetry_event::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(usage_statistic::Entity::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn legacy_treatment_appends_history_and_rollup() {
    let db = test_db().await;

    let request = ozone_telemetry::web::models::LegacyIngestRequest {
        mode: Some("PREMIUM".to_string()),
        macaddr: Some("AA:BB:CC:DD:EE:07".to_string()),
        count3: Some("2".to_string()),
        timestamp: Some("2025-03-01 09:30:00".to_string()),
        ..Default::default()
    };
    ingest_service::ingest_legacy(&db, &request).await.unwrap();

    let event = telemetry_event::Entity::find().one(&db).await.unwrap().unwrap();
    assert_eq!(event.device_id, "AA:BB:CC:DD:EE:07");
    assert_eq!(event.count_premium, Some(2));
    assert_eq!(event.occurred_at.to_rfc3339(), "2025-03-01T09:30:00+00:00");

    let rollup = usage_statistic::Entity::find().one(&db).await.unwrap().unwrap();
    assert_eq!(rollup.premium_count, 1);
    assert_eq!(rollup.total_events, 1);
}

#[tokio::test]
async fn handshake_is_stable_across_reconnects() {
    let db = test_db().await;

    let first = device_service::handshake(&db, "AA:BB:CC:DD:EE:08", Some("1.0.0"))
        .await
        .unwrap();
    assert_eq!(first.device_id, "AA:BB:CC:DD:EE:08");
    assert!(!first.assigned);

    let second = device_service::handshake(&db, "AA:BB:CC:DD:EE:08", Some("1.0.1"))
        .await
        .unwrap();
    assert_eq!(second.device_id, first.device_id);
    assert_eq!(second.token, first.token);

    assert_eq!(device::Entity::find().count(&db).await.unwrap(), 1);
    let stored = device_service::find_by_device_id(&db, &first.device_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.firmware.as_deref(), Some("1.0.1"));
}

#[tokio::test]
async fn unassigned_device_cannot_authenticate() {
    let db = test_db().await;

    let result = device_service::handshake(&db, "AA:BB:CC:DD:EE:09", None)
        .await
        .unwrap();
    let denied = device_service::authenticate(&db, &result.token).await.unwrap();
    assert!(denied.is_none());

    let found = device_service::find_by_device_id(&db, &result.device_id)
        .await
        .unwrap()
        .unwrap();
    let mut active: device::ActiveModel = found.into();
    active.assigned = Set(true);
    active.update(&db).await.unwrap();

    let allowed = device_service::authenticate(&db, &result.token).await.unwrap();
    assert!(allowed.is_some());
}
