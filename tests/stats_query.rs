use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};

use ozone_telemetry::db::entities::telemetry_event;
use ozone_telemetry::db::enums::EventType;
use ozone_telemetry::db::services::stats_service::{self, Granularity, StatsQuery};
use ozone_telemetry::db::setup_schema;

async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    setup_schema(&db).await.unwrap();
    db
}

fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
}

async fn insert_event(db: &DatabaseConnection, device_id: &str, event_type: EventType, at: &str) {
    telemetry_event::ActiveModel {
        device_id: Set(device_id.to_string()),
        event_type: Set(event_type),
        occurred_at: Set(ts(at)),
        count_basic: Set(None),
        count_standard: Set(None),
        count_premium: Set(None),
        device_timestamp: Set(None),
        wifi_status: Set(Some(true)),
        payload: Set(None),
        event_id: Set(None),
        event: Set(None),
        treatment: Set(None),
        counter: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();
}

fn base_query() -> StatsQuery {
    StatsQuery {
        outlet_id: None,
        machine_id: None,
        device_id: None,
        granularity: Granularity::Day,
        start: Some(ts("2025-03-01T00:00:00Z")),
        end: Some(ts("2025-03-03T00:00:00Z")),
        days: 7,
        cumulative: false,
        moving_average: 0,
        compare: false,
    }
}

#[tokio::test]
async fn daily_series_with_zero_fill() {
    let db = test_db().await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-01T10:00:00Z").await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-01T11:00:00Z").await;
    insert_event(&db, "dev-1", EventType::Premium, "2025-03-03T09:00:00Z").await;
    // Heartbeats are excluded from statistics.
    insert_event(&db, "dev-1", EventType::Status, "2025-03-02T09:00:00Z").await;

    let result = stats_service::run_query(&db, &base_query()).await.unwrap();
    assert_eq!(result.labels, vec!["2025-03-01", "2025-03-02", "2025-03-03"]);
    assert_eq!(result.series.basic, vec![2.0, 0.0, 0.0]);
    assert_eq!(result.series.premium, vec![0.0, 0.0, 1.0]);
    assert_eq!(result.series.total, vec![2.0, 0.0, 1.0]);
    assert_eq!(result.kpi.total, 3.0);
    assert_eq!(result.kpi.max, 2.0);
}

#[tokio::test]
async fn device_filter_limits_series() {
    let db = test_db().await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-01T10:00:00Z").await;
    insert_event(&db, "dev-2", EventType::Basic, "2025-03-01T10:30:00Z").await;

    let mut query = base_query();
    query.device_id = Some("dev-2".to_string());
    let result = stats_service::run_query(&db, &query).await.unwrap();
    assert_eq!(result.series.total, vec![1.0, 0.0, 0.0]);
}

#[tokio::test]
async fn cumulative_then_moving_average_pipeline() {
    let db = test_db().await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-01T10:00:00Z").await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-01T11:00:00Z").await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-03T09:00:00Z").await;

    let mut query = base_query();
    query.cumulative = true;
    let result = stats_service::run_query(&db, &query).await.unwrap();
    assert_eq!(result.series.total, vec![2.0, 2.0, 3.0]);

    query.moving_average = 2;
    let result = stats_service::run_query(&db, &query).await.unwrap();
    // Cumulative first, then the trailing window average.
    assert_eq!(result.series.total, vec![2.0, 2.0, 2.5]);
}

#[tokio::test]
async fn comparison_against_preceding_period() {
    let db = test_db().await;
    // Previous period: Feb 26 - Feb 28.
    insert_event(&db, "dev-1", EventType::Basic, "2025-02-27T10:00:00Z").await;
    // Current period: Mar 1 - Mar 3.
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-01T10:00:00Z").await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-02T10:00:00Z").await;

    let mut query = base_query();
    query.compare = true;
    let result = stats_service::run_query(&db, &query).await.unwrap();

    let prev = result.prev_series.expect("previous series requested");
    assert_eq!(prev.total.len(), result.labels.len());
    assert_eq!(prev.total.iter().sum::<f64>(), 1.0);
    assert_eq!(result.kpi.prev_total, Some(1.0));
    assert_eq!(result.kpi.delta_pct, Some(100.0));
}

#[tokio::test]
async fn comparison_series_stays_raw_under_cumulative() {
    let db = test_db().await;
    // Previous period.
    insert_event(&db, "dev-1", EventType::Basic, "2025-02-26T10:00:00Z").await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-02-27T10:00:00Z").await;
    // Current period.
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-01T10:00:00Z").await;
    insert_event(&db, "dev-1", EventType::Basic, "2025-03-02T10:00:00Z").await;

    let mut query = base_query();
    query.compare = true;
    query.cumulative = true;
    let result = stats_service::run_query(&db, &query).await.unwrap();

    assert_eq!(result.series.total, vec![1.0, 2.0, 2.0]);
    assert_eq!(result.kpi.total, 5.0);

    // The comparison series is raw bucket counts; the cumulative transform
    // applies only to the current period.
    let prev = result.prev_series.expect("previous series requested");
    assert_eq!(prev.total.iter().sum::<f64>(), 2.0);
    assert_eq!(result.kpi.prev_total, Some(2.0));
    assert_eq!(result.kpi.delta_pct, Some(150.0));
}

#[tokio::test]
async fn empty_range_yields_zeroed_axis() {
    let db = test_db().await;

    let result = stats_service::run_query(&db, &base_query()).await.unwrap();
    assert_eq!(result.labels.len(), 3);
    assert!(result.series.total.iter().all(|&v| v == 0.0));
    assert_eq!(result.kpi.total, 0.0);
}
