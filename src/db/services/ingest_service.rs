use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use tracing::debug;

use crate::db::entities::{device, device_status, telemetry_event, usage_statistic};
use crate::db::enums::{EventType, Treatment};
use crate::db::services::device_service;
use crate::web::models::{DeviceEventRequest, LegacyIngestRequest};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0} required")]
    MissingField(&'static str),
    #[error("invalid event/treatment")]
    InvalidEvent,
    #[error("counter must be int")]
    InvalidCounter,
    #[error(transparent)]
    Db(#[from] DbErr),
}

#[derive(Debug, Clone)]
pub struct EventAck {
    pub event_id: String,
    pub duplicate: bool,
}

/// Parses the firmware's RTC timestamp format (`YYYY-MM-DD HH:MM:SS`).
pub fn parse_device_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Event timestamps arrive either as unix seconds or as an ISO 8601 /
/// RTC-formatted string.
pub fn parse_event_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        let secs: i64 = trimmed.parse().ok()?;
        return Utc.timestamp_opt(secs, 0).single();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    parse_device_timestamp(trimmed)
}

/// Lenient integer coercion: the firmware sends counters both as JSON
/// numbers and as decimal strings.
pub fn coerce_int(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

fn json_value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Authenticated event ingest for the current firmware protocol.
///
/// Idempotent on `event_id`: a replayed submission is acknowledged without
/// touching the database, so device-side retries after a lost ack are safe.
pub async fn ingest_event(
    db: &DatabaseConnection,
    dev: &device::Model,
    request: &DeviceEventRequest,
) -> Result<EventAck, IngestError> {
    let event_id = request
        .event_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(IngestError::MissingField("event_id"))?;

    let event = request.event.as_deref().map(str::trim).unwrap_or_default();
    let treatment = request
        .treatment
        .as_deref()
        .map(str::trim)
        .and_then(Treatment::parse);
    let (Some(treatment), "treatment") = (treatment, event) else {
        return Err(IngestError::InvalidEvent);
    };
    let counter = request
        .counter
        .as_ref()
        .and_then(coerce_int)
        .ok_or(IngestError::InvalidCounter)?;

    let existing = telemetry_event::Entity::find()
        .filter(telemetry_event::Column::EventId.eq(event_id))
        .one(db)
        .await?;
    if existing.is_some() {
        debug!(event_id, device_id = %dev.device_id, "duplicate event replayed, acknowledging");
        return Ok(EventAck {
            event_id: event_id.to_string(),
            duplicate: true,
        });
    }

    let ts_raw = request.ts.as_ref().and_then(json_value_to_string);
    let occurred_at = ts_raw
        .as_deref()
        .and_then(parse_event_timestamp)
        .unwrap_or_else(Utc::now);
    let now = Utc::now();

    let txn = db.begin().await?;

    let inserted = telemetry_event::ActiveModel {
        device_id: Set(dev.device_id.clone()),
        event_id: Set(Some(event_id.to_string())),
        event: Set(Some("treatment".to_string())),
        treatment: Set(Some(treatment)),
        counter: Set(Some(counter)),
        occurred_at: Set(occurred_at),
        event_type: Set(treatment.into()),
        count_basic: Set(None),
        count_standard: Set(None),
        count_premium: Set(None),
        device_timestamp: Set(ts_raw.clone()),
        wifi_status: Set(Some(true)),
        payload: Set(Some(serde_json::json!({}))),
        ..Default::default()
    }
    .insert(&txn)
    .await;
    if let Err(err) = inserted {
        // Two concurrent first submissions can both pass the lookup above;
        // the unique constraint on event_id settles it, and the loser is
        // still a duplicate, not a failure.
        if matches!(
            err.sql_err(),
            Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
        ) {
            txn.rollback().await?;
            return Ok(EventAck {
                event_id: event_id.to_string(),
                duplicate: true,
            });
        }
        return Err(err.into());
    }

    let mut device_active: device::ActiveModel = dev.clone().into();
    device_active.last_seen = Set(Some(now));
    device_active.update(&txn).await?;

    let status = device_service::get_or_create_status(&txn, &dev.device_id).await?;
    let mut status_active: device_status::ActiveModel = status.clone().into();
    status_active.wifi_connected = Set(true);
    status_active.device_timestamp = Set(ts_raw);
    status_active.last_seen = Set(now);
    match &request.current_counters {
        // A full counter snapshot from the device wins over the single
        // changed counter.
        Some(counters) => {
            status_active.current_count_basic =
                Set(counters.basic.unwrap_or(status.current_count_basic));
            status_active.current_count_standard =
                Set(counters.standard.unwrap_or(status.current_count_standard));
            status_active.current_count_premium =
                Set(counters.premium.unwrap_or(status.current_count_premium));
        }
        None => match treatment {
            Treatment::Basic => status_active.current_count_basic = Set(counter),
            Treatment::Standard => status_active.current_count_standard = Set(counter),
            Treatment::Premium => status_active.current_count_premium = Set(counter),
        },
    }
    status_active.update(&txn).await?;

    update_daily_statistics(&txn, &dev.device_id, treatment, occurred_at).await?;

    txn.commit().await?;

    Ok(EventAck {
        event_id: event_id.to_string(),
        duplicate: false,
    })
}

fn safe_number(value: Option<&str>) -> Option<i32> {
    value.and_then(|v| v.trim().parse::<i32>().ok())
}

fn flag(value: Option<&str>) -> Option<bool> {
    value.map(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Unauthenticated legacy form ingest, keyed directly by MAC address.
/// Heartbeats (`mode` not a treatment) only refresh the status row; real
/// treatments also append history and bump the daily rollup.
pub async fn ingest_legacy(
    db: &DatabaseConnection,
    request: &LegacyIngestRequest,
) -> Result<(), IngestError> {
    let mac = request
        .macaddr
        .as_deref()
        .map(str::trim)
        .filter(|mac| !mac.is_empty())
        .ok_or(IngestError::MissingField("macaddr"))?;

    let device_timestamp = request.timestamp.as_deref().map(str::trim);
    let occurred_at = device_timestamp
        .and_then(parse_device_timestamp)
        .unwrap_or_else(Utc::now);

    let rtc_available = flag(request.rtc_available.as_deref());
    let sd_available = flag(request.sd_available.as_deref());
    let count_basic = safe_number(request.count1.as_deref());
    let count_standard = safe_number(request.count2.as_deref());
    let count_premium = safe_number(request.count3.as_deref());

    let txn = db.begin().await?;

    let status = device_service::get_or_create_status(&txn, mac).await?;
    let mut status_active: device_status::ActiveModel = status.clone().into();
    status_active.wifi_connected = Set(true);
    status_active.last_seen = Set(Utc::now());
    if let Some(rtc) = rtc_available {
        status_active.rtc_available = Set(rtc);
    }
    if let Some(sd) = sd_available {
        status_active.sd_card_available = Set(sd);
    }
    status_active.current_count_basic = Set(count_basic.unwrap_or(0));
    status_active.current_count_standard = Set(count_standard.unwrap_or(0));
    status_active.current_count_premium = Set(count_premium.unwrap_or(0));
    status_active.device_timestamp = Set(device_timestamp.map(str::to_string));
    status_active.update(&txn).await?;

    let mode = request.mode.as_deref().map(str::trim).unwrap_or_default();
    if let Some(treatment) = Treatment::parse(mode) {
        telemetry_event::ActiveModel {
            device_id: Set(mac.to_string()),
            event_type: Set(EventType::from(treatment)),
            count_basic: Set(count_basic),
            count_standard: Set(count_standard),
            count_premium: Set(count_premium),
            occurred_at: Set(occurred_at),
            device_timestamp: Set(device_timestamp.map(str::to_string)),
            wifi_status: Set(Some(true)),
            payload: Set(Some(serde_json::json!({
                "type1": safe_number(request.type1.as_deref()),
                "type2": safe_number(request.type2.as_deref()),
                "type3": safe_number(request.type3.as_deref()),
            }))),
            event_id: Set(None),
            event: Set(None),
            treatment: Set(None),
            counter: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        update_daily_statistics(&txn, mac, treatment, occurred_at).await?;
    }

    txn.commit().await?;
    Ok(())
}

/// Bumps the per-day rollup row for a treatment event, creating it on the
/// first event of the day. Runs inside the caller's transaction.
pub async fn update_daily_statistics<C: ConnectionTrait>(
    db: &C,
    device_id: &str,
    treatment: Treatment,
    occurred_at: DateTime<Utc>,
) -> Result<(), DbErr> {
    let date = occurred_at.date_naive();
    let existing = usage_statistic::Entity::find()
        .filter(usage_statistic::Column::DeviceId.eq(device_id))
        .filter(usage_statistic::Column::Date.eq(date))
        .one(db)
        .await?;

    match existing {
        None => {
            usage_statistic::ActiveModel {
                device_id: Set(device_id.to_string()),
                date: Set(date),
                basic_count: Set((treatment == Treatment::Basic) as i32),
                standard_count: Set((treatment == Treatment::Standard) as i32),
                premium_count: Set((treatment == Treatment::Premium) as i32),
                total_events: Set(1),
                first_event: Set(Some(occurred_at)),
                last_event: Set(Some(occurred_at)),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
        Some(stats) => {
            let mut active: usage_statistic::ActiveModel = stats.clone().into();
            match treatment {
                Treatment::Basic => active.basic_count = Set(stats.basic_count + 1),
                Treatment::Standard => active.standard_count = Set(stats.standard_count + 1),
                Treatment::Premium => active.premium_count = Set(stats.premium_count + 1),
            }
            active.total_events = Set(stats.total_events + 1);
            if stats.first_event.is_none_or(|first| occurred_at < first) {
                active.first_event = Set(Some(occurred_at));
            }
            if stats.last_event.is_none_or(|last| occurred_at > last) {
                active.last_event = Set(Some(occurred_at));
            }
            active.update(db).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_timestamp_parses_rtc_format() {
        let parsed = parse_device_timestamp("2025-03-01 14:30:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-03-01T14:30:00+00:00");
        assert!(parse_device_timestamp("not a date").is_none());
    }

    #[test]
    fn event_timestamp_accepts_unix_seconds() {
        let parsed = parse_event_timestamp("1700000000").unwrap();
        assert_eq!(parsed.timestamp(), 1_700_000_000);
    }

    #[test]
    fn event_timestamp_accepts_rfc3339() {
        let parsed = parse_event_timestamp("2025-03-01T10:00:00Z").unwrap();
        assert_eq!(parsed.timestamp(), 1_740_823_200);
    }

    #[test]
    fn coerce_int_handles_numbers_and_strings() {
        assert_eq!(coerce_int(&serde_json::json!(7)), Some(7));
        assert_eq!(coerce_int(&serde_json::json!("12")), Some(12));
        assert_eq!(coerce_int(&serde_json::json!(" 3 ")), Some(3));
        assert_eq!(coerce_int(&serde_json::json!("x")), None);
        assert_eq!(coerce_int(&serde_json::json!(null)), None);
    }
}
