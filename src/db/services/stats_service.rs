use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;

use crate::db::entities::{device, machine, outlet, telemetry_event};
use crate::db::enums::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minute" => Some(Granularity::Minute),
            "hour" => Some(Granularity::Hour),
            "day" => Some(Granularity::Day),
            "month" => Some(Granularity::Month),
            _ => None,
        }
    }

    /// Floors a timestamp to the start of its bucket.
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        match self {
            Granularity::Minute => ts.with_second(0).unwrap().with_nanosecond(0).unwrap(),
            Granularity::Hour => ts
                .with_minute(0)
                .unwrap()
                .with_second(0)
                .unwrap()
                .with_nanosecond(0)
                .unwrap(),
            Granularity::Day => Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()),
            Granularity::Month => {
                let first = date.with_day(1).unwrap();
                Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0).unwrap())
            }
        }
    }

    /// Start of the bucket after `ts`. Months advance by calendar month,
    /// not by a fixed duration.
    pub fn advance(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::Minute => ts + Duration::minutes(1),
            Granularity::Hour => ts + Duration::hours(1),
            Granularity::Day => ts + Duration::days(1),
            Granularity::Month => ts
                .checked_add_months(Months::new(1))
                .expect("bucket start within chrono range"),
        }
    }

    pub fn label(&self, ts: DateTime<Utc>) -> String {
        let fmt = match self {
            Granularity::Minute => "%Y-%m-%d %H:%M",
            Granularity::Hour => "%Y-%m-%d %H:00",
            Granularity::Day => "%Y-%m-%d",
            Granularity::Month => "%Y-%m",
        };
        ts.format(fmt).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSeries {
    pub basic: Vec<f64>,
    pub standard: Vec<f64>,
    pub premium: Vec<f64>,
    pub total: Vec<f64>,
}

impl StatsSeries {
    fn zeroed(len: usize) -> Self {
        StatsSeries {
            basic: vec![0.0; len],
            standard: vec![0.0; len],
            premium: vec![0.0; len],
            total: vec![0.0; len],
        }
    }

    fn apply(&mut self, f: impl Fn(&[f64]) -> Vec<f64>) {
        self.basic = f(&self.basic);
        self.standard = f(&self.standard);
        self.premium = f(&self.premium);
        self.total = f(&self.total);
    }
}

/// Builds the complete zero-filled label axis for `[start, end]` and
/// group-counts the events into it. Buckets outside the axis are ignored.
pub fn bucket_series(
    events: &[(DateTime<Utc>, EventType)],
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (Vec<String>, StatsSeries) {
    let mut labels = Vec::new();
    let mut cursor = granularity.truncate(start);
    while cursor <= end {
        labels.push(granularity.label(cursor));
        cursor = granularity.advance(cursor);
    }

    let index: HashMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.as_str(), i))
        .collect();

    let mut series = StatsSeries::zeroed(labels.len());
    for (occurred_at, event_type) in events {
        let label = granularity.label(granularity.truncate(*occurred_at));
        let Some(&i) = index.get(label.as_str()) else {
            continue;
        };
        match event_type {
            EventType::Basic => series.basic[i] += 1.0,
            EventType::Standard => series.standard[i] += 1.0,
            EventType::Premium => series.premium[i] += 1.0,
            EventType::Status => continue,
        }
        series.total[i] += 1.0;
    }
    (labels, series)
}

pub fn cumulative(values: &[f64]) -> Vec<f64> {
    let mut sum = 0.0;
    values
        .iter()
        .map(|v| {
            sum += v;
            sum
        })
        .collect()
}

/// Trailing moving average. The window shrinks at the start of the series:
/// each point divides by the number of points seen so far, capped at
/// `window`. A window of 0 or 1 is a no-op.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return values.to_vec();
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let seen = (i + 1).min(window);
        out.push(round2(sum / seen as f64));
    }
    out
}

/// Round to two decimals, half to even, so 0.125 renders as 0.12.
fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let rounded = if (scaled.fract().abs() - 0.5).abs() < 1e-9 {
        (scaled / 2.0).round() * 2.0
    } else {
        scaled.round()
    };
    rounded / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct Kpi {
    pub total: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub prev_total: Option<f64>,
    pub delta_pct: Option<f64>,
}

fn compute_kpi(series: &StatsSeries, prev_series: Option<&StatsSeries>) -> Kpi {
    let totals = &series.total;
    let total: f64 = totals.iter().sum();
    let avg = if totals.is_empty() {
        0.0
    } else {
        round2(total / totals.len() as f64)
    };
    let min = totals.iter().copied().fold(f64::INFINITY, f64::min);
    let max = totals.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let prev_total = prev_series.map(|prev| prev.total.iter().sum::<f64>());
    // Delta is undefined against an empty previous period.
    let delta_pct = prev_total
        .filter(|&prev| prev != 0.0)
        .map(|prev| round2((total - prev) / prev * 100.0));

    Kpi {
        total,
        avg,
        min: if totals.is_empty() { 0.0 } else { min },
        max: if totals.is_empty() { 0.0 } else { max },
        prev_total,
        delta_pct,
    }
}

#[derive(Debug, Clone)]
pub struct StatsQuery {
    pub outlet_id: Option<i32>,
    pub machine_id: Option<i32>,
    pub device_id: Option<String>,
    pub granularity: Granularity,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub days: i64,
    pub cumulative: bool,
    pub moving_average: usize,
    pub compare: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub labels: Vec<String>,
    pub series: StatsSeries,
    pub prev_series: Option<StatsSeries>,
    pub kpi: Kpi,
}

/// Resolves the filter to a device-id set. `None` means no filter; an
/// empty set matches nothing.
async fn resolve_device_ids(
    db: &DatabaseConnection,
    query: &StatsQuery,
) -> Result<Option<Vec<String>>, DbErr> {
    if let Some(device_id) = &query.device_id {
        return Ok(Some(vec![device_id.clone()]));
    }
    if let Some(machine_id) = query.machine_id {
        let bound = machine::Entity::find_by_id(machine_id)
            .find_also_related(device::Entity)
            .one(db)
            .await?;
        let ids = bound
            .and_then(|(_, dev)| dev)
            .map(|dev| vec![dev.device_id])
            .unwrap_or_default();
        return Ok(Some(ids));
    }
    if let Some(outlet_id) = query.outlet_id {
        let bound = machine::Entity::find()
            .filter(machine::Column::OutletId.eq(outlet_id))
            .find_also_related(device::Entity)
            .all(db)
            .await?;
        let ids = bound
            .into_iter()
            .filter_map(|(_, dev)| dev.map(|d| d.device_id))
            .collect();
        return Ok(Some(ids));
    }
    Ok(None)
}

async fn fetch_events(
    db: &DatabaseConnection,
    device_ids: Option<&[String]>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<(DateTime<Utc>, EventType)>, DbErr> {
    let mut select = telemetry_event::Entity::find()
        .filter(telemetry_event::Column::EventType.ne(EventType::Status))
        .filter(telemetry_event::Column::OccurredAt.gte(start))
        .filter(telemetry_event::Column::OccurredAt.lte(end));
    if let Some(ids) = device_ids {
        select = select.filter(telemetry_event::Column::DeviceId.is_in(ids.iter().cloned()));
    }
    let events = select.all(db).await?;
    Ok(events
        .into_iter()
        .map(|event| (event.occurred_at, event.event_type))
        .collect())
}

fn day_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&ts.date_naive().and_hms_opt(0, 0, 0).unwrap())
}

fn day_ceil(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&ts.date_naive().and_hms_milli_opt(23, 59, 59, 999).unwrap())
}

/// Runs the full aggregation pipeline: bucket counts with a zero-filled
/// axis, then cumulative sum, then moving average (in that order when both
/// are requested), and the KPI summary over the transformed series. The
/// optional preceding-period comparison series stays raw bucket counts;
/// the transforms never touch it.
pub async fn run_query(db: &DatabaseConnection, query: &StatsQuery) -> Result<StatsResult, DbErr> {
    let end = day_ceil(query.end.unwrap_or_else(Utc::now));
    let start = day_floor(
        query
            .start
            .unwrap_or(end - Duration::days(query.days.max(1) - 1)),
    );

    let device_ids = resolve_device_ids(db, query).await?;
    let events = fetch_events(db, device_ids.as_deref(), start, end).await?;
    let (labels, mut series) = bucket_series(&events, query.granularity, start, end);

    if query.cumulative {
        series.apply(|values| cumulative(values));
    }
    if query.moving_average > 1 {
        let window = query.moving_average;
        series.apply(|values| moving_average(values, window));
    }

    let mut prev_series = None;
    if query.compare {
        let period = end - start;
        let prev_end = start - Duration::seconds(1);
        let prev_start = prev_end - period;
        let prev_events = fetch_events(db, device_ids.as_deref(), prev_start, prev_end).await?;
        let (_, mut prev) = bucket_series(&prev_events, query.granularity, prev_start, prev_end);
        // Force the comparison series to the current axis length.
        prev.apply(|values| {
            let mut adjusted = values.to_vec();
            adjusted.resize(labels.len(), 0.0);
            adjusted
        });
        prev_series = Some(prev);
    }

    let kpi = compute_kpi(&series, prev_series.as_ref());
    Ok(StatsResult {
        labels,
        series,
        prev_series,
        kpi,
    })
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Renders a stats result as CSV, one row per bucket.
pub fn stats_csv(result: &StatsResult) -> String {
    let mut out = String::from("label,basic,standard,premium,total\n");
    for (i, label) in result.labels.iter().enumerate() {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_field(label),
            csv_number(result.series.basic[i]),
            csv_number(result.series.standard[i]),
            csv_number(result.series.premium[i]),
            csv_number(result.series.total[i]),
        ));
    }
    out
}

/// Renders raw telemetry rows as CSV, ascending by occurrence.
pub fn events_csv(events: &[telemetry_event::Model]) -> String {
    let mut out = String::from(
        "Timestamp,Device Timestamp,Event Type,Basic Count,Standard Count,Premium Count,WiFi Status\n",
    );
    for event in events {
        let wifi = if event.wifi_status.unwrap_or(false) {
            "Connected"
        } else {
            "Disconnected"
        };
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            event.occurred_at.to_rfc3339(),
            csv_field(event.device_timestamp.as_deref().unwrap_or("")),
            event.event_type,
            event.count_basic.unwrap_or(0),
            event.count_standard.unwrap_or(0),
            event.count_premium.unwrap_or(0),
            wifi,
        ));
    }
    out
}

/// Events for the per-device CSV export, oldest first.
pub async fn events_for_export(
    db: &DatabaseConnection,
    device_id: &str,
    days: i64,
) -> Result<Vec<telemetry_event::Model>, DbErr> {
    let end = Utc::now();
    let start = end - Duration::days(days.max(1));
    telemetry_event::Entity::find()
        .filter(telemetry_event::Column::DeviceId.eq(device_id))
        .filter(telemetry_event::Column::OccurredAt.gte(start))
        .filter(telemetry_event::Column::OccurredAt.lte(end))
        .order_by_asc(telemetry_event::Column::OccurredAt)
        .all(db)
        .await
}

/// Filter drill-down options: every outlet, the machines of an outlet,
/// and the bound device of a machine.
#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub outlets: Vec<IdName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machines: Option<Vec<IdName>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdName {
    pub id: i32,
    pub name: Option<String>,
}

pub async fn filter_options(
    db: &DatabaseConnection,
    outlet_id: Option<i32>,
    machine_id: Option<i32>,
) -> Result<FilterOptions, DbErr> {
    let outlets = outlet::Entity::find()
        .order_by_asc(outlet::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(|o| IdName {
            id: o.id,
            name: Some(o.name),
        })
        .collect();

    let machines = match outlet_id {
        Some(outlet_id) => Some(
            machine::Entity::find()
                .filter(machine::Column::OutletId.eq(outlet_id))
                .order_by_asc(machine::Column::Name)
                .all(db)
                .await?
                .into_iter()
                .map(|m| IdName {
                    id: m.id,
                    name: m.name,
                })
                .collect(),
        ),
        None => None,
    };

    let devices = match machine_id {
        Some(machine_id) => {
            let bound = machine::Entity::find_by_id(machine_id)
                .find_also_related(device::Entity)
                .one(db)
                .await?;
            Some(
                bound
                    .and_then(|(_, dev)| dev)
                    .map(|dev| vec![dev.device_id])
                    .unwrap_or_default(),
            )
        }
        None => None,
    };

    Ok(FilterOptions {
        outlets,
        machines,
        devices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn cumulative_sums_running_total() {
        assert_eq!(cumulative(&[2.0, 0.0, 3.0]), vec![2.0, 2.0, 5.0]);
        assert!(cumulative(&[]).is_empty());
    }

    #[test]
    fn moving_average_shrinks_at_start() {
        assert_eq!(moving_average(&[4.0, 6.0, 2.0], 2), vec![4.0, 5.0, 4.0]);
    }

    #[test]
    fn moving_average_window_one_is_identity() {
        assert_eq!(moving_average(&[1.0, 2.0], 1), vec![1.0, 2.0]);
        assert_eq!(moving_average(&[1.0, 2.0], 0), vec![1.0, 2.0]);
    }

    #[test]
    fn moving_average_rounds_to_two_decimals() {
        assert_eq!(moving_average(&[1.0, 1.0, 2.0], 3), vec![1.0, 1.0, 1.33]);
    }

    #[test]
    fn moving_average_rounds_half_to_even() {
        let values = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(
            moving_average(&values, 8),
            vec![1.0, 0.5, 0.33, 0.25, 0.2, 0.17, 0.14, 0.12]
        );
    }

    #[test]
    fn zero_fill_spans_empty_range() {
        let (labels, series) = bucket_series(
            &[],
            Granularity::Day,
            ts("2025-03-01T00:00:00Z"),
            ts("2025-03-07T23:59:59Z"),
        );
        assert_eq!(labels.len(), 7);
        assert_eq!(labels[0], "2025-03-01");
        assert_eq!(labels[6], "2025-03-07");
        assert!(series.total.iter().all(|&v| v == 0.0));
        assert!(series.basic.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn buckets_count_by_type() {
        let events = vec![
            (ts("2025-03-01T09:15:00Z"), EventType::Basic),
            (ts("2025-03-01T10:00:00Z"), EventType::Premium),
            (ts("2025-03-02T08:00:00Z"), EventType::Basic),
        ];
        let (labels, series) = bucket_series(
            &events,
            Granularity::Day,
            ts("2025-03-01T00:00:00Z"),
            ts("2025-03-02T23:59:59Z"),
        );
        assert_eq!(labels, vec!["2025-03-01", "2025-03-02"]);
        assert_eq!(series.basic, vec![1.0, 1.0]);
        assert_eq!(series.premium, vec![1.0, 0.0]);
        assert_eq!(series.total, vec![2.0, 1.0]);
    }

    #[test]
    fn month_axis_advances_by_calendar_month() {
        let (labels, _) = bucket_series(
            &[],
            Granularity::Month,
            ts("2024-11-15T12:00:00Z"),
            ts("2025-02-01T00:00:00Z"),
        );
        assert_eq!(labels, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn hour_truncation_keeps_bucket_start() {
        let truncated = Granularity::Hour.truncate(ts("2025-03-01T10:45:31Z"));
        assert_eq!(truncated, ts("2025-03-01T10:00:00Z"));
        assert_eq!(Granularity::Hour.label(truncated), "2025-03-01 10:00");
    }

    #[test]
    fn kpi_delta_undefined_for_empty_previous_period() {
        let series = StatsSeries {
            basic: vec![0.0; 2],
            standard: vec![0.0; 2],
            premium: vec![0.0; 2],
            total: vec![3.0, 1.0],
        };
        let empty_prev = StatsSeries::zeroed(2);
        let kpi = compute_kpi(&series, Some(&empty_prev));
        assert_eq!(kpi.total, 4.0);
        assert_eq!(kpi.prev_total, Some(0.0));
        assert_eq!(kpi.delta_pct, None);

        let prev = StatsSeries {
            total: vec![2.0, 0.0],
            ..empty_prev
        };
        let kpi = compute_kpi(&series, Some(&prev));
        assert_eq!(kpi.delta_pct, Some(100.0));
    }

    #[test]
    fn kpi_over_empty_series_is_zeroed() {
        let kpi = compute_kpi(&StatsSeries::zeroed(0), None);
        assert_eq!(kpi.total, 0.0);
        assert_eq!(kpi.avg, 0.0);
        assert_eq!(kpi.min, 0.0);
        assert_eq!(kpi.max, 0.0);
    }

    #[test]
    fn stats_csv_renders_rows() {
        let result = StatsResult {
            labels: vec!["2025-03-01".into(), "2025-03-02".into()],
            series: StatsSeries {
                basic: vec![1.0, 0.0],
                standard: vec![0.0, 2.0],
                premium: vec![0.0, 0.0],
                total: vec![1.0, 2.0],
            },
            prev_series: None,
            kpi: compute_kpi(&StatsSeries::zeroed(0), None),
        };
        let csv = stats_csv(&result);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "label,basic,standard,premium,total");
        assert_eq!(lines[1], "2025-03-01,1,0,0,1");
        assert_eq!(lines[2], "2025-03-02,0,2,0,2");
    }
}
