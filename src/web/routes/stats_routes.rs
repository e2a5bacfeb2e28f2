use axum::{
    Json, Router,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

use crate::db::services::ingest_service::parse_event_timestamp;
use crate::db::services::stats_service::{self, Granularity, StatsQuery};
use crate::web::models::{StatsOptionsParams, StatsParams};
use crate::web::{AppState, error::AppError};

const DEFAULT_RANGE_DAYS: i64 = 7;

fn parse_range_bound(value: &str) -> Option<DateTime<Utc>> {
    parse_event_timestamp(value).or_else(|| {
        let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
        Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
    })
}

fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn build_query(params: StatsParams) -> Result<StatsQuery, AppError> {
    let granularity = match params.granularity.as_deref() {
        None | Some("") => Granularity::Day,
        Some(value) => Granularity::parse(value)
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid granularity: {value}")))?,
    };
    Ok(StatsQuery {
        outlet_id: params.outlet_id,
        machine_id: params.machine_id,
        device_id: params.device_id,
        granularity,
        start: params.start.as_deref().and_then(parse_range_bound),
        end: params.end.as_deref().and_then(parse_range_bound),
        days: params.days.unwrap_or(DEFAULT_RANGE_DAYS),
        cumulative: parse_flag(params.cumulative.as_deref()),
        moving_average: params.ma.unwrap_or(0),
        compare: parse_flag(params.compare.as_deref()),
    })
}

async fn stats_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<StatsParams>,
) -> Result<Json<stats_service::StatsResult>, AppError> {
    let query = build_query(params)?;
    let result = stats_service::run_query(&app_state.db, &query).await?;
    Ok(Json(result))
}

async fn stats_options_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<StatsOptionsParams>,
) -> Result<Json<stats_service::FilterOptions>, AppError> {
    let options =
        stats_service::filter_options(&app_state.db, params.outlet_id, params.machine_id).await?;
    Ok(Json(options))
}

async fn stats_export_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<StatsParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = build_query(params)?;
    let result = stats_service::run_query(&app_state.db, &query).await?;
    let body = stats_service::stats_csv(&result);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"stats_export.csv\"".to_string(),
            ),
        ],
        body,
    ))
}

pub fn create_stats_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(stats_handler))
        .route("/options", get(stats_options_handler))
        .route("/export.csv", get(stats_export_handler))
}
