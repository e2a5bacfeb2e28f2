use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{EventType, Treatment};

/// Append-only telemetry history. Rows from the current firmware protocol
/// carry `event_id`/`event`/`treatment`/`counter`; legacy form ingest fills
/// the `count_*` columns instead.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "telemetry_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub device_id: String,
    pub event_type: EventType,
    pub count_basic: Option<i32>,
    pub count_standard: Option<i32>,
    pub count_premium: Option<i32>,
    pub occurred_at: ChronoDateTimeUtc,
    pub device_timestamp: Option<String>,
    pub wifi_status: Option<bool>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub payload: Option<Json>,
    #[sea_orm(unique)]
    pub event_id: Option<String>,
    pub event: Option<String>,
    pub treatment: Option<Treatment>,
    pub counter: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
