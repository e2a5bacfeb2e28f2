use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Daily rollup per device, incremented transactionally as events arrive.
/// One row per (device_id, date); the pair is kept unique by an index
/// created during schema setup.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "usage_statistics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub device_id: String,
    pub date: ChronoDate,
    pub basic_count: i32,
    pub standard_count: i32,
    pub premium_count: i32,
    pub total_events: i32,
    pub first_event: Option<ChronoDateTimeUtc>,
    pub last_event: Option<ChronoDateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
