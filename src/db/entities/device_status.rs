use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Live snapshot per device, upserted on every ingest/event/poll.
/// Joined to `devices` by the string `device_id`, not a foreign key, so a
/// status row can exist before the device completes a handshake.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "device_statuses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub device_id: String,
    pub last_seen: ChronoDateTimeUtc,
    pub last_poll: Option<ChronoDateTimeUtc>,
    pub wifi_connected: bool,
    pub rtc_available: bool,
    pub sd_card_available: bool,
    pub current_count_basic: i32,
    pub current_count_standard: i32,
    pub current_count_premium: i32,
    pub uptime_seconds: Option<i64>,
    pub device_timestamp: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
