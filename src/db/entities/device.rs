use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Registered ESP32 hardware identity. Created on first handshake and
/// never deleted automatically (manual flush only).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub mac: String,
    #[sea_orm(unique)]
    pub device_id: String,
    #[sea_orm(unique)]
    pub token: String,
    pub assigned: bool,
    pub firmware: Option<String>,
    pub last_seen: Option<ChronoDateTimeUtc>,
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::command::Entity")]
    Commands,

    #[sea_orm(has_one = "super::machine::Entity")]
    Machine,
}

impl Related<super::command::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commands.def()
    }
}

impl Related<super::machine::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Machine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
