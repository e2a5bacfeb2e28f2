use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Machine registered to an outlet, optionally bound to one device.
/// Device exclusivity (one machine per device and vice versa) is enforced
/// by the binding service inside a transaction, not by a constraint.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "machines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub outlet_id: Option<i32>,
    pub name: Option<String>,
    pub machine_type: String,
    pub device_id: Option<i32>,
    pub is_active: bool,
    pub installed_date: Option<ChronoDate>,
    pub last_maintenance: Option<ChronoDate>,
    pub notes: Option<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::outlet::Entity",
        from = "Column::OutletId",
        to = "super::outlet::Column::Id",
        on_delete = "SetNull",
        on_update = "Cascade"
    )]
    Outlet,

    #[sea_orm(
        belongs_to = "super::device::Entity",
        from = "Column::DeviceId",
        to = "super::device::Column::Id",
        on_delete = "SetNull",
        on_update = "Cascade"
    )]
    Device,
}

impl Related<super::outlet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Outlet.def()
    }
}

impl Related<super::device::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
