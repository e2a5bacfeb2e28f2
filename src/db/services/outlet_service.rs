use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Serialize;

use crate::db::entities::{device, device_status, machine, outlet};

#[derive(Debug, Clone)]
pub struct OutletInput {
    pub name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
}

/// Outlet listing row with machine count and treatment totals summed from
/// the current counters of devices bound under the outlet's machines.
#[derive(Debug, Clone, Serialize)]
pub struct OutletOverview {
    #[serde(flatten)]
    pub outlet: outlet::Model,
    pub machine_count: usize,
    pub treat_basic: i64,
    pub treat_standard: i64,
    pub treat_premium: i64,
    pub treat_total: i64,
}

pub async fn list_overview(db: &DatabaseConnection) -> Result<Vec<OutletOverview>, DbErr> {
    let outlets = outlet::Entity::find()
        .order_by_asc(outlet::Column::Name)
        .all(db)
        .await?;

    let machines = machine::Entity::find()
        .find_also_related(device::Entity)
        .all(db)
        .await?;

    let statuses: std::collections::HashMap<String, device_status::Model> =
        device_status::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|status| (status.device_id.clone(), status))
            .collect();

    let mut overview = Vec::with_capacity(outlets.len());
    for o in outlets {
        let mut machine_count = 0;
        let (mut basic, mut standard, mut premium) = (0i64, 0i64, 0i64);
        for (_, dev) in machines.iter().filter(|(m, _)| m.outlet_id == Some(o.id)) {
            machine_count += 1;
            if let Some(status) = dev.as_ref().and_then(|d| statuses.get(&d.device_id)) {
                basic += status.current_count_basic as i64;
                standard += status.current_count_standard as i64;
                premium += status.current_count_premium as i64;
            }
        }
        overview.push(OutletOverview {
            outlet: o,
            machine_count,
            treat_basic: basic,
            treat_standard: standard,
            treat_premium: premium,
            treat_total: basic + standard + premium,
        });
    }
    Ok(overview)
}

pub async fn get(db: &DatabaseConnection, outlet_id: i32) -> Result<Option<outlet::Model>, DbErr> {
    outlet::Entity::find_by_id(outlet_id).one(db).await
}

pub async fn create(db: &DatabaseConnection, input: &OutletInput) -> Result<outlet::Model, DbErr> {
    let now = Utc::now();
    outlet::ActiveModel {
        name: Set(input.name.clone()),
        location: Set(input.location.clone()),
        address: Set(input.address.clone()),
        contact_person: Set(input.contact_person.clone()),
        contact_phone: Set(input.contact_phone.clone()),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn update(
    db: &DatabaseConnection,
    existing: outlet::Model,
    input: &OutletInput,
) -> Result<outlet::Model, DbErr> {
    let mut active: outlet::ActiveModel = existing.into();
    active.name = Set(input.name.clone());
    active.location = Set(input.location.clone());
    active.address = Set(input.address.clone());
    active.contact_person = Set(input.contact_person.clone());
    active.contact_phone = Set(input.contact_phone.clone());
    active.updated_at = Set(Utc::now());
    active.update(db).await
}

/// Deletes the outlet; its machines stay behind with the outlet link
/// cleared by the foreign key.
pub async fn delete(db: &DatabaseConnection, existing: outlet::Model) -> Result<(), DbErr> {
    existing.delete(db).await?;
    Ok(())
}

/// Attaches a machine to the outlet. Returns the updated machine, or None
/// when the machine does not exist.
pub async fn assign_machine(
    db: &DatabaseConnection,
    outlet_id: i32,
    machine_id: i32,
) -> Result<Option<machine::Model>, DbErr> {
    let Some(m) = machine::Entity::find_by_id(machine_id).one(db).await? else {
        return Ok(None);
    };
    let mut active: machine::ActiveModel = m.into();
    active.outlet_id = Set(Some(outlet_id));
    active.updated_at = Set(Utc::now());
    Ok(Some(active.update(db).await?))
}

pub async fn machines_of(
    db: &DatabaseConnection,
    outlet_id: i32,
) -> Result<Vec<machine::Model>, DbErr> {
    machine::Entity::find()
        .filter(machine::Column::OutletId.eq(outlet_id))
        .order_by_asc(machine::Column::Id)
        .all(db)
        .await
}
