use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;

use crate::db::entities::{command, device, device_status, machine, outlet, telemetry_event};
use crate::db::enums::Treatment;
use crate::db::services::command_service;
use crate::db::services::device_service::{self, Liveness};

const TREATMENT_LOG_LIMIT: u64 = 500;
const RESET_LOG_LIMIT: u64 = 200;

pub const DEFAULT_MACHINE_TYPE: &str = "Ozone Generator";

#[derive(Debug, Clone, Serialize)]
pub struct MachineDeviceInfo {
    pub device_id: String,
    pub mac: String,
    pub status: Liveness,
    pub last_seen: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineOverview {
    pub id: i32,
    pub name: Option<String>,
    pub machine_type: String,
    pub is_active: bool,
    pub outlet_id: Option<i32>,
    pub outlet_name: Option<String>,
    pub installed_date: Option<chrono::NaiveDate>,
    pub device: Option<MachineDeviceInfo>,
}

pub async fn list_overview(db: &DatabaseConnection) -> Result<Vec<MachineOverview>, DbErr> {
    let now = Utc::now();
    let machines = machine::Entity::find()
        .find_also_related(outlet::Entity)
        .order_by_asc(machine::Column::Id)
        .all(db)
        .await?;

    let devices: std::collections::HashMap<i32, device::Model> = device::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|dev| (dev.id, dev))
        .collect();

    let statuses: std::collections::HashMap<String, device_status::Model> =
        device_status::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|status| (status.device_id.clone(), status))
            .collect();

    let overview = machines
        .into_iter()
        .map(|(m, o)| {
            let dev = m.device_id.and_then(|pk| devices.get(&pk));
            let device = dev.map(|dev| {
                let status = statuses.get(&dev.device_id);
                let last_poll = status.and_then(|s| s.last_poll);
                let status_seen = status.map(|s| s.last_seen);
                MachineDeviceInfo {
                    device_id: dev.device_id.clone(),
                    mac: dev.mac.clone(),
                    status: device_service::classify_liveness(
                        last_poll,
                        status_seen.or(dev.last_seen),
                        now,
                    ),
                    last_seen: last_poll.or(status_seen).or(dev.last_seen),
                }
            });
            MachineOverview {
                id: m.id,
                name: m.name,
                machine_type: m.machine_type,
                is_active: m.is_active,
                outlet_id: m.outlet_id,
                outlet_name: o.map(|outlet| outlet.name),
                installed_date: m.installed_date,
                device,
            }
        })
        .collect();
    Ok(overview)
}

pub async fn get(db: &DatabaseConnection, machine_id: i32) -> Result<Option<machine::Model>, DbErr> {
    machine::Entity::find_by_id(machine_id).one(db).await
}

pub async fn create(
    db: &DatabaseConnection,
    name: &str,
    machine_type: Option<&str>,
) -> Result<machine::Model, DbErr> {
    let now = Utc::now();
    machine::ActiveModel {
        outlet_id: Set(None),
        name: Set(Some(name.to_string())),
        machine_type: Set(machine_type.unwrap_or(DEFAULT_MACHINE_TYPE).to_string()),
        device_id: Set(None),
        is_active: Set(true),
        installed_date: Set(None),
        last_maintenance: Set(None),
        notes: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Deletes a machine, first releasing its bound device so the device
/// returns to the unassigned pool.
pub async fn delete(db: &DatabaseConnection, existing: machine::Model) -> Result<(), DbErr> {
    let txn = db.begin().await?;
    if let Some(device_pk) = existing.device_id
        && let Some(dev) = device::Entity::find_by_id(device_pk).one(&txn).await?
    {
        let mut active: device::ActiveModel = dev.into();
        active.assigned = Set(false);
        active.update(&txn).await?;
    }
    existing.delete(&txn).await?;
    txn.commit().await?;
    Ok(())
}

pub async fn assign_outlet(
    db: &DatabaseConnection,
    existing: machine::Model,
    outlet_id: Option<i32>,
) -> Result<machine::Model, DbErr> {
    let mut active: machine::ActiveModel = existing.into();
    active.outlet_id = Set(outlet_id);
    active.updated_at = Set(Utc::now());
    active.update(db).await
}

/// Machines with no bound device.
pub async fn list_unregistered(db: &DatabaseConnection) -> Result<Vec<MachineOverview>, DbErr> {
    let overview = list_overview(db).await?;
    Ok(overview
        .into_iter()
        .filter(|machine| machine.device.is_none())
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct TreatmentLogStats {
    pub total_treatments: u64,
    pub basic_treatments: u64,
    pub standard_treatments: u64,
    pub premium_treatments: u64,
    pub total_resets: usize,
    pub current_basic: i32,
    pub current_standard: i32,
    pub current_premium: i32,
    pub current_total: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreatmentLogs {
    pub machine_id: i32,
    pub device_id: Option<String>,
    pub treatment_logs: Vec<telemetry_event::Model>,
    pub reset_commands: Vec<command::Model>,
    pub stats: TreatmentLogStats,
}

/// Treatment history for a machine: the bound device's treatment events,
/// its RESET_COUNTERS command history and the live counters. A machine
/// with no device yields an empty report.
pub async fn treatment_logs(
    db: &DatabaseConnection,
    m: &machine::Model,
) -> Result<TreatmentLogs, DbErr> {
    let Some(device_pk) = m.device_id else {
        return Ok(TreatmentLogs {
            machine_id: m.id,
            device_id: None,
            treatment_logs: Vec::new(),
            reset_commands: Vec::new(),
            stats: TreatmentLogStats {
                total_treatments: 0,
                basic_treatments: 0,
                standard_treatments: 0,
                premium_treatments: 0,
                total_resets: 0,
                current_basic: 0,
                current_standard: 0,
                current_premium: 0,
                current_total: 0,
            },
        });
    };
    let Some(dev) = device::Entity::find_by_id(device_pk).one(db).await? else {
        return Err(DbErr::RecordNotFound(format!(
            "device {device_pk} bound to machine {} is missing",
            m.id
        )));
    };

    let treatment_events = telemetry_event::Entity::find()
        .filter(telemetry_event::Column::DeviceId.eq(&dev.device_id))
        .filter(telemetry_event::Column::Event.eq("treatment"))
        .order_by_desc(telemetry_event::Column::OccurredAt)
        .limit(TREATMENT_LOG_LIMIT)
        .all(db)
        .await?;

    let reset_commands =
        command_service::reset_commands_for_device(db, dev.id, RESET_LOG_LIMIT).await?;

    let status = device_status::Entity::find()
        .filter(device_status::Column::DeviceId.eq(&dev.device_id))
        .one(db)
        .await?;
    let (current_basic, current_standard, current_premium) = status
        .map(|s| {
            (
                s.current_count_basic,
                s.current_count_standard,
                s.current_count_premium,
            )
        })
        .unwrap_or((0, 0, 0));

    let count_treatments = |treatment: Treatment| {
        treatment_events
            .iter()
            .filter(|event| event.treatment == Some(treatment))
            .count() as u64
    };

    Ok(TreatmentLogs {
        machine_id: m.id,
        device_id: Some(dev.device_id.clone()),
        stats: TreatmentLogStats {
            total_treatments: treatment_events.len() as u64,
            basic_treatments: count_treatments(Treatment::Basic),
            standard_treatments: count_treatments(Treatment::Standard),
            premium_treatments: count_treatments(Treatment::Premium),
            total_resets: reset_commands.len(),
            current_basic,
            current_standard,
            current_premium,
            current_total: current_basic + current_standard + current_premium,
        },
        treatment_logs: treatment_events,
        reset_commands,
    })
}
