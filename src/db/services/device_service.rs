use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distr::Alphanumeric};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;

use crate::db::entities::{device, device_status, machine, outlet, telemetry_event};
use crate::db::enums::EventType;

/// A device is `online` within this many minutes of its last command poll,
/// `idle` up to the idle window, `offline` beyond that.
const ONLINE_WINDOW_MINUTES: i64 = 16;
const IDLE_WINDOW_MINUTES: i64 = 60;

const TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Online,
    Idle,
    Offline,
}

/// Classifies device liveness from its last command poll, falling back to
/// the last event timestamp when the device has never polled.
pub fn classify_liveness(
    last_poll: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Liveness {
    let Some(reference) = last_poll.or(last_seen) else {
        return Liveness::Offline;
    };
    let age = now - reference;
    if age <= Duration::minutes(ONLINE_WINDOW_MINUTES) {
        Liveness::Online
    } else if age <= Duration::minutes(IDLE_WINDOW_MINUTES) {
        Liveness::Idle
    } else {
        Liveness::Offline
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HandshakeResult {
    pub device_id: String,
    pub token: String,
    pub assigned: bool,
}

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Registers the device on first contact and refreshes it afterwards.
/// The logical identifier is always the MAC address; a stale identifier
/// from an older firmware generation is rewritten on the next handshake.
pub async fn handshake(
    db: &DatabaseConnection,
    mac: &str,
    firmware: Option<&str>,
) -> Result<HandshakeResult, DbErr> {
    let now = Utc::now();
    let existing = device::Entity::find()
        .filter(device::Column::Mac.eq(mac))
        .one(db)
        .await?;

    let model = match existing {
        None => {
            device::ActiveModel {
                mac: Set(mac.to_string()),
                device_id: Set(mac.to_string()),
                token: Set(generate_token()),
                assigned: Set(false),
                firmware: Set(firmware.map(str::to_string)),
                last_seen: Set(Some(now)),
                notes: Set(None),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
        Some(found) => {
            let mut active: device::ActiveModel = found.clone().into();
            if found.device_id != mac {
                active.device_id = Set(mac.to_string());
            }
            if let Some(fw) = firmware.filter(|fw| !fw.is_empty()) {
                active.firmware = Set(Some(fw.to_string()));
            }
            active.last_seen = Set(Some(now));
            active.update(db).await?
        }
    };

    let status = get_or_create_status(db, &model.device_id).await?;
    let mut status_active: device_status::ActiveModel = status.into();
    status_active.wifi_connected = Set(true);
    status_active.last_seen = Set(now);
    status_active.device_timestamp = Set(None);
    status_active.update(db).await?;

    Ok(HandshakeResult {
        device_id: model.device_id,
        token: model.token,
        assigned: model.assigned,
    })
}

/// Resolves a bearer token to its device. Only assigned devices can
/// authenticate; an unassigned device must wait for an operator binding.
pub async fn authenticate(
    db: &DatabaseConnection,
    token: &str,
) -> Result<Option<device::Model>, DbErr> {
    device::Entity::find()
        .filter(device::Column::Token.eq(token))
        .filter(device::Column::Assigned.eq(true))
        .one(db)
        .await
}

pub async fn find_by_device_id<C: ConnectionTrait>(
    db: &C,
    device_id: &str,
) -> Result<Option<device::Model>, DbErr> {
    device::Entity::find()
        .filter(device::Column::DeviceId.eq(device_id))
        .one(db)
        .await
}

/// Fetches the live status row for a device, creating an empty one if the
/// device has never reported.
pub async fn get_or_create_status<C: ConnectionTrait>(
    db: &C,
    device_id: &str,
) -> Result<device_status::Model, DbErr> {
    let existing = device_status::Entity::find()
        .filter(device_status::Column::DeviceId.eq(device_id))
        .one(db)
        .await?;
    if let Some(status) = existing {
        return Ok(status);
    }
    device_status::ActiveModel {
        device_id: Set(device_id.to_string()),
        last_seen: Set(Utc::now()),
        last_poll: Set(None),
        wifi_connected: Set(false),
        rtc_available: Set(false),
        sd_card_available: Set(false),
        current_count_basic: Set(0),
        current_count_standard: Set(0),
        current_count_premium: Set(0),
        uptime_seconds: Set(None),
        device_timestamp: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
}

#[derive(Debug, Clone, Serialize)]
pub struct BoundMachine {
    pub id: i32,
    pub name: Option<String>,
    pub outlet_id: Option<i32>,
    pub outlet_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceCounts {
    pub basic: i64,
    pub standard: i64,
    pub premium: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceOverview {
    pub device_id: String,
    pub mac: String,
    pub assigned: bool,
    pub firmware: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub status: Liveness,
    pub bound_machine: Option<BoundMachine>,
    pub counts: DeviceCounts,
}

/// Admin overview of every registered device with liveness, current
/// counters and the bound machine. Counters prefer the device-reported
/// values; devices that never reported fall back to stored event totals.
pub async fn list_overview(db: &DatabaseConnection) -> Result<Vec<DeviceOverview>, DbErr> {
    let now = Utc::now();
    let devices = device::Entity::find()
        .order_by_desc(device::Column::LastSeen)
        .order_by_asc(device::Column::DeviceId)
        .all(db)
        .await?;

    let statuses: std::collections::HashMap<String, device_status::Model> =
        device_status::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .map(|status| (status.device_id.clone(), status))
            .collect();

    let bindings: std::collections::HashMap<i32, (machine::Model, Option<outlet::Model>)> =
        machine::Entity::find()
            .filter(machine::Column::DeviceId.is_not_null())
            .find_also_related(outlet::Entity)
            .all(db)
            .await?
            .into_iter()
            .filter_map(|(m, o)| m.device_id.map(|device_pk| (device_pk, (m, o))))
            .collect();

    let mut overview = Vec::with_capacity(devices.len());
    for dev in devices {
        let status = statuses.get(&dev.device_id);
        let counts = match status {
            Some(s) => DeviceCounts {
                basic: s.current_count_basic as i64,
                standard: s.current_count_standard as i64,
                premium: s.current_count_premium as i64,
            },
            None => stored_event_counts(db, &dev.device_id).await?,
        };

        let bound_machine = bindings.get(&dev.id).map(|(m, o)| BoundMachine {
            id: m.id,
            name: m.name.clone(),
            outlet_id: m.outlet_id,
            outlet_name: o.as_ref().map(|outlet| outlet.name.clone()),
        });

        let last_poll = status.and_then(|s| s.last_poll);
        let status_seen = status.map(|s| s.last_seen);
        overview.push(DeviceOverview {
            status: classify_liveness(last_poll, status_seen.or(dev.last_seen), now),
            last_seen: last_poll.or(status_seen).or(dev.last_seen),
            device_id: dev.device_id,
            mac: dev.mac,
            assigned: bound_machine.is_some(),
            firmware: dev.firmware,
            bound_machine,
            counts,
        });
    }
    Ok(overview)
}

async fn stored_event_counts(
    db: &DatabaseConnection,
    device_id: &str,
) -> Result<DeviceCounts, DbErr> {
    let count_for = |event_type: EventType| {
        telemetry_event::Entity::find()
            .filter(telemetry_event::Column::DeviceId.eq(device_id))
            .filter(telemetry_event::Column::EventType.eq(event_type))
            .count(db)
    };
    Ok(DeviceCounts {
        basic: count_for(EventType::Basic).await? as i64,
        standard: count_for(EventType::Standard).await? as i64,
        premium: count_for(EventType::Premium).await? as i64,
    })
}

pub async fn list_online(db: &DatabaseConnection) -> Result<Vec<DeviceOverview>, DbErr> {
    let overview = list_overview(db).await?;
    Ok(overview
        .into_iter()
        .filter(|device| device.status == Liveness::Online)
        .collect())
}

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("device not found")]
    DeviceNotFound,
    #[error("machine not found")]
    MachineNotFound,
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// Binds a device to a machine, releasing any prior binding on both sides
/// inside one transaction so the one-to-one invariant cannot be observed
/// broken.
pub async fn bind_to_machine(
    db: &DatabaseConnection,
    device_id: &str,
    machine_id: i32,
) -> Result<(), BindError> {
    let txn = db.begin().await?;

    let target = machine::Entity::find_by_id(machine_id)
        .one(&txn)
        .await?
        .ok_or(BindError::MachineNotFound)?;
    let dev = find_by_device_id(&txn, device_id)
        .await?
        .ok_or(BindError::DeviceNotFound)?;
    let now = Utc::now();

    // Release the device's current machine, if any.
    let prior = machine::Entity::find()
        .filter(machine::Column::DeviceId.eq(dev.id))
        .filter(machine::Column::Id.ne(target.id))
        .all(&txn)
        .await?;
    for held in prior {
        let mut active: machine::ActiveModel = held.into();
        active.device_id = Set(None);
        active.updated_at = Set(now);
        active.update(&txn).await?;
    }

    // Release the machine's current device, if different.
    if let Some(prior_device_pk) = target.device_id
        && prior_device_pk != dev.id
        && let Some(prior_device) = device::Entity::find_by_id(prior_device_pk)
            .one(&txn)
            .await?
    {
        let mut active: device::ActiveModel = prior_device.into();
        active.assigned = Set(false);
        active.update(&txn).await?;
    }

    let mut target_active: machine::ActiveModel = target.into();
    target_active.device_id = Set(Some(dev.id));
    target_active.updated_at = Set(now);
    target_active.update(&txn).await?;

    let mut device_active: device::ActiveModel = dev.into();
    device_active.assigned = Set(true);
    device_active.update(&txn).await?;

    txn.commit().await?;
    Ok(())
}

/// Detaches a device from its machine and clears the assigned flag. A
/// device with no binding is left untouched apart from the flag.
pub async fn unbind_from_machine(db: &DatabaseConnection, device_id: &str) -> Result<(), BindError> {
    let txn = db.begin().await?;

    let dev = find_by_device_id(&txn, device_id)
        .await?
        .ok_or(BindError::DeviceNotFound)?;
    let now = Utc::now();

    let holders = machine::Entity::find()
        .filter(machine::Column::DeviceId.eq(dev.id))
        .all(&txn)
        .await?;
    for held in holders {
        let mut active: machine::ActiveModel = held.into();
        active.device_id = Set(None);
        active.updated_at = Set(now);
        active.update(&txn).await?;
    }

    let mut device_active: device::ActiveModel = dev.into();
    device_active.assigned = Set(false);
    device_active.update(&txn).await?;

    txn.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_windows() {
        let now = Utc::now();
        let polled = |minutes: i64| Some(now - Duration::minutes(minutes));

        assert_eq!(classify_liveness(polled(10), None, now), Liveness::Online);
        assert_eq!(classify_liveness(polled(40), None, now), Liveness::Idle);
        assert_eq!(classify_liveness(polled(120), None, now), Liveness::Offline);
    }

    #[test]
    fn liveness_without_any_timestamp_is_offline() {
        assert_eq!(classify_liveness(None, None, Utc::now()), Liveness::Offline);
    }

    #[test]
    fn liveness_falls_back_to_last_seen() {
        let now = Utc::now();
        let seen = Some(now - Duration::minutes(5));
        assert_eq!(classify_liveness(None, seen, now), Liveness::Online);
    }

    #[test]
    fn liveness_boundary_is_inclusive() {
        let now = Utc::now();
        assert_eq!(
            classify_liveness(Some(now - Duration::minutes(16)), None, now),
            Liveness::Online
        );
        assert_eq!(
            classify_liveness(Some(now - Duration::hours(1)), None, now),
            Liveness::Idle
        );
    }
}
