use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, TransactionTrait};
use tracing::warn;

use crate::db::entities::{
    command, device, device_status, machine, telemetry_event, usage_statistic, user,
};
use crate::db::enums::UserRole;

/// Clears telemetry history, rollups and live statuses in one transaction.
/// Device identities and the outlet/machine hierarchy survive.
pub async fn flush_telemetry(db: &DatabaseConnection) -> Result<(), DbErr> {
    let txn = db.begin().await?;
    telemetry_event::Entity::delete_many().exec(&txn).await?;
    usage_statistic::Entity::delete_many().exec(&txn).await?;
    device_status::Entity::delete_many().exec(&txn).await?;
    txn.commit().await?;
    warn!("flushed all telemetry data");
    Ok(())
}

/// Destructive reset: clears all domain data and every non-admin account.
/// Outlets are kept; machines, devices, commands and telemetry go.
pub async fn flush_all_except_admins(db: &DatabaseConnection) -> Result<(), DbErr> {
    let txn = db.begin().await?;
    telemetry_event::Entity::delete_many().exec(&txn).await?;
    usage_statistic::Entity::delete_many().exec(&txn).await?;
    device_status::Entity::delete_many().exec(&txn).await?;
    command::Entity::delete_many().exec(&txn).await?;
    machine::Entity::delete_many().exec(&txn).await?;
    device::Entity::delete_many().exec(&txn).await?;
    user::Entity::delete_many()
        .filter(user::Column::Role.ne(UserRole::Admin))
        .exec(&txn)
        .await?;
    txn.commit().await?;
    warn!("flushed all data except admin accounts");
    Ok(())
}
