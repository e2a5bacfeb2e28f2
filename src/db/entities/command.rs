use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{CommandPriority, CommandStatus, CommandType};

/// Remote instruction for a device. Status transitions:
/// pending -> sent (device poll) -> executed | failed (device report);
/// failed | timeout -> pending via bounded retry.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commands")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub command_id: String,
    pub device_id: i32,
    pub command_type: CommandType,
    pub priority: CommandPriority,
    pub status: CommandStatus,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    pub description: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub response_data: Option<Json>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: ChronoDateTimeUtc,
    pub sent_at: Option<ChronoDateTimeUtc>,
    pub executed_at: Option<ChronoDateTimeUtc>,
    pub expires_at: Option<ChronoDateTimeUtc>,
    pub created_by: Option<i32>,
}

impl Model {
    /// A command may be retried only after a failure and while under the
    /// retry ceiling.
    pub fn can_retry(&self) -> bool {
        matches!(self.status, CommandStatus::Failed | CommandStatus::Timeout)
            && self.retry_count < self.max_retries
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::device::Entity",
        from = "Column::DeviceId",
        to = "super::device::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    Device,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_delete = "SetNull",
        on_update = "Cascade"
    )]
    CreatedBy,
}

impl Related<super::device::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreatedBy.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn command(status: CommandStatus, retry_count: i32) -> Model {
        Model {
            id: 1,
            command_id: "dev-1-RESTART-deadbeef".to_string(),
            device_id: 1,
            command_type: CommandType::Restart,
            priority: CommandPriority::Normal,
            status,
            payload: serde_json::json!({}),
            description: None,
            response_data: None,
            error_message: None,
            retry_count,
            max_retries: 3,
            created_at: Utc::now(),
            sent_at: None,
            executed_at: None,
            expires_at: None,
            created_by: None,
        }
    }

    #[test]
    fn retry_allowed_only_after_failure() {
        assert!(command(CommandStatus::Failed, 0).can_retry());
        assert!(command(CommandStatus::Timeout, 2).can_retry());
        assert!(!command(CommandStatus::Pending, 0).can_retry());
        assert!(!command(CommandStatus::Sent, 0).can_retry());
        assert!(!command(CommandStatus::Executed, 0).can_retry());
    }

    #[test]
    fn retry_bounded_by_ceiling() {
        assert!(!command(CommandStatus::Failed, 3).can_retry());
    }
}
