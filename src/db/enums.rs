use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Billable treatment kinds reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "treatment_enum")]
pub enum Treatment {
    #[sea_orm(string_value = "BASIC")]
    #[serde(rename = "BASIC")]
    Basic,
    #[sea_orm(string_value = "STANDARD")]
    #[serde(rename = "STANDARD")]
    Standard,
    #[sea_orm(string_value = "PREMIUM")]
    #[serde(rename = "PREMIUM")]
    Premium,
}

impl Treatment {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BASIC" => Some(Treatment::Basic),
            "STANDARD" => Some(Treatment::Standard),
            "PREMIUM" => Some(Treatment::Premium),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Treatment::Basic => "BASIC",
            Treatment::Standard => "STANDARD",
            Treatment::Premium => "PREMIUM",
        }
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event classification stored on every telemetry row. Heartbeats carry
/// `Status` and are excluded from usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "event_type_enum")]
pub enum EventType {
    #[sea_orm(string_value = "BASIC")]
    #[serde(rename = "BASIC")]
    Basic,
    #[sea_orm(string_value = "STANDARD")]
    #[serde(rename = "STANDARD")]
    Standard,
    #[sea_orm(string_value = "PREMIUM")]
    #[serde(rename = "PREMIUM")]
    Premium,
    #[sea_orm(string_value = "status")]
    #[serde(rename = "status")]
    Status,
}

impl From<Treatment> for EventType {
    fn from(treatment: Treatment) -> Self {
        match treatment {
            Treatment::Basic => EventType::Basic,
            Treatment::Standard => EventType::Standard,
            Treatment::Premium => EventType::Premium,
        }
    }
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Basic => "BASIC",
            EventType::Standard => "STANDARD",
            EventType::Premium => "PREMIUM",
            EventType::Status => "status",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "command_status_enum")]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "executed")]
    Executed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "timeout")]
    Timeout,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Sent => "sent",
            CommandStatus::Executed => "executed",
            CommandStatus::Failed => "failed",
            CommandStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "command_type_enum")]
pub enum CommandType {
    #[sea_orm(string_value = "RESET_COUNTERS")]
    #[serde(rename = "RESET_COUNTERS")]
    ResetCounters,
    #[sea_orm(string_value = "RESTART")]
    #[serde(rename = "RESTART")]
    Restart,
    #[sea_orm(string_value = "SYNC_TIME")]
    #[serde(rename = "SYNC_TIME")]
    SyncTime,
    #[sea_orm(string_value = "UPDATE_CONFIG")]
    #[serde(rename = "UPDATE_CONFIG")]
    UpdateConfig,
    #[sea_orm(string_value = "STATUS_REPORT")]
    #[serde(rename = "STATUS_REPORT")]
    StatusReport,
}

impl CommandType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RESET_COUNTERS" => Some(CommandType::ResetCounters),
            "RESTART" => Some(CommandType::Restart),
            "SYNC_TIME" => Some(CommandType::SyncTime),
            "UPDATE_CONFIG" => Some(CommandType::UpdateConfig),
            "STATUS_REPORT" => Some(CommandType::StatusReport),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::ResetCounters => "RESET_COUNTERS",
            CommandType::Restart => "RESTART",
            CommandType::SyncTime => "SYNC_TIME",
            CommandType::UpdateConfig => "UPDATE_CONFIG",
            CommandType::StatusReport => "STATUS_REPORT",
        }
    }

    pub fn valid_values() -> &'static [&'static str] {
        &[
            "RESET_COUNTERS",
            "RESTART",
            "SYNC_TIME",
            "UPDATE_CONFIG",
            "STATUS_REPORT",
        ]
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer-backed so that `ORDER BY priority DESC` is a real ordering
/// rather than a lexicographic accident.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(rename_all = "lowercase")]
pub enum CommandPriority {
    #[sea_orm(num_value = 0)]
    Low,
    #[sea_orm(num_value = 1)]
    Normal,
    #[sea_orm(num_value = 2)]
    High,
    #[sea_orm(num_value = 3)]
    Urgent,
}

impl CommandPriority {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(CommandPriority::Low),
            "normal" => Some(CommandPriority::Normal),
            "high" => Some(CommandPriority::High),
            "urgent" => Some(CommandPriority::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "user_role_enum")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "operator")]
    Operator,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => f.write_str("admin"),
            UserRole::Operator => f.write_str("operator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn treatment_parse_rejects_unknown() {
        assert_eq!(Treatment::parse("BASIC"), Some(Treatment::Basic));
        assert_eq!(Treatment::parse("basic"), None);
        assert_eq!(Treatment::parse("DELUXE"), None);
    }

    #[test]
    fn priority_orders_numerically() {
        assert!(CommandPriority::Urgent > CommandPriority::High);
        assert!(CommandPriority::High > CommandPriority::Normal);
        assert!(CommandPriority::Normal > CommandPriority::Low);
    }
}
