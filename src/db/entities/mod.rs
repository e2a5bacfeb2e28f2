//! SeaORM entities, one module per table.

pub mod command;
pub mod device;
pub mod device_status;
pub mod machine;
pub mod outlet;
pub mod telemetry_event;
pub mod usage_statistic;
pub mod user;

pub mod prelude {
    pub use super::command::Entity as Command;
    pub use super::device::Entity as Device;
    pub use super::device_status::Entity as DeviceStatus;
    pub use super::machine::Entity as Machine;
    pub use super::outlet::Entity as Outlet;
    pub use super::telemetry_event::Entity as TelemetryEvent;
    pub use super::usage_statistic::Entity as UsageStatistic;
    pub use super::user::Entity as User;
}
