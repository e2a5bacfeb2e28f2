//! High-level data access API. Each sub-module owns one domain area and
//! exposes async functions over a SeaORM connection; HTTP handlers never
//! touch queries directly.

pub mod command_service;
pub mod device_service;
pub mod flush_service;
pub mod ingest_service;
pub mod machine_service;
pub mod outlet_service;
pub mod stats_service;
pub mod user_service;
