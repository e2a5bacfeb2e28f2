pub mod admin_routes;
pub mod command_routes;
pub mod device_routes;
pub mod ingest_routes;
pub mod machine_routes;
pub mod outlet_routes;
pub mod stats_routes;
