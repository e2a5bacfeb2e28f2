use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};

pub mod entities;
pub mod enums;
pub mod services;

pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Creates any missing tables and indexes from the entity definitions.
/// Runs at startup so a fresh Postgres database (or the in-memory SQLite
/// used by tests) is usable without a separate migration step.
pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut tables = vec![
        schema.create_table_from_entity(entities::prelude::User),
        schema.create_table_from_entity(entities::prelude::Device),
        schema.create_table_from_entity(entities::prelude::DeviceStatus),
        schema.create_table_from_entity(entities::prelude::TelemetryEvent),
        schema.create_table_from_entity(entities::prelude::UsageStatistic),
        schema.create_table_from_entity(entities::prelude::Outlet),
        schema.create_table_from_entity(entities::prelude::Machine),
        schema.create_table_from_entity(entities::prelude::Command),
    ];
    for stmt in tables.iter_mut() {
        stmt.if_not_exists();
        db.execute(backend.build(&*stmt)).await?;
    }

    // Rollup rows are unique per (device_id, date); entity attributes only
    // express single-column uniqueness.
    let usage_unique = Index::create()
        .name("idx_usage_statistics_device_date")
        .table(entities::usage_statistic::Entity)
        .col(entities::usage_statistic::Column::DeviceId)
        .col(entities::usage_statistic::Column::Date)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&usage_unique)).await?;

    Ok(())
}
