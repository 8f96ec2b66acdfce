//! Event log schema, applied to `logs.duckdb`
//!
//! Kept apart from [`crate::migrations`] so the finance database never
//! carries log tables.

pub const LOG_MIGRATIONS: crate::services::migration::MigrationSet = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
