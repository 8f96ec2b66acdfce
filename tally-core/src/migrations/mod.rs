//! Finance database schema, embedded with `include_str!`
//!
//! Applied in slice order by [`crate::services::MigrationService`]. A new
//! migration gets the next `NNN_description.sql` name and an entry here;
//! applied files are never edited.

use crate::services::migration::MigrationSet;

pub const MIGRATIONS: MigrationSet = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
