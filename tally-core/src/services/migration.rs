//! Migration service - applies embedded SQL migration sets
//!
//! A set is a slice of `(file name, sql)` pairs applied in slice order.
//! Every applied name is recorded in `sys_migrations`; the `000` file
//! creates that table and is run first on a fresh database.

use std::collections::HashSet;

use duckdb::Connection;

use crate::domain::result::{Error, Result};

const BOOTSTRAP: &str = "000_migrations.sql";

pub type MigrationSet = &'static [(&'static str, &'static str)];

/// Result of running migrations
#[derive(Debug)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Count of migrations that were already applied
    pub already_applied: usize,
}

/// Applies one migration set to one connection
pub struct MigrationService<'a> {
    conn: &'a Connection,
    migrations: MigrationSet,
}

impl<'a> MigrationService<'a> {
    /// Migrations for the finance database
    pub fn new(conn: &'a Connection) -> Self {
        Self::with_migrations(conn, crate::migrations::MIGRATIONS)
    }

    pub fn with_migrations(conn: &'a Connection, migrations: MigrationSet) -> Self {
        Self { conn, migrations }
    }

    /// Apply everything not yet recorded
    ///
    /// Each migration runs in its own transaction together with its
    /// `sys_migrations` row. A failing one is rolled back and stops the run.
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let recorded: HashSet<String> = if self.has_migrations_table()? {
            self.get_applied()?.into_iter().collect()
        } else {
            HashSet::new()
        };

        let pending = self
            .migrations
            .iter()
            .filter(|(name, _)| !recorded.contains(*name));
        // The bootstrap file has to exist before anything can be recorded
        let (bootstrap, rest): (Vec<_>, Vec<_>) = pending.partition(|(name, _)| *name == BOOTSTRAP);

        let mut applied = Vec::new();
        for (name, sql) in bootstrap.into_iter().chain(rest) {
            self.apply(name, sql)?;
            applied.push(name.to_string());
        }

        Ok(MigrationResult {
            applied,
            already_applied: recorded.len(),
        })
    }

    /// Names of applied migrations
    pub fn get_applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Names of migrations not yet applied
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let applied: HashSet<String> = if self.has_migrations_table()? {
            self.get_applied()?.into_iter().collect()
        } else {
            HashSet::new()
        };
        Ok(self
            .migrations
            .iter()
            .map(|(name, _)| name.to_string())
            .filter(|name| !applied.contains(name))
            .collect())
    }

    fn has_migrations_table(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn apply(&self, name: &str, sql: &str) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;

        let outcome = self.conn.execute_batch(sql).and_then(|_| {
            self.conn
                .execute("INSERT INTO sys_migrations (migration_name) VALUES (?)", [name])
                .map(|_| ())
        });

        match outcome {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(Error::database(format!("Migration {name} failed: {e}")))
            }
        }
    }
}
