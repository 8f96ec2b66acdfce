//! Event log - what ran and how it ended, stored in `logs.duckdb`
//!
//! An entry carries an event name, the command, a status code, a short
//! failure label and the duration. Amounts, emails, categories and
//! comments are never recorded, and neither are full error messages.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use duckdb::types::Value;
use duckdb::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::result::Result as CoreResult;
use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::MigrationService;

/// Which front end produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    Cli,
    Embedded,
}

impl EntryPoint {
    fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Cli => "cli",
            EntryPoint::Embedded => "embedded",
        }
    }
}

fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "macos",
        "windows" => "windows",
        "linux" => "linux",
        _ => "unknown",
    }
}

/// An event about to be recorded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = Some(elapsed.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.status_code = Some(200);
        self.failure = None;
        self
    }

    /// Mark as failed with a status code and a short label (not a message)
    pub fn failed(mut self, status_code: u16, label: impl Into<String>) -> Self {
        self.status_code = Some(status_code);
        self.failure = Some(label.into());
        self
    }

    /// Stamp the outcome of a core call
    pub fn with_outcome<T>(self, result: &CoreResult<T>) -> Self {
        match result {
            Ok(_) => self.succeeded(),
            Err(e) => self.failed(e.status_code(), e.status_label()),
        }
    }
}

/// A stored entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    /// Unix time in milliseconds
    pub logged_at: i64,
    pub entry_point: String,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub status_code: Option<u16>,
    pub failure: Option<String>,
    pub duration_ms: Option<u64>,
}

impl LogEntry {
    const COLUMNS: &'static str = "id, logged_at, entry_point, app_version, platform, \
                                   event, command, status_code, failure, duration_ms";

    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        let status_code: Option<i32> = row.get(7)?;
        let duration_ms: Option<i64> = row.get(9)?;
        Ok(Self {
            id: row.get(0)?,
            logged_at: row.get(1)?,
            entry_point: row.get(2)?,
            app_version: row.get(3)?,
            platform: row.get(4)?,
            event: row.get(5)?,
            command: row.get(6)?,
            status_code: status_code.and_then(|c| u16::try_from(c).ok()),
            failure: row.get(8)?,
            duration_ms: duration_ms.and_then(|d| u64::try_from(d).ok()),
        })
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Filter for [`LoggingService::query`]; newest entries come first
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub limit: usize,
    pub failures_only: bool,
    pub command: Option<String>,
    /// Only entries logged at or after this unix time in milliseconds
    pub since_ms: Option<i64>,
}

impl LogQuery {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            failures_only: false,
            command: None,
            since_ms: None,
        }
    }

    pub fn failures(mut self) -> Self {
        self.failures_only = true;
        self
    }

    pub fn for_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn since(mut self, since_ms: i64) -> Self {
        self.since_ms = Some(since_ms);
        self
    }

    fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if self.failures_only {
            clauses.push("failure IS NOT NULL");
        }
        if let Some(command) = &self.command {
            clauses.push("command = ?");
            params.push(Value::Text(command.clone()));
        }
        if let Some(since) = self.since_ms {
            clauses.push("logged_at >= ?");
            params.push(Value::BigInt(since));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        params.push(Value::BigInt(i64::try_from(self.limit).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT {} FROM sys_logs {filter} ORDER BY logged_at DESC, id DESC LIMIT ?",
            LogEntry::COLUMNS
        );
        (sql, params)
    }
}

/// Per-command totals
#[derive(Debug, Clone, Serialize)]
pub struct CommandStats {
    pub command: String,
    pub runs: u64,
    pub failures: u64,
    pub avg_duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total: u64,
    pub failures: u64,
    pub by_command: Vec<CommandStats>,
}

/// Writes and queries the event log
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    entry_point: EntryPoint,
    app_version: String,
}

impl LoggingService {
    /// Open or create `logs.duckdb` in the tally directory
    pub fn new(
        tally_dir: &Path,
        entry_point: EntryPoint,
        app_version: impl Into<String>,
    ) -> Result<Self> {
        let db_path = tally_dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;
        MigrationService::with_migrations(&conn, LOG_MIGRATIONS).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            entry_point,
            app_version: app_version.into(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    /// Record an event, stamped with entry point, version and platform
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_logs (logged_at, entry_point, app_version, platform,
                                   event, command, status_code, failure, duration_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                Utc::now().timestamp_millis(),
                self.entry_point.as_str(),
                &self.app_version,
                platform(),
                &event.event,
                &event.command,
                event.status_code.map(i32::from),
                &event.failure,
                event.duration_ms.and_then(|d| i64::try_from(d).ok()),
            ],
        )?;
        Ok(())
    }

    pub fn query(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let (sql, params) = query.to_sql();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(duckdb::params_from_iter(params), LogEntry::read)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn stats(&self) -> Result<LogStats> {
        let conn = self.conn()?;
        let (total, failures): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(failure) FROM sys_logs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT command, COUNT(*), COUNT(failure), AVG(duration_ms)
             FROM sys_logs
             WHERE command IS NOT NULL
             GROUP BY command
             ORDER BY COUNT(*) DESC, command",
        )?;
        let by_command = stmt
            .query_map([], |row| {
                Ok(CommandStats {
                    command: row.get(0)?,
                    runs: row.get::<_, i64>(1)?.max(0) as u64,
                    failures: row.get::<_, i64>(2)?.max(0) as u64,
                    avg_duration_ms: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(LogStats {
            total: total.max(0) as u64,
            failures: failures.max(0) as u64,
            by_command,
        })
    }

    /// Delete entries logged before the given unix time in milliseconds
    pub fn prune_before(&self, cutoff_ms: i64) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE logged_at < ?", [cutoff_ms])?;
        Ok(deleted as u64)
    }

    pub fn prune_older_than(&self, age: chrono::Duration) -> Result<u64> {
        self.prune_before((Utc::now() - age).timestamp_millis())
    }

    pub fn clear(&self) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM sys_logs", [])?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
