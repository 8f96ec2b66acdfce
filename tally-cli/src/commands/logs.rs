//! Logs command - inspect and prune the event log

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};
use dialoguer::Confirm;
use tally_core::services::{EntryPoint, LogEntry, LogQuery, LoggingService};

use super::get_tally_dir;
use crate::output;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent entries, newest first
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Only failed commands
        #[arg(long)]
        failures: bool,
        /// Only this command, e.g. "tx add"
        #[arg(long)]
        command: Option<String>,
        /// Only entries from the last N days
        #[arg(long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old entries
    Clear {
        /// Delete entries older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u32,
        /// Delete every entry
        #[arg(long)]
        all: bool,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-command run counts, failures and timings
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl LogsCommands {
    pub fn name(&self) -> &'static str {
        match self {
            LogsCommands::List { .. } => "logs list",
            LogsCommands::Clear { .. } => "logs clear",
            LogsCommands::Stats { .. } => "logs stats",
        }
    }
}

fn open_log() -> Result<LoggingService> {
    let tally_dir = get_tally_dir()?;
    std::fs::create_dir_all(&tally_dir)?;
    LoggingService::new(&tally_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
}

fn format_time(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn status_cell(entry: &LogEntry) -> Cell {
    match (entry.status_code, &entry.failure) {
        (Some(code), Some(label)) => Cell::new(format!("{code} {label}")).fg(Color::Red),
        (Some(code), None) => Cell::new(code).fg(Color::Green),
        (None, _) => Cell::new("-"),
    }
}

pub fn run(command: LogsCommands) -> Result<()> {
    let log = open_log()?;

    match command {
        LogsCommands::List {
            limit,
            failures,
            command,
            days,
            json,
        } => {
            let mut query = LogQuery::recent(limit);
            if failures {
                query = query.failures();
            }
            if let Some(command) = command {
                query = query.for_command(command);
            }
            if let Some(days) = days {
                query = query.since((Utc::now() - Duration::days(i64::from(days))).timestamp_millis());
            }
            let entries = log.query(&query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                output::info("No log entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Command", "Status", "Took", "Version"]);
            for entry in &entries {
                table.add_row(vec![
                    Cell::new(format_time(entry.logged_at)),
                    Cell::new(entry.command.as_deref().unwrap_or(&entry.event)),
                    status_cell(entry),
                    Cell::new(
                        entry
                            .duration_ms
                            .map(|ms| format!("{ms} ms"))
                            .unwrap_or_default(),
                    ),
                    Cell::new(format!("{} ({})", entry.app_version, entry.entry_point)),
                ]);
            }
            println!("{}", table);
        }
        LogsCommands::Clear {
            older_than_days,
            all,
            force,
            json,
        } => {
            if !force && !json {
                let prompt = if all {
                    "Delete every log entry?".to_string()
                } else {
                    format!("Delete entries older than {older_than_days} days?")
                };
                if !Confirm::new().with_prompt(prompt).default(false).interact()? {
                    println!("{}", "Cancelled".dimmed());
                    return Ok(());
                }
            }

            let deleted = if all {
                log.clear()?
            } else {
                log.prune_older_than(Duration::days(i64::from(older_than_days)))?
            };

            if json {
                println!("{}", serde_json::json!({ "deleted": deleted }));
            } else {
                output::success(&format!("Deleted {deleted} log entries"));
            }
        }
        LogsCommands::Stats { json } => {
            let stats = log.stats()?;
            let size_bytes = std::fs::metadata(log.db_path()).map(|m| m.len()).unwrap_or(0);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "stats": stats,
                        "databasePath": log.db_path(),
                        "databaseSizeBytes": size_bytes,
                    }))?
                );
                return Ok(());
            }

            println!("{}", "Event Log".bold());
            println!("  Entries:  {}", stats.total);
            println!("  Failures: {}", stats.failures.to_string().red());
            println!("  Database: {} ({} bytes)", log.db_path().display(), size_bytes);

            if !stats.by_command.is_empty() {
                println!();
                let mut table = output::create_table();
                table.set_header(vec!["Command", "Runs", "Failures", "Avg time"]);
                for c in &stats.by_command {
                    table.add_row(vec![
                        Cell::new(&c.command),
                        Cell::new(c.runs),
                        Cell::new(c.failures),
                        Cell::new(
                            c.avg_duration_ms
                                .map(|ms| format!("{ms:.0} ms"))
                                .unwrap_or_else(|| "-".to_string()),
                        ),
                    ]);
                }
                println!("{}", table);
            }
        }
    }

    Ok(())
}
