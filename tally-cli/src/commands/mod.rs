//! CLI command implementations

pub mod doctor;
pub mod logs;
pub mod stats;
pub mod tx;
pub mod user;

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tally_core::config::Config;
use tally_core::services::{EntryPoint, LogEvent, LoggingService};
use tally_core::{ApiResponse, TallyContext};

/// A failure that was already written to stdout as a JSON envelope
#[derive(Debug)]
pub struct Reported {
    pub code: u16,
    pub status: String,
}

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)
    }
}

impl std::error::Error for Reported {}

/// Get the tally directory from environment or default
pub fn get_tally_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".tally"))
}

/// Get or create the tally context
pub fn get_context() -> Result<TallyContext> {
    let tally_dir = get_tally_dir()?;

    std::fs::create_dir_all(&tally_dir)
        .with_context(|| format!("Failed to create tally directory: {:?}", tally_dir))?;

    TallyContext::new(&tally_dir).context("Failed to initialize tally context")
}

/// Get the logging service for CLI operations
///
/// Returns None when the event log is switched off or cannot be opened
pub fn get_logger() -> Option<LoggingService> {
    let tally_dir = get_tally_dir().ok()?;
    let config = Config::load(&tally_dir).ok()?;
    if !config.event_log {
        return None;
    }
    std::fs::create_dir_all(&tally_dir).ok()?;
    LoggingService::new(&tally_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Print a core result either as a JSON envelope or through `render`
///
/// In JSON mode a failure is printed as the envelope and returned as
/// [`Reported`] so the process still exits non-zero.
pub fn respond<T: Serialize>(
    result: tally_core::domain::result::Result<T>,
    json: bool,
    render: impl FnOnce(&T),
) -> Result<()> {
    if json {
        let response = ApiResponse::from(result);
        println!("{}", serde_json::to_string_pretty(&response)?);
        if !response.is_success() {
            return Err(Reported {
                code: response.code,
                status: response.status,
            }
            .into());
        }
        return Ok(());
    }

    let data = result?;
    render(&data);
    Ok(())
}
