//! Tally CLI - balance-consistent personal finance in your terminal

use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tally_core::services::LogEvent;
use uuid::Uuid;

mod commands;
mod output;

use commands::{doctor, logs, stats, tx, user, Reported};

/// Tally - income, expenses and a balance that always adds up
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register, verify and sign in
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Record and manage transactions
    Tx {
        #[command(subcommand)]
        command: tx::TxCommands,
    },

    /// Income and expense totals for one month
    Stats {
        /// User ID
        user: Uuid,
        /// Month as YYYY-MM
        month: String,
        #[arg(long, env = "TALLY_TOKEN", hide_env_values = true)]
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that every balance matches its transactions
    Doctor {
        /// Show every finding
        #[arg(long, short)]
        verbose: bool,
        /// Recompute balances that drifted
        #[arg(long)]
        fix: bool,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::User { command } => command.name(),
            Commands::Tx { command } => command.name(),
            Commands::Stats { .. } => "stats",
            Commands::Doctor { .. } => "doctor",
            Commands::Logs { command } => command.name(),
        }
    }
}

/// Record how a command ended; the label never carries the message
fn outcome_event(command: &str, elapsed: Duration, result: &Result<()>) -> LogEvent {
    let event = LogEvent::new("command")
        .with_command(command)
        .with_duration(elapsed);

    let Err(e) = result else {
        return event.succeeded();
    };
    if let Some(reported) = e.downcast_ref::<Reported>() {
        event.failed(reported.code, reported.status.clone())
    } else if let Some(core) = e.downcast_ref::<tally_core::Error>() {
        event.failed(core.status_code(), core.status_label())
    } else {
        event.failed(500, "Failure")
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command_name = cli.command.name();

    let started = Instant::now();
    let result = run(cli);
    let event = outcome_event(command_name, started.elapsed(), &result);

    // Opened afterwards so it never shares logs.duckdb with `tally logs`
    let logger = commands::get_logger();
    commands::log_event(&logger, event);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.downcast_ref::<Reported>().is_none() {
                output::error(&format!("{:#}", e));
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::User { command } => user::run(command),
        Commands::Tx { command } => tx::run(command),
        Commands::Stats {
            user,
            month,
            token,
            json,
        } => stats::run(user, &month, &token, json),
        Commands::Doctor {
            verbose,
            fix,
            force,
            json,
        } => doctor::run(verbose, fix, force, json),
        Commands::Logs { command } => logs::run(command),
    }
}
