//! geosync: incremental geocode sync CLI.
//!
//! # Usage
//!
//! ```text
//! geosync run    [--config <path>] [--dry-run] [--json]
//! geosync status [--config <path>] [--json]
//! geosync check  [--config <path>]
//! ```
//!
//! Exit codes: 0 synced or already in sync, 2 consistency anomaly, 1 error.

mod commands;
mod log_rotation;
mod logging;
mod wiring;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, run::RunArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "geosync",
    version,
    about = "Geocode new address records and sync them to a store and its replica",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one incremental sync.
    Run(RunArgs),

    /// Show store and replica counts and the guard decision.
    Status(StatusArgs),

    /// Validate the configuration and credentials.
    Check(CheckArgs),
}

/// Process exit status for a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Ok,
    Anomaly,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Ok => ExitCode::SUCCESS,
            Exit::Anomaly => ExitCode::from(2),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Check(args) => args.run(),
    };
    match result {
        Ok(exit) => exit.into(),
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
