//! `geosync status`: store and replica counts, read-only.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use geosync_sync::{guard, AuthoritativeStore, Counts, GuardDecision, JsonFileStore, RemoteReplica};

use super::ConfigArg;
use crate::{logging, wiring, Exit};

/// Arguments for `geosync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<Exit> {
        logging::init_quiet();
        let (path, config) = self.config.load()?;

        let store = JsonFileStore::new(&config.store);
        let replica = wiring::replica(&config, wiring::token(&config)?);
        let (counts, decision) =
            guard::check(&store, replica.as_ref()).context("failed to read store counts")?;

        let report = StatusReport {
            config: path.display().to_string(),
            store: AuthoritativeStore::describe(&store),
            replica: replica.describe(),
            counts,
            decision,
        };
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
        } else {
            print_table(&report);
        }

        Ok(match report.decision {
            GuardDecision::Anomaly(_) => Exit::Anomaly,
            _ => Exit::Ok,
        })
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    config: String,
    store: String,
    replica: String,
    counts: Counts,
    decision: GuardDecision,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "side")]
    side: &'static str,
    #[tabled(rename = "location")]
    location: String,
    #[tabled(rename = "rows")]
    rows: usize,
}

fn print_table(report: &StatusReport) {
    println!(
        "geosync v{} | {}",
        env!("CARGO_PKG_VERSION"),
        report.config
    );
    let rows = vec![
        StatusTableRow {
            side: "store",
            location: report.store.clone(),
            rows: report.counts.local,
        },
        StatusTableRow {
            side: "replica",
            location: report.replica.clone(),
            rows: report.counts.remote,
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let indicator = match &report.decision {
        GuardDecision::InSync => "■".green().bold(),
        GuardDecision::Append { .. } => "■".yellow().bold(),
        GuardDecision::Anomaly(_) => "■".red().bold(),
    };
    println!("{indicator} {}", report.decision);
}
