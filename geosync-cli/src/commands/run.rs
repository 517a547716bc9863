//! `geosync run`: one incremental sync.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use geosync_sync::{error::preview_ids, pipeline, RunReport, SyncOutcome};

use super::ConfigArg;
use crate::{logging, wiring::Job, Exit};

/// Arguments for `geosync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Geocode and reconcile, but write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<Exit> {
        let (path, config) = self.config.load()?;
        logging::init(&config.logging)?;
        tracing::info!("geosync v{} using {}", env!("CARGO_PKG_VERSION"), path.display());

        let job = Job::build(&config)?;
        let report = pipeline::run(&config, &job.parts(), self.dry_run)
            .with_context(|| format!("sync failed for {}", path.display()))?;

        if self.json {
            print_json(&path, &report)?;
        } else {
            print_report(&report);
        }

        Ok(if report.outcome.is_anomaly() {
            Exit::Anomaly
        } else {
            Exit::Ok
        })
    }
}

#[derive(Serialize)]
struct RunJson<'a> {
    config: String,
    #[serde(flatten)]
    report: &'a RunReport,
}

fn print_json(path: &Path, report: &RunReport) -> Result<()> {
    let payload = RunJson {
        config: path.display().to_string(),
        report,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize run report")?
    );
    Ok(())
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "stage")]
    stage: &'static str,
    #[tabled(rename = "rows")]
    rows: usize,
}

fn print_report(report: &RunReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let rows = vec![
        SummaryRow { stage: "raw records", rows: report.raw_count },
        SummaryRow { stage: "already published", rows: report.removed.len() },
        SummaryRow { stage: "repeated in batch", rows: report.in_batch_duplicates.len() },
        SummaryRow { stage: "new", rows: report.n_new },
        SummaryRow { stage: "matched", rows: report.tally.matched },
        SummaryRow { stage: "tied", rows: report.tally.tied },
        SummaryRow { stage: "unmatched", rows: report.tally.unmatched },
        SummaryRow { stage: "store count", rows: report.counts.local },
        SummaryRow { stage: "replica count", rows: report.counts.remote },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if !report.unmatched.is_empty() {
        println!(
            "{} unmatched: {}",
            "!".yellow().bold(),
            preview_ids(&report.unmatched)
        );
    }
    if let Some(digest) = &report.staged_digest {
        println!("  staged payload sha256 {digest}");
    }

    match &report.outcome {
        SyncOutcome::Anomaly(_) => println!("{prefix}{} {}", "✗".red().bold(), report.outcome),
        SyncOutcome::AlreadyInSync => println!("{prefix}{} {}", "·".bright_black(), report.outcome),
        SyncOutcome::ReplicaBehind { .. } => {
            println!("{prefix}{} {}", "!".yellow().bold(), report.outcome)
        }
        SyncOutcome::Synced { .. } | SyncOutcome::WouldSync { .. } => {
            println!("{prefix}{} {}", "✓".green().bold(), report.outcome)
        }
    }
}
