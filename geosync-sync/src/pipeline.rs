//! Sync executor: the one entry point used by the CLI.
//!
//! Stage order:
//!
//! 1. Preflight guard (abort on anomaly before reading anything).
//! 2. Ingest the raw batch.
//! 3. Dedup against the store's existing ids.
//! 4. Normalize street addresses.
//! 5. Geocode.
//! 6. Reconcile schema.
//! 7. Append to the authoritative store.
//! 8. Re-check the guard, stage the payload, append to the replica.
//!
//! Every stage fully materializes before the next. A failure before step 7
//! leaves both stores untouched; a failure after it does not roll the store
//! back.

use std::time::Instant;

use serde::Serialize;

use geosync_core::{IncidentId, JobConfig, MatchStatus};

use crate::dedup;
use crate::error::SyncError;
use crate::geocode::{geocode_batch, GeocodeAdapter, MatchTally};
use crate::guard::{self, Anomaly, Counts, GuardDecision};
use crate::ingest::{records_from_rows, BatchSource};
use crate::normalize::normalize_batch;
use crate::reconcile::reconcile;
use crate::staging;
use crate::store::{AuthoritativeStore, RemoteReplica};

/// Everything a run talks to.
pub struct Collaborators<'a> {
    pub source: &'a dyn BatchSource,
    pub store: &'a dyn AuthoritativeStore,
    pub replica: &'a dyn RemoteReplica,
    pub geocoder: &'a dyn GeocodeAdapter,
}

/// How a run ended, short of a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// `n_new` rows reached both stores.
    Synced { n_new: usize },
    /// Nothing to write; store and replica counts agree.
    AlreadyInSync,
    /// Nothing new to write, but the replica is missing `lag` rows the store
    /// holds.
    ReplicaBehind { lag: usize },
    /// The replica is ahead of the store; the run stopped.
    Anomaly(Anomaly),
    /// Dry run: `n_new` rows would have been appended.
    WouldSync { n_new: usize },
}

impl SyncOutcome {
    pub fn is_anomaly(&self) -> bool {
        matches!(self, SyncOutcome::Anomaly(_))
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Synced { n_new } => write!(f, "synced {n_new} new row(s)"),
            SyncOutcome::AlreadyInSync => write!(f, "already in sync"),
            SyncOutcome::ReplicaBehind { lag } => {
                write!(f, "nothing new, but replica is behind by {lag} row(s)")
            }
            SyncOutcome::Anomaly(a) => write!(f, "anomaly: {a}"),
            SyncOutcome::WouldSync { n_new } => write!(f, "would sync {n_new} new row(s)"),
        }
    }
}

/// Counts and ids gathered over one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub outcome: SyncOutcome,
    pub dry_run: bool,
    pub raw_count: usize,
    pub removed: Vec<IncidentId>,
    pub in_batch_duplicates: Vec<IncidentId>,
    pub n_new: usize,
    pub tally: MatchTally,
    pub unmatched: Vec<IncidentId>,
    /// Counts before anything was written.
    pub preflight: Counts,
    /// Counts at the end of the run.
    pub counts: Counts,
    pub staged_digest: Option<String>,
}

impl RunReport {
    fn start(dry_run: bool, preflight: Counts) -> Self {
        Self {
            outcome: SyncOutcome::AlreadyInSync,
            dry_run,
            raw_count: 0,
            removed: Vec::new(),
            in_batch_duplicates: Vec::new(),
            n_new: 0,
            tally: MatchTally::default(),
            unmatched: Vec::new(),
            preflight,
            counts: preflight,
            staged_digest: None,
        }
    }

    fn finish(mut self, outcome: SyncOutcome, started: Instant) -> Self {
        match &outcome {
            SyncOutcome::Anomaly(a) => tracing::error!("Run stopped: {a}; nothing was sent to the replica"),
            other => tracing::info!("Run finished: {other} in {:.2?}", started.elapsed()),
        }
        self.outcome = outcome;
        self
    }
}

/// Execute one incremental sync.
///
/// With `dry_run` every stage up to reconciliation runs, but neither store
/// nor the staging directory is touched.
pub fn run(
    config: &JobConfig,
    parts: &Collaborators<'_>,
    dry_run: bool,
) -> Result<RunReport, SyncError> {
    let started = Instant::now();
    tracing::info!(
        "=== geosync run{}: {} -> {} -> {} ===",
        if dry_run { " (dry run)" } else { "" },
        parts.source.describe(),
        parts.store.describe(),
        parts.replica.describe()
    );

    // 1. Preflight.
    let (preflight, decision) = guard::check(parts.store, parts.replica)?;
    let mut report = RunReport::start(dry_run, preflight);
    let preflight_lag = match decision {
        GuardDecision::Anomaly(a) => return Ok(report.finish(SyncOutcome::Anomaly(a), started)),
        GuardDecision::Append { expected_delta } => {
            tracing::warn!(
                "replica already lags the store by {expected_delta} row(s); only this batch will be sent"
            );
            expected_delta
        }
        GuardDecision::InSync => 0,
    };

    // 2. Ingest.
    let raw = parts.source.read_rows()?;
    report.raw_count = raw.len();
    let records = records_from_rows(parts.source.path(), raw, &config.columns)?;
    tracing::info!("Read {} raw record(s)", report.raw_count);

    // 3. Dedup.
    let existing = parts.store.existing_keys()?;
    let outcome = dedup::filter_new(&existing, records);
    report.removed = outcome.removed.clone();
    report.in_batch_duplicates = outcome.in_batch_duplicates.clone();
    report.n_new = outcome.n_new();
    if !outcome.in_batch_duplicates.is_empty() {
        tracing::warn!(
            "batch repeats incident id(s) {}; kept the first of each",
            crate::error::preview_ids(&outcome.in_batch_duplicates)
        );
    }
    tracing::info!(
        "Dedup: {} already published, {} new",
        outcome.removed.len(),
        outcome.n_new()
    );
    if outcome.surviving.is_empty() {
        if preflight_lag > 0 {
            tracing::error!(
                "No new rows, but replica {} is behind the store by {preflight_lag} row(s)",
                parts.replica.describe()
            );
            let lagging = SyncOutcome::ReplicaBehind { lag: preflight_lag };
            return Ok(report.finish(lagging, started));
        }
        tracing::info!("No new rows to sync");
        return Ok(report.finish(SyncOutcome::AlreadyInSync, started));
    }
    let mut batch = outcome.surviving;

    // 4. Normalize.
    normalize_batch(&mut batch);

    // 5. Geocode.
    let results = geocode_batch(parts.geocoder, &batch, &config.geocoder.field_map)?;
    report.tally = MatchTally::of(&results);
    report.unmatched = batch
        .iter()
        .zip(&results)
        .filter(|(_, r)| r.status == MatchStatus::Unmatched)
        .map(|(rec, _)| rec.incident_id.clone())
        .collect();

    // 6. Reconcile.
    let (plan, rows) = reconcile(&batch, &results, &config.schema)?;
    tracing::info!("Reconciled {} row(s) into {} column(s)", rows.len(), plan.columns.len());

    if dry_run {
        tracing::info!("[dry-run] would append {} row(s) to both stores", rows.len());
        return Ok(report.finish(SyncOutcome::WouldSync { n_new: rows.len() }, started));
    }

    // 7. Authoritative store.
    parts.store.append(&rows)?;

    // 8. Re-check, stage, replica.
    let (counts, decision) = guard::check(parts.store, parts.replica)?;
    report.counts = counts;
    let expected_delta = match decision {
        GuardDecision::Anomaly(a) => return Ok(report.finish(SyncOutcome::Anomaly(a), started)),
        GuardDecision::InSync => {
            tracing::warn!(
                "replica already matches the store after the local append; skipping replica write"
            );
            return Ok(report.finish(SyncOutcome::AlreadyInSync, started));
        }
        GuardDecision::Append { expected_delta } => expected_delta,
    };
    if expected_delta != rows.len() {
        tracing::warn!(
            "replica is behind by {expected_delta} row(s) but this batch has {}; appending the batch",
            rows.len()
        );
    }

    let staged = staging::stage_at(&config.staging_dir, &rows)?;
    report.staged_digest = Some(staged.digest.clone());
    let appended = match parts.replica.append(&rows).and_then(|r| r.into_result()) {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(
                "replica append failed; staged payload kept at {}",
                staged.path.display()
            );
            return Err(e);
        }
    };
    staging::release(&staged)?;

    report.counts = guard::counts(parts.store, parts.replica)?;
    if report.counts.local != report.counts.remote {
        tracing::warn!(
            "counts differ after sync: local {}, remote {}",
            report.counts.local,
            report.counts.remote
        );
    }
    Ok(report.finish(SyncOutcome::Synced { n_new: appended }, started))
}
