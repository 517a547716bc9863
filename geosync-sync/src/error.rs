//! Error types for geosync-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use geosync_core::{ConfigError, IncidentId};

/// Boxed error from a collaborator (locator, replica transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A row the replica refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub incident_id: IncidentId,
    pub reason: String,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.incident_id, self.reason)
    }
}

/// All errors that can abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The raw batch is malformed; nothing has been written.
    #[error("malformed input batch {path}: {detail}")]
    Ingestion { path: PathBuf, detail: String },

    /// Delimited-file reader failure, with the file being read.
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The locator is unreachable, misconfigured, or broke its contract.
    #[error("geocode engine failure: {0}")]
    GeocodeEngine(#[source] BoxError),

    /// A colliding field could not be renamed without clobbering another field.
    #[error("cannot resolve collision on field '{field}': rename target '{candidate}' already exists")]
    SchemaCollision { field: String, candidate: String },

    /// The replica accepted some rows and rejected others.
    #[error(
        "replica rejected {} of {} row(s): {}",
        .failures.len(),
        .attempted,
        preview_failures(.failures)
    )]
    PartialAppend {
        attempted: usize,
        failures: Vec<RowFailure>,
    },

    /// The replica could not be reached or answered with garbage.
    #[error("replica unavailable: {0}")]
    Replica(#[source] BoxError),

    /// An append would give two stored rows the same id.
    #[error("store already holds incident id(s): {}", preview_ids(.ids))]
    DuplicateKey { ids: Vec<IncidentId> },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store or staging document could not be (de)serialized.
    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub fn geocode_engine(reason: impl Into<BoxError>) -> Self {
        SyncError::GeocodeEngine(reason.into())
    }

    pub fn replica(reason: impl Into<BoxError>) -> Self {
        SyncError::Replica(reason.into())
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn json_err(path: impl Into<PathBuf>, source: serde_json::Error) -> SyncError {
    SyncError::Json {
        path: path.into(),
        source,
    }
}

const PREVIEW: usize = 5;

/// First few ids, comma separated, with a `+N more` tail.
pub fn preview_ids(ids: &[IncidentId]) -> String {
    preview(ids.iter().map(ToString::to_string), ids.len())
}

fn preview_failures(failures: &[RowFailure]) -> String {
    preview(failures.iter().map(ToString::to_string), failures.len())
}

fn preview(items: impl Iterator<Item = String>, total: usize) -> String {
    let mut shown: Vec<String> = items.take(PREVIEW).collect();
    if total > shown.len() {
        shown.push(format!("+{} more", total - shown.len()));
    }
    shown.join(", ")
}
