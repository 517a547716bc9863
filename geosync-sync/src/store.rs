//! Record stores: the authoritative store and the remote replica.
//!
//! Both are traits so the pipeline can run against files, HTTP services, or
//! in-memory fakes. [`JsonFileStore`] implements both: it persists a
//! [`StoreFile`] JSON document and writes it with the atomic `.tmp` + rename
//! pattern.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use geosync_core::{IncidentId, OutputRow};

use crate::error::{io_err, json_err, RowFailure, SyncError};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The durable, already-geocoded record set. Ground truth for dedup.
pub trait AuthoritativeStore {
    fn describe(&self) -> String;

    fn count(&self) -> Result<usize, SyncError>;

    fn existing_keys(&self) -> Result<HashSet<IncidentId>, SyncError>;

    /// Append all rows or none. An id already present is
    /// [`SyncError::DuplicateKey`].
    fn append(&self, rows: &[OutputRow]) -> Result<(), SyncError>;
}

/// Downstream copy of the authoritative store.
pub trait RemoteReplica {
    fn describe(&self) -> String;

    fn count(&self) -> Result<usize, SyncError>;

    /// Append rows, reporting per-row success. Transport failures are
    /// [`SyncError::Replica`]; rejected rows go in the report.
    fn append(&self, rows: &[OutputRow]) -> Result<AppendReport, SyncError>;
}

/// Per-row outcome of a replica append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub attempted: usize,
    pub failures: Vec<RowFailure>,
}

impl AppendReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    /// Number of rows appended, or [`SyncError::PartialAppend`].
    pub fn into_result(self) -> Result<usize, SyncError> {
        if self.failures.is_empty() {
            Ok(self.attempted)
        } else {
            Err(SyncError::PartialAppend {
                attempted: self.attempted,
                failures: self.failures,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// On-disk store payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreFile {
    pub updated_at: DateTime<Utc>,
    pub rows: Vec<OutputRow>,
}

/// Store backed by one JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing file is an empty store.
    pub fn load(&self) -> Result<StoreFile, SyncError> {
        if !self.path.exists() {
            return Ok(StoreFile {
                updated_at: Utc::now(),
                rows: Vec::new(),
            });
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
        serde_json::from_str(&contents).map_err(|e| json_err(&self.path, e))
    }

    /// Save atomically: write `<path>.tmp`, then rename over `<path>`.
    pub fn save(&self, file: &StoreFile) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let json = serde_json::to_string_pretty(file).map_err(|e| json_err(&self.path, e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }

    fn keys_of(file: &StoreFile) -> HashSet<IncidentId> {
        file.rows.iter().map(|r| r.incident_id.clone()).collect()
    }
}

impl AuthoritativeStore for JsonFileStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn count(&self) -> Result<usize, SyncError> {
        Ok(self.load()?.rows.len())
    }

    fn existing_keys(&self) -> Result<HashSet<IncidentId>, SyncError> {
        Ok(Self::keys_of(&self.load()?))
    }

    fn append(&self, rows: &[OutputRow]) -> Result<(), SyncError> {
        let mut file = self.load()?;
        let mut keys = Self::keys_of(&file);
        let mut clashes: Vec<IncidentId> = rows
            .iter()
            .filter(|r| !keys.insert(r.incident_id.clone()))
            .map(|r| r.incident_id.clone())
            .collect();
        if !clashes.is_empty() {
            clashes.sort();
            clashes.dedup();
            return Err(SyncError::DuplicateKey { ids: clashes });
        }

        file.rows.extend_from_slice(rows);
        file.updated_at = Utc::now();
        self.save(&file)?;
        tracing::info!("Appended {} row(s) to {}", rows.len(), self.path.display());
        Ok(())
    }
}

impl RemoteReplica for JsonFileStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn count(&self) -> Result<usize, SyncError> {
        AuthoritativeStore::count(self)
    }

    /// Rows whose id the replica already holds are rejected; the rest land.
    fn append(&self, rows: &[OutputRow]) -> Result<AppendReport, SyncError> {
        let mut file = self.load()?;
        let mut keys = Self::keys_of(&file);
        let mut report = AppendReport {
            attempted: rows.len(),
            failures: Vec::new(),
        };
        for row in rows {
            if keys.insert(row.incident_id.clone()) {
                file.rows.push(row.clone());
            } else {
                report.failures.push(RowFailure {
                    incident_id: row.incident_id.clone(),
                    reason: "incident id already present".to_string(),
                });
            }
        }
        if report.succeeded() > 0 {
            file.updated_at = Utc::now();
            self.save(&file)?;
        }
        tracing::info!(
            "Replica {}: {} of {} row(s) appended",
            self.path.display(),
            report.succeeded(),
            report.attempted
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use geosync_core::{Attributes, Point};
    use tempfile::TempDir;

    fn row(id: u64) -> OutputRow {
        OutputRow {
            incident_id: IncidentId::from(id),
            geometry: Some(Point { x: 1.0, y: 2.0 }),
            attributes: Attributes::new(),
        }
    }

    fn store_in(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("data").join("store.json"))
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(AuthoritativeStore::count(&store).unwrap(), 0);
        assert!(store.existing_keys().unwrap().is_empty());
    }

    #[test]
    fn append_persists_and_creates_parent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        AuthoritativeStore::append(&store, &[row(1), row(2)]).unwrap();

        let reopened = store_in(&dir);
        assert_eq!(AuthoritativeStore::count(&reopened).unwrap(), 2);
        assert!(reopened.existing_keys().unwrap().contains(&IncidentId::from(2_u64)));
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        AuthoritativeStore::append(&store, &[row(1)]).unwrap();
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn authoritative_append_rejects_known_ids_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        AuthoritativeStore::append(&store, &[row(1)]).unwrap();

        let err = AuthoritativeStore::append(&store, &[row(2), row(1)]).unwrap_err();
        match err {
            SyncError::DuplicateKey { ids } => assert_eq!(ids, vec![IncidentId::from(1_u64)]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(AuthoritativeStore::count(&store).unwrap(), 1);
    }

    #[test]
    fn replica_append_reports_rejected_rows() {
        let dir = TempDir::new().unwrap();
        let replica = store_in(&dir);
        RemoteReplica::append(&replica, &[row(1)]).unwrap();

        let report = RemoteReplica::append(&replica, &[row(1), row(2), row(3)]).unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failures[0].incident_id, IncidentId::from(1_u64));
        assert_eq!(RemoteReplica::count(&replica).unwrap(), 3);

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, SyncError::PartialAppend { attempted: 3, .. }));
    }

    #[test]
    fn corrupt_document_is_json_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();
        let err = AuthoritativeStore::count(&store).unwrap_err();
        assert!(matches!(err, SyncError::Json { .. }));
    }
}
