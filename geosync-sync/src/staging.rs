//! Staging artifact for the replica append.
//!
//! Before rows go to the replica they are serialized to
//! `<staging_dir>/updates.json`:
//!
//! 1. Serialize the rows as a feature set.
//! 2. SHA-256 hash the payload.
//! 3. Write to `updates.json.tmp`.
//! 4. Rename to `updates.json` (atomic on POSIX).
//!
//! The file is released after a successful append and kept otherwise, so a
//! failed run leaves the exact payload behind for diagnosis.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use geosync_core::{Attributes, OutputRow, Point};

use crate::error::{io_err, json_err, SyncError};

/// File name of the staged payload inside the staging directory.
pub const STAGED_FILE: &str = "updates.json";

/// One staged feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    #[serde(default)]
    pub geometry: Option<Point>,
    pub attributes: Attributes,
}

/// Staged payload document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
}

impl FeatureSet {
    pub fn from_rows(rows: &[OutputRow]) -> Self {
        Self {
            features: rows
                .iter()
                .map(|r| Feature {
                    geometry: r.geometry,
                    attributes: r.attributes.clone(),
                })
                .collect(),
        }
    }
}

/// A payload on disk awaiting the replica append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPayload {
    pub path: PathBuf,
    /// Hex SHA-256 of the file contents.
    pub digest: String,
    pub rows: usize,
}

pub fn staged_path(dir: &Path) -> PathBuf {
    dir.join(STAGED_FILE)
}

/// Write `rows` to the staging directory.
pub fn stage_at(dir: &Path, rows: &[OutputRow]) -> Result<StagedPayload, SyncError> {
    let path = staged_path(dir);
    let tmp = dir.join(format!("{STAGED_FILE}.tmp"));
    stage_with_tmp(dir, &path, &tmp, rows)
}

fn stage_with_tmp(
    dir: &Path,
    path: &Path,
    tmp: &Path,
    rows: &[OutputRow],
) -> Result<StagedPayload, SyncError> {
    let json = serde_json::to_string_pretty(&FeatureSet::from_rows(rows))
        .map_err(|e| json_err(path, e))?;

    let digest = {
        let mut h = Sha256::new();
        h.update(json.as_bytes());
        hex::encode(h.finalize())
    };

    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    std::fs::write(tmp, &json).map_err(|e| io_err(tmp, e))?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!(
        "Staged {} row(s) at {} (sha256 {digest})",
        rows.len(),
        path.display()
    );
    Ok(StagedPayload {
        path: path.to_path_buf(),
        digest,
        rows: rows.len(),
    })
}

/// Remove a staged payload after the replica accepted it.
pub fn release(staged: &StagedPayload) -> Result<(), SyncError> {
    match std::fs::remove_file(&staged.path) {
        Ok(()) => {
            tracing::debug!("released staging file {}", staged.path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&staged.path, e)),
    }
}
