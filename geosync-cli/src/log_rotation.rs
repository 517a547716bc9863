//! Size-based rotation of the run log.
//!
//! Rotates the configured log file when it exceeds 10 MiB, keeping at most
//! 5 copies: `geosync.log` → `geosync.log.1` → … → `geosync.log.5`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated copies to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if it is at least `max_bytes` long.
///
/// Returns `true` if rotation happened. A missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// `<log>.<n>`, e.g. `geosync.log.2`.
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("geosync.log");
    base.with_file_name(format!("{name}.{n}"))
}
