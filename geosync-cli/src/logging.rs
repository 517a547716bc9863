//! Subscriber setup.
//!
//! Library crates log through the `log` facade; the fmt subscriber picks
//! those records up. `RUST_LOG` wins over the configured level.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, fmt::writer::BoxMakeWriter, EnvFilter};

use geosync_core::{LogFormat, LoggingConfig};

use crate::log_rotation::{rotate_if_needed, MAX_LOG_BYTES, MAX_ROTATED_FILES};

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Log to the configured file (rotated first) or to stderr.
pub fn init(logging: &LoggingConfig) -> Result<()> {
    let mut rotated = None;
    let (writer, ansi) = match &logging.file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            }
            match rotate_if_needed(path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
                Ok(true) => rotated = Some(path.clone()),
                Ok(false) => {}
                Err(err) => eprintln!("warning: log rotation failed for {}: {err}", path.display()),
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = fmt()
        .with_env_filter(filter(logging.level.as_deref().unwrap_or("info")))
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(writer);
    let _ = match logging.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if let Some(path) = rotated {
        tracing::info!(path = %path.display(), "log file rotated");
    }
    Ok(())
}

/// Stderr only, warnings and up unless `RUST_LOG` says otherwise.
pub fn init_quiet() {
    let _ = fmt()
        .with_env_filter(filter("warn"))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
