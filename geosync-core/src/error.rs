//! Error types for geosync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading job configuration or credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with the file path and line context from serde_yaml.
    #[error("failed to parse job config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The credentials file is not valid JSON or is missing a key.
    #[error("failed to parse credentials at {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No config file at the explicit path or any of the default locations.
    #[error("job config not found at {path}")]
    NotFound { path: PathBuf },

    /// The file parsed but describes an unusable job.
    #[error("invalid job config: {0}")]
    Invalid(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
