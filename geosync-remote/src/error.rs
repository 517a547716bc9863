//! Error types for geosync-remote.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("transport failure calling {url}: {detail}")]
    Transport { url: String, detail: String },

    /// Non-2xx HTTP status.
    #[error("{url} answered HTTP {code}")]
    Status { url: String, code: u16 },

    /// The service answered 200 with an `{"error": ...}` body.
    #[error("{url} reported error {code}: {message}")]
    Service {
        url: String,
        code: i64,
        message: String,
    },

    /// The body did not have the expected shape.
    #[error("unexpected response from {url}: {detail}")]
    Protocol { url: String, detail: String },
}

impl RemoteError {
    pub(crate) fn protocol(url: &str, detail: impl Into<String>) -> Self {
        RemoteError::Protocol {
            url: url.to_string(),
            detail: detail.into(),
        }
    }
}
