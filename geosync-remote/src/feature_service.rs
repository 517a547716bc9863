//! Hosted feature layer as the remote replica.
//!
//! - count: `GET <layer>/query?where=1=1&returnCountOnly=true`
//! - append: `POST <layer>/addFeatures` with `rollbackOnFailure=false`, so a
//!   bad row does not take the rest of the batch down with it.

use serde_json::{json, Value};

use geosync_core::OutputRow;
use geosync_sync::{AppendReport, RemoteReplica, RowFailure, SyncError};

use crate::client::RestClient;
use crate::error::RemoteError;

pub struct FeatureServiceReplica {
    url: String,
    client: RestClient,
}

impl FeatureServiceReplica {
    /// `url` is the layer endpoint, e.g. `.../FeatureServer/0`.
    pub fn new(url: impl Into<String>, timeout_ms: u64, token: Option<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self {
            url,
            client: RestClient::new(timeout_ms, token),
        }
    }

    fn endpoint(&self, op: &str) -> String {
        format!("{}/{op}", self.url)
    }

    fn query_count(&self) -> Result<usize, RemoteError> {
        let url = self.endpoint("query");
        let body = self
            .client
            .get(&url, &[("where", "1=1"), ("returnCountOnly", "true")])?;
        parse_count(&url, &body)
    }

    fn add_features(&self, rows: &[OutputRow]) -> Result<AppendReport, RemoteError> {
        let url = self.endpoint("addFeatures");
        let features = features_payload(rows).to_string();
        let body = self.client.post_form(
            &url,
            &[("features", features.as_str()), ("rollbackOnFailure", "false")],
        )?;
        parse_add_results(&url, &body, rows)
    }
}

impl RemoteReplica for FeatureServiceReplica {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn count(&self) -> Result<usize, SyncError> {
        self.query_count().map_err(SyncError::replica)
    }

    fn append(&self, rows: &[OutputRow]) -> Result<AppendReport, SyncError> {
        if rows.is_empty() {
            return Ok(AppendReport::default());
        }
        tracing::info!("Appending {} feature(s) to {}", rows.len(), self.url);
        self.add_features(rows).map_err(SyncError::replica)
    }
}

/// `features` form value: one `{geometry, attributes}` object per row.
/// Rows without a location are sent without geometry.
pub fn features_payload(rows: &[OutputRow]) -> Value {
    let features: Vec<Value> = rows
        .iter()
        .map(|row| match row.geometry {
            Some(p) => json!({"geometry": {"x": p.x, "y": p.y}, "attributes": row.attributes}),
            None => json!({"attributes": row.attributes}),
        })
        .collect();
    Value::Array(features)
}

pub fn parse_count(url: &str, body: &Value) -> Result<usize, RemoteError> {
    body.get("count")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| RemoteError::protocol(url, "missing 'count'"))
}

/// Map `addResults` back onto the rows that were sent, by position.
pub fn parse_add_results(
    url: &str,
    body: &Value,
    rows: &[OutputRow],
) -> Result<AppendReport, RemoteError> {
    let results = body
        .get("addResults")
        .and_then(Value::as_array)
        .ok_or_else(|| RemoteError::protocol(url, "missing 'addResults'"))?;
    if results.len() != rows.len() {
        return Err(RemoteError::protocol(
            url,
            format!("{} addResults for {} feature(s)", results.len(), rows.len()),
        ));
    }

    let failures = rows
        .iter()
        .zip(results)
        .filter(|(_, r)| !r.get("success").and_then(Value::as_bool).unwrap_or(false))
        .map(|(row, r)| RowFailure {
            incident_id: row.incident_id.clone(),
            reason: failure_reason(r),
        })
        .collect();
    Ok(AppendReport {
        attempted: rows.len(),
        failures,
    })
}

fn failure_reason(result: &Value) -> String {
    let Some(error) = result.get("error") else {
        return "rejected without detail".to_string();
    };
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let description = error
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("no description");
    format!("code {code}: {description}")
}
