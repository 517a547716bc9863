//! Batch geocoding against a `geocodeAddresses` REST endpoint.
//!
//! Records go out in chunks of `batch_size`. Each carries an `OBJECTID`
//! equal to its position in the whole batch; results come back in any order
//! with a matching `ResultID` and are put back in record order here.

use std::collections::HashMap;

use serde_json::{json, Value};

use geosync_core::{AddressRecord, Attributes, FieldRoleMapping, GeocodeResult, MatchStatus, Point};
use geosync_sync::geocode::query_fields;
use geosync_sync::{GeocodeAdapter, SyncError};

use crate::client::RestClient;
use crate::error::RemoteError;

/// Fields consumed into [`GeocodeResult`] rather than carried as extras.
const CONSUMED: [&str; 3] = ["ResultID", "Status", "Score"];

pub struct HttpLocator {
    url: String,
    batch_size: usize,
    out_sr: Option<u32>,
    client: RestClient,
}

impl HttpLocator {
    /// `url` is the locator service root (`.../GeocodeServer`).
    pub fn new(
        url: impl Into<String>,
        batch_size: usize,
        timeout_ms: u64,
        out_sr: Option<u32>,
        token: Option<String>,
    ) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
            out_sr,
            client: RestClient::new(timeout_ms, token),
        }
    }

    fn geocode_chunk(
        &self,
        offset: usize,
        chunk: &[AddressRecord],
        mapping: &FieldRoleMapping,
    ) -> Result<Vec<GeocodeResult>, RemoteError> {
        let url = format!("{}/geocodeAddresses", self.url);
        let addresses = addresses_payload(offset, chunk, mapping).to_string();
        let out_sr = self.out_sr.map(|sr| sr.to_string());
        let mut params = vec![("addresses", addresses.as_str())];
        if let Some(sr) = &out_sr {
            params.push(("outSR", sr.as_str()));
        }
        let body = self.client.post_form(&url, &params)?;
        parse_locations(&url, &body, offset, chunk.len())
    }
}

impl GeocodeAdapter for HttpLocator {
    fn name(&self) -> &str {
        &self.url
    }

    fn geocode(
        &self,
        records: &[AddressRecord],
        mapping: &FieldRoleMapping,
    ) -> Result<Vec<GeocodeResult>, SyncError> {
        let mut results = Vec::with_capacity(records.len());
        for (i, chunk) in records.chunks(self.batch_size).enumerate() {
            let offset = i * self.batch_size;
            tracing::debug!("geocoding records {}..{}", offset, offset + chunk.len());
            let part = self
                .geocode_chunk(offset, chunk, mapping)
                .map_err(SyncError::geocode_engine)?;
            results.extend(part);
        }
        Ok(results)
    }
}

/// `addresses` form value for one chunk.
pub fn addresses_payload(offset: usize, chunk: &[AddressRecord], mapping: &FieldRoleMapping) -> Value {
    let records: Vec<Value> = chunk
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut attributes = Attributes::new();
            attributes.insert("OBJECTID".to_string(), json!(offset + i));
            for (role, value) in query_fields(record, mapping) {
                if let Some(value) = value {
                    attributes.insert(role.to_string(), Value::String(value.to_string()));
                }
            }
            json!({"attributes": attributes})
        })
        .collect();
    json!({"records": records})
}

/// Turn a `locations` reply into results ordered by `ResultID`.
///
/// Ids in `offset..offset + expected` may be answered at most once. Ids the
/// reply leaves out become unmatched results.
pub fn parse_locations(
    url: &str,
    body: &Value,
    offset: usize,
    expected: usize,
) -> Result<Vec<GeocodeResult>, RemoteError> {
    let locations = body
        .get("locations")
        .and_then(Value::as_array)
        .ok_or_else(|| RemoteError::protocol(url, "missing 'locations'"))?;

    let mut by_id: HashMap<usize, GeocodeResult> = HashMap::with_capacity(locations.len());
    for location in locations {
        let attributes = location
            .get("attributes")
            .and_then(Value::as_object)
            .ok_or_else(|| RemoteError::protocol(url, "location without attributes"))?;
        let id = attributes
            .get("ResultID")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| RemoteError::protocol(url, "location without ResultID"))?;
        if !(offset..offset + expected).contains(&id) {
            return Err(RemoteError::protocol(url, format!("unknown ResultID {id}")));
        }
        if by_id.insert(id, to_result(location, attributes)).is_some() {
            return Err(RemoteError::protocol(url, format!("ResultID {id} answered twice")));
        }
    }

    let mut missing = Vec::new();
    let results: Vec<GeocodeResult> = (offset..offset + expected)
        .map(|id| {
            by_id.remove(&id).unwrap_or_else(|| {
                missing.push(id.to_string());
                GeocodeResult::unmatched()
            })
        })
        .collect();
    if !missing.is_empty() {
        tracing::warn!(
            "{url} returned no result for ResultID(s) {}; treating them as unmatched",
            missing.join(", ")
        );
    }
    Ok(results)
}

fn to_result(location: &Value, attributes: &Attributes) -> GeocodeResult {
    let status = attributes
        .get("Status")
        .and_then(Value::as_str)
        .map(MatchStatus::from_code)
        .unwrap_or(MatchStatus::Unmatched);
    let score = attributes
        .get("Score")
        .and_then(Value::as_f64)
        .or_else(|| location.get("score").and_then(Value::as_f64))
        .unwrap_or_default();
    let point = location.get("location").and_then(|l| {
        let x = l.get("x").and_then(Value::as_f64)?;
        let y = l.get("y").and_then(Value::as_f64)?;
        (x.is_finite() && y.is_finite()).then_some(Point { x, y })
    });
    let extra = attributes
        .iter()
        .filter(|(k, _)| !CONSUMED.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    GeocodeResult {
        location: if status == MatchStatus::Unmatched { None } else { point },
        status,
        score,
        extra,
    }
}
