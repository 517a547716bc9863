//! Reference-point locator.
//!
//! Matches the normalized full address exactly (case-insensitive) against a
//! table of address points, optionally narrowed by ZIP. There is no fuzzy
//! matching: a point table either has the address or it does not.
//!
//! Table formats: CSV with `address,zip,x,y` headers (`zip` may be blank or
//! absent) or a JSON array of the same objects.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use geosync_core::{
    AddressRecord, Attributes, FieldRoleMapping, GeocodeField, GeocodeResult, MatchStatus, Point,
};

use crate::error::{io_err, SyncError};
use crate::geocode::{field_value, GeocodeAdapter};
use crate::normalize::collapse_whitespace;

/// Score assigned to exact matches and ties.
pub const EXACT_SCORE: f64 = 100.0;

/// One row of the point table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddressPoint {
    pub address: String,
    #[serde(default)]
    pub zip: Option<String>,
    pub x: f64,
    pub y: f64,
}

/// Exact-match locator over an in-memory point index.
#[derive(Debug, Clone)]
pub struct ReferenceLocator {
    name: String,
    index: HashMap<String, Vec<AddressPoint>>,
}

impl ReferenceLocator {
    pub fn from_points(name: impl Into<String>, points: Vec<AddressPoint>) -> Self {
        let mut index: HashMap<String, Vec<AddressPoint>> = HashMap::new();
        for point in points {
            index.entry(match_key(&point.address)).or_default().push(point);
        }
        Self {
            name: name.into(),
            index,
        }
    }

    /// Load a point table from `.csv` or `.json`.
    ///
    /// A missing or unreadable table is an engine failure: the locator is
    /// misconfigured.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Err(SyncError::geocode_engine(format!(
                "reference table not found at {}",
                path.display()
            )));
        }
        let points = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
                serde_json::from_str::<Vec<AddressPoint>>(&text).map_err(|e| {
                    SyncError::geocode_engine(format!("bad reference table {}: {e}", path.display()))
                })?
            }
            _ => read_csv_points(path)?,
        };
        tracing::info!(
            "Loaded {} address point(s) from {}",
            points.len(),
            path.display()
        );
        Ok(Self::from_points(locator_name(path), points))
    }

    fn locate(&self, address: Option<&str>, zip: Option<&str>) -> GeocodeResult {
        let Some(address) = address else {
            return GeocodeResult::unmatched();
        };
        let Some(candidates) = self.index.get(&match_key(address)) else {
            return GeocodeResult::unmatched();
        };

        let in_zip: Vec<&AddressPoint> = candidates
            .iter()
            .filter(|p| match (zip, p.zip.as_deref().map(str::trim)) {
                (Some(want), Some(have)) if !have.is_empty() => want == have,
                _ => true,
            })
            .collect();
        let Some(first) = in_zip.first() else {
            return GeocodeResult::unmatched();
        };

        let mut distinct: Vec<(u64, u64)> = in_zip
            .iter()
            .map(|p| (p.x.to_bits(), p.y.to_bits()))
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        let status = if distinct.len() == 1 {
            MatchStatus::Matched
        } else {
            MatchStatus::Tied
        };

        let mut extra = Attributes::new();
        extra.insert("Match_addr".to_string(), Value::String(first.address.clone()));
        extra.insert("Addr_type".to_string(), Value::String("PointAddress".to_string()));
        GeocodeResult {
            location: Some(Point {
                x: first.x,
                y: first.y,
            }),
            status,
            score: EXACT_SCORE,
            extra,
        }
    }
}

impl GeocodeAdapter for ReferenceLocator {
    fn name(&self) -> &str {
        &self.name
    }

    fn geocode(
        &self,
        records: &[AddressRecord],
        mapping: &FieldRoleMapping,
    ) -> Result<Vec<GeocodeResult>, SyncError> {
        let use_zip = mapping.role_for(GeocodeField::Zip).is_some();
        Ok(records
            .iter()
            .map(|r| {
                let zip = if use_zip {
                    field_value(r, GeocodeField::Zip)
                } else {
                    None
                };
                self.locate(field_value(r, GeocodeField::FullAddress), zip)
            })
            .collect())
    }
}

fn match_key(address: &str) -> String {
    collapse_whitespace(address).to_uppercase()
}

fn locator_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reference".to_string())
}

fn read_csv_points(path: &Path) -> Result<Vec<AddressPoint>, SyncError> {
    let bad_table =
        |e: csv::Error| SyncError::geocode_engine(format!("bad reference table {}: {e}", path.display()));
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(bad_table)?;
    let points = reader
        .deserialize::<AddressPoint>()
        .map(|row| row.map_err(bad_table))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(points)
}
