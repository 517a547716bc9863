//! Domain types shared by every geosync crate.
//!
//! Raw rows arrive as ordered attribute maps (`serde_json::Map` with
//! `preserve_order`), so column order survives from input to both stores.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered column name → value map for one row.
pub type Attributes = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// IncidentId
// ---------------------------------------------------------------------------

/// The dedup key. Always held in canonical form: trimmed text, integral
/// numbers without a fractional part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    /// Canonicalize a textual id. Blank input is not an id.
    ///
    /// Float-formatted text (`"12.0"`, `"1.2e1"`) takes the same form as the
    /// equivalent JSON number. Plain digit strings are kept as written, so
    /// leading zeros survive.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let float_like = trimmed.contains(&['.', 'e', 'E'][..]);
        let canonical = float_like
            .then(|| trimmed.parse::<f64>().ok())
            .flatten()
            .and_then(integral_text)
            .unwrap_or_else(|| trimmed.to_owned());
        Some(Self(canonical))
    }

    /// Canonicalize an id taken from a raw row value.
    ///
    /// `12`, `12.0`, `"12"` and `" 12 "` all map to the same id. Booleans,
    /// nulls and nested values are not ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self(i.to_string()))
                } else if let Some(u) = n.as_u64() {
                    Some(Self(u.to_string()))
                } else {
                    n.as_f64().and_then(integral_text).map(Self)
                }
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for IncidentId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Render a float as an integer when it has no fractional part.
fn integral_text(f: f64) -> Option<String> {
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        Some(format!("{}", f as i64))
    } else {
        Some(f.to_string())
    }
}

/// Render a scalar cell as text, or `None` for null/blank/nested values.
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.as_f64().and_then(integral_text)?,
        },
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ---------------------------------------------------------------------------
// Address record
// ---------------------------------------------------------------------------

/// Raw street components, in query order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetComponents {
    pub number: Option<String>,
    pub direction: Option<String>,
    pub name: Option<String>,
    pub street_type: Option<String>,
}

/// Locality components passed to the geocoder unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

/// One incoming row.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRecord {
    pub incident_id: IncidentId,
    pub street: StreetComponents,
    pub locality: Locality,
    /// Set by the normalizer; never part of the destination schema.
    pub full_address: Option<String>,
    /// Every column of the raw row, in input order.
    pub attributes: Attributes,
}

// ---------------------------------------------------------------------------
// Geocoding
// ---------------------------------------------------------------------------

/// Match status reported by a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Matched,
    Tied,
    Unmatched,
}

impl MatchStatus {
    /// Single-letter code written to the `Status` field.
    pub fn code(self) -> &'static str {
        match self {
            MatchStatus::Matched => "M",
            MatchStatus::Tied => "T",
            MatchStatus::Unmatched => "U",
        }
    }

    /// Parse a locator status code. Unknown codes are unmatched.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "M" => MatchStatus::Matched,
            "T" => MatchStatus::Tied,
            _ => MatchStatus::Unmatched,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Matched => write!(f, "matched"),
            MatchStatus::Tied => write!(f, "tied"),
            MatchStatus::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// A point in the locator's spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Locator output for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub location: Option<Point>,
    pub status: MatchStatus,
    pub score: f64,
    /// Extra engine output fields (e.g. `Match_addr`), excluding status and score.
    pub extra: Attributes,
}

impl GeocodeResult {
    pub fn unmatched() -> Self {
        Self {
            location: None,
            status: MatchStatus::Unmatched,
            score: 0.0,
            extra: Attributes::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output row
// ---------------------------------------------------------------------------

/// A reconciled, geocoded row as persisted by both stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub incident_id: IncidentId,
    #[serde(default)]
    pub geometry: Option<Point>,
    pub attributes: Attributes,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
