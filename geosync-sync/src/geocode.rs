//! Geocode adapter seam.
//!
//! Locators implement [`GeocodeAdapter`]. The pipeline never calls a locator
//! directly; it goes through [`geocode_batch`], which enforces the contract:
//! one result per record, in record order. Unmatched records are results,
//! not errors.

use serde::Serialize;

use geosync_core::{AddressRecord, FieldRoleMapping, GeocodeField, GeocodeResult, MatchStatus};

use crate::error::SyncError;

/// A batch locator.
pub trait GeocodeAdapter {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Geocode `records`, offering each mapped field under its role name.
    ///
    /// Must return exactly one result per record, in order. Engine-level
    /// failures are [`SyncError::GeocodeEngine`].
    fn geocode(
        &self,
        records: &[AddressRecord],
        mapping: &FieldRoleMapping,
    ) -> Result<Vec<GeocodeResult>, SyncError>;
}

/// Value a record offers for `field`.
pub fn field_value(record: &AddressRecord, field: GeocodeField) -> Option<&str> {
    let value = match field {
        GeocodeField::FullAddress => record.full_address.as_deref(),
        GeocodeField::City => record.locality.city.as_deref(),
        GeocodeField::County => record.locality.county.as_deref(),
        GeocodeField::State => record.locality.state.as_deref(),
        GeocodeField::Zip => record.locality.zip.as_deref(),
        GeocodeField::Country => record.locality.country.as_deref(),
    };
    value.filter(|v| !v.is_empty())
}

/// `(role, value)` pairs for one record, in mapping order.
pub fn query_fields<'a>(
    record: &'a AddressRecord,
    mapping: &'a FieldRoleMapping,
) -> Vec<(&'a str, Option<&'a str>)> {
    mapping
        .iter()
        .map(|b| (b.role.as_str(), field_value(record, b.field)))
        .collect()
}

/// Match status counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchTally {
    pub matched: usize,
    pub tied: usize,
    pub unmatched: usize,
}

impl MatchTally {
    pub fn of(results: &[GeocodeResult]) -> Self {
        let mut tally = Self::default();
        for r in results {
            match r.status {
                MatchStatus::Matched => tally.matched += 1,
                MatchStatus::Tied => tally.tied += 1,
                MatchStatus::Unmatched => tally.unmatched += 1,
            }
        }
        tally
    }
}

/// Run `adapter` over the whole batch and verify its cardinality.
pub fn geocode_batch(
    adapter: &dyn GeocodeAdapter,
    records: &[AddressRecord],
    mapping: &FieldRoleMapping,
) -> Result<Vec<GeocodeResult>, SyncError> {
    tracing::info!("Geocoding {} record(s) with {}...", records.len(), adapter.name());
    let results = adapter.geocode(records, mapping)?;
    if results.len() != records.len() {
        return Err(SyncError::geocode_engine(format!(
            "{} returned {} result(s) for {} record(s)",
            adapter.name(),
            results.len(),
            records.len()
        )));
    }

    let tally = MatchTally::of(&results);
    tracing::info!(
        "Geocoded: {} matched, {} tied, {} unmatched",
        tally.matched,
        tally.tied,
        tally.unmatched
    );
    if tally.unmatched > 0 {
        let ids: Vec<String> = records
            .iter()
            .zip(&results)
            .filter(|(_, r)| r.status == MatchStatus::Unmatched)
            .map(|(rec, _)| rec.incident_id.to_string())
            .collect();
        tracing::warn!("unmatched incident id(s): {}", ids.join(", "));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosync_core::{Attributes, IncidentId, Locality, StreetComponents};

    struct Fixed(Vec<GeocodeResult>);

    impl GeocodeAdapter for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn geocode(
            &self,
            _records: &[AddressRecord],
            _mapping: &FieldRoleMapping,
        ) -> Result<Vec<GeocodeResult>, SyncError> {
            Ok(self.0.clone())
        }
    }

    fn record(id: u64) -> AddressRecord {
        AddressRecord {
            incident_id: IncidentId::from(id),
            street: StreetComponents::default(),
            locality: Locality {
                zip: Some("34950".to_string()),
                ..Locality::default()
            },
            full_address: Some("100 Orange Ave".to_string()),
            attributes: Attributes::new(),
        }
    }

    #[test]
    fn short_result_list_is_engine_failure() {
        let adapter = Fixed(vec![GeocodeResult::unmatched()]);
        let err = geocode_batch(&adapter, &[record(1), record(2)], &FieldRoleMapping::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::GeocodeEngine(_)));
        assert!(err.to_string().contains("1 result(s) for 2 record(s)"), "got: {err}");
    }

    #[test]
    fn unmatched_results_are_not_errors() {
        let adapter = Fixed(vec![GeocodeResult::unmatched(); 3]);
        let records = [record(1), record(2), record(3)];
        let results = geocode_batch(&adapter, &records, &FieldRoleMapping::default()).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(MatchTally::of(&results).unmatched, 3);
    }

    #[test]
    fn query_fields_follow_mapping_order() {
        let r = record(1);
        let mapping = FieldRoleMapping::default();
        let fields = query_fields(&r, &mapping);
        assert_eq!(fields[0], ("Address or Place", Some("100 Orange Ave")));
        assert_eq!(fields[1], ("City", None));
        assert!(fields.contains(&("ZIP", Some("34950"))));
    }
}
