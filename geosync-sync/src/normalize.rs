//! Address normalizer: one geocoder-ready string per record.
//!
//! Street number, direction, name and type are joined in that order with
//! single spaces. Missing or blank components are skipped, inner whitespace
//! runs collapse to one space, and the result is trimmed.

use geosync_core::{AddressRecord, StreetComponents};

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the full address for one set of street components.
pub fn full_address(street: &StreetComponents) -> String {
    let parts = [
        street.number.as_deref(),
        street.direction.as_deref(),
        street.name.as_deref(),
        street.street_type.as_deref(),
    ];
    let joined = parts.into_iter().flatten().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&joined)
}

/// Set `full_address` on every record.
pub fn normalize_batch(records: &mut [AddressRecord]) {
    for record in records.iter_mut() {
        record.full_address = Some(full_address(&record.street));
    }
    let blank = records
        .iter()
        .filter(|r| r.full_address.as_deref().is_some_and(str::is_empty))
        .count();
    if blank > 0 {
        tracing::warn!("{blank} record(s) have no street components; they will not match");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn street(
        number: Option<&str>,
        direction: Option<&str>,
        name: Option<&str>,
        street_type: Option<&str>,
    ) -> StreetComponents {
        StreetComponents {
            number: number.map(str::to_string),
            direction: direction.map(str::to_string),
            name: name.map(str::to_string),
            street_type: street_type.map(str::to_string),
        }
    }

    #[test]
    fn missing_direction_is_skipped() {
        let s = street(Some("123"), None, Some("Main"), Some("St"));
        assert_eq!(full_address(&s), "123 Main St");
    }

    #[test]
    fn all_components_in_fixed_order() {
        let s = street(Some("900"), Some("N"), Some("Indian River"), Some("Dr"));
        assert_eq!(full_address(&s), "900 N Indian River Dr");
    }

    #[test]
    fn inner_and_outer_whitespace_is_collapsed() {
        let s = street(Some("  12 "), Some(" "), Some("Orange\t  Ave"), None);
        assert_eq!(full_address(&s), "12 Orange Ave");
    }

    #[test]
    fn nothing_present_gives_empty_string() {
        assert_eq!(full_address(&StreetComponents::default()), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let cases = [
            street(Some("1"), Some("S"), Some("  US  1 "), Some("Hwy")),
            street(None, None, Some("Avenue   D"), None),
            street(Some("\t5"), None, None, Some("Ct  ")),
        ];
        for s in &cases {
            let once = full_address(s);
            assert_eq!(collapse_whitespace(&once), once);
            assert!(!once.contains("  "), "double space in {once:?}");
            assert_eq!(once.trim(), once);

            let again = full_address(&street(Some(&once), None, None, None));
            assert_eq!(again, once);
        }
    }

    #[test]
    fn batch_sets_every_record() {
        use geosync_core::{Attributes, IncidentId, Locality};
        let mut records = vec![AddressRecord {
            incident_id: IncidentId::from(1_u64),
            street: street(Some("2"), None, Some("Delaware"), Some("Ave")),
            locality: Locality::default(),
            full_address: None,
            attributes: Attributes::new(),
        }];
        normalize_batch(&mut records);
        assert_eq!(records[0].full_address.as_deref(), Some("2 Delaware Ave"));
    }
}
