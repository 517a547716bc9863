//! Dedup filter: drop incoming records whose id is already published.
//!
//! Membership is an in-process set lookup over canonical [`IncidentId`]s.
//! The disjoint case (nothing to remove) is its own branch and passes the
//! batch through untouched.

use std::collections::HashSet;

use geosync_core::{AddressRecord, IncidentId};

/// Result of filtering one raw batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome {
    /// Records to geocode, in batch order.
    pub surviving: Vec<AddressRecord>,
    /// Ids dropped because the store already holds them (sorted, unique).
    pub removed: Vec<IncidentId>,
    /// Ids that appeared more than once in the batch; later copies were dropped.
    pub in_batch_duplicates: Vec<IncidentId>,
}

impl DedupOutcome {
    /// Number of net-new records.
    pub fn n_new(&self) -> usize {
        self.surviving.len()
    }
}

/// Restrict `batch` to records whose id is not in `existing`.
///
/// Only the first record per id survives within the batch.
pub fn filter_new(existing: &HashSet<IncidentId>, batch: Vec<AddressRecord>) -> DedupOutcome {
    let (batch, in_batch_duplicates) = first_per_id(batch);

    let incoming: HashSet<&IncidentId> = batch.iter().map(|r| &r.incident_id).collect();
    let mut removed: Vec<IncidentId> = incoming
        .into_iter()
        .filter(|id| existing.contains(*id))
        .cloned()
        .collect();

    if removed.is_empty() {
        tracing::debug!("no incoming id is already published; keeping all {} record(s)", batch.len());
        return DedupOutcome {
            surviving: batch,
            removed,
            in_batch_duplicates,
        };
    }

    removed.sort();
    let surviving: Vec<AddressRecord> = batch
        .into_iter()
        .filter(|r| !existing.contains(&r.incident_id))
        .collect();
    tracing::debug!(
        "removed {} already-published record(s), {} remain",
        removed.len(),
        surviving.len()
    );
    DedupOutcome {
        surviving,
        removed,
        in_batch_duplicates,
    }
}

fn first_per_id(batch: Vec<AddressRecord>) -> (Vec<AddressRecord>, Vec<IncidentId>) {
    let mut seen = HashSet::with_capacity(batch.len());
    let mut duplicates = Vec::new();
    let mut kept = Vec::with_capacity(batch.len());
    for record in batch {
        if seen.insert(record.incident_id.clone()) {
            kept.push(record);
        } else {
            duplicates.push(record.incident_id);
        }
    }
    duplicates.sort();
    duplicates.dedup();
    (kept, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosync_core::{Attributes, Locality, StreetComponents};

    fn record(id: u64) -> AddressRecord {
        AddressRecord {
            incident_id: IncidentId::from(id),
            street: StreetComponents::default(),
            locality: Locality::default(),
            full_address: None,
            attributes: Attributes::new(),
        }
    }

    fn ids(records: &[AddressRecord]) -> Vec<String> {
        records.iter().map(|r| r.incident_id.to_string()).collect()
    }

    fn existing(list: &[u64]) -> HashSet<IncidentId> {
        list.iter().copied().map(IncidentId::from).collect()
    }

    #[test]
    fn overlapping_ids_are_removed() {
        let out = filter_new(&existing(&[1, 2]), vec![record(2), record(3)]);
        assert_eq!(ids(&out.surviving), ["3"]);
        assert_eq!(out.removed, vec![IncidentId::from(2_u64)]);
        assert_eq!(out.n_new(), 1);
    }

    #[test]
    fn disjoint_sets_keep_whole_batch() {
        let out = filter_new(&existing(&[1, 2]), vec![record(5), record(4)]);
        assert_eq!(ids(&out.surviving), ["5", "4"]);
        assert!(out.removed.is_empty());
    }

    #[test]
    fn empty_store_keeps_whole_batch() {
        let out = filter_new(&HashSet::new(), vec![record(1)]);
        assert_eq!(out.n_new(), 1);
    }

    #[test]
    fn fully_published_batch_is_empty() {
        let out = filter_new(&existing(&[1, 2, 3]), vec![record(3), record(1)]);
        assert!(out.surviving.is_empty());
        assert_eq!(out.removed.len(), 2);
    }

    #[test]
    fn repeated_ids_in_batch_keep_first() {
        let mut first = record(9);
        first.attributes.insert("n".into(), 1.into());
        let mut second = record(9);
        second.attributes.insert("n".into(), 2.into());
        let out = filter_new(&HashSet::new(), vec![first, second, record(10)]);
        assert_eq!(ids(&out.surviving), ["9", "10"]);
        assert_eq!(out.surviving[0].attributes["n"], 1);
        assert_eq!(out.in_batch_duplicates, vec![IncidentId::from(9_u64)]);
    }

    #[test]
    fn no_surviving_id_is_published() {
        let store = existing(&[2, 4, 6, 8]);
        let batch: Vec<AddressRecord> = (1..=10).map(record).collect();
        let out = filter_new(&store, batch);
        assert!(out.surviving.iter().all(|r| !store.contains(&r.incident_id)));
        assert_eq!(out.n_new(), 6);
    }
}
