//! Consistency guard: count-based gate in front of every replica write.
//!
//! The replica may lag the authoritative store but never lead it.

use std::fmt;

use serde::Serialize;

use crate::error::SyncError;
use crate::store::{AuthoritativeStore, RemoteReplica};

/// Reason reported when the replica holds more rows than the store.
pub const REMOTE_AHEAD: &str = "remote ahead of local";

/// Row counts observed at one point in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub local: usize,
    pub remote: usize,
}

/// The replica is ahead of the store; nothing may be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub reason: String,
    pub local: usize,
    pub remote: usize,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (local {}, remote {})", self.reason, self.local, self.remote)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardDecision {
    /// The replica lags by `expected_delta` rows.
    Append { expected_delta: usize },
    InSync,
    Anomaly(Anomaly),
}

impl fmt::Display for GuardDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardDecision::Append { expected_delta } => {
                write!(f, "append (replica behind by {expected_delta})")
            }
            GuardDecision::InSync => write!(f, "in sync"),
            GuardDecision::Anomaly(a) => write!(f, "anomaly: {a}"),
        }
    }
}

pub fn decide(counts: Counts) -> GuardDecision {
    let Counts { local, remote } = counts;
    if remote < local {
        GuardDecision::Append {
            expected_delta: local - remote,
        }
    } else if remote == local {
        GuardDecision::InSync
    } else {
        GuardDecision::Anomaly(Anomaly {
            reason: REMOTE_AHEAD.to_string(),
            local,
            remote,
        })
    }
}

/// Read both counts.
pub fn counts(
    store: &dyn AuthoritativeStore,
    replica: &dyn RemoteReplica,
) -> Result<Counts, SyncError> {
    Ok(Counts {
        local: store.count()?,
        remote: replica.count()?,
    })
}

/// Read both counts and decide.
pub fn check(
    store: &dyn AuthoritativeStore,
    replica: &dyn RemoteReplica,
) -> Result<(Counts, GuardDecision), SyncError> {
    let counts = counts(store, replica)?;
    let decision = decide(counts);
    tracing::info!(
        "Guard: local {} / remote {} -> {decision}",
        counts.local,
        counts.remote
    );
    Ok((counts, decision))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(local: usize, remote: usize) -> GuardDecision {
        decide(Counts { local, remote })
    }

    #[test]
    fn lagging_replica_gets_delta() {
        assert_eq!(at(7, 5), GuardDecision::Append { expected_delta: 2 });
    }

    #[test]
    fn equal_counts_are_in_sync() {
        assert_eq!(at(5, 5), GuardDecision::InSync);
        assert_eq!(at(0, 0), GuardDecision::InSync);
    }

    #[test]
    fn replica_ahead_is_anomaly() {
        match at(5, 6) {
            GuardDecision::Anomaly(a) => {
                assert_eq!(a.reason, REMOTE_AHEAD);
                assert_eq!((a.local, a.remote), (5, 6));
            }
            other => panic!("unexpected decision: {other}"),
        }
    }

    #[test]
    fn decision_serializes_with_tag() {
        let json = serde_json::to_value(at(3, 1)).unwrap();
        assert_eq!(json["kind"], "append");
        assert_eq!(json["expected_delta"], 2);
    }
}
