//! # geosync-sync
//!
//! Incremental geocode sync: dedup a raw address batch against the
//! authoritative store, geocode what is new, reconcile it to the destination
//! schema, then append it to the store and the remote replica behind a
//! count-based consistency guard.
//!
//! [`pipeline::run`] is the entry point; every external system sits behind a
//! trait ([`BatchSource`], [`GeocodeAdapter`], [`AuthoritativeStore`],
//! [`RemoteReplica`]).

pub mod dedup;
pub mod error;
pub mod geocode;
pub mod guard;
pub mod ingest;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod reference;
pub mod staging;
pub mod store;

pub use error::{BoxError, RowFailure, SyncError};
pub use geocode::{GeocodeAdapter, MatchTally};
pub use guard::{Anomaly, Counts, GuardDecision};
pub use ingest::{BatchSource, FileBatch};
pub use pipeline::{run, Collaborators, RunReport, SyncOutcome};
pub use reference::ReferenceLocator;
pub use store::{AppendReport, AuthoritativeStore, JsonFileStore, RemoteReplica};
