//! # geosync-remote
//!
//! HTTP collaborators for the sync pipeline: a hosted feature layer as the
//! [`RemoteReplica`](geosync_sync::RemoteReplica) and a `geocodeAddresses`
//! service as the [`GeocodeAdapter`](geosync_sync::GeocodeAdapter).
//!
//! Both authenticate with a pre-issued token when one is configured. No
//! request is retried; a failure is reported to the pipeline as is.

pub mod client;
pub mod error;
pub mod feature_service;
pub mod locator;

pub use error::RemoteError;
pub use feature_service::FeatureServiceReplica;
pub use locator::HttpLocator;
