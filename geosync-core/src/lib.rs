//! geosync core library: domain types, job configuration, errors.
//!
//! - [`types`]: ids, address records, geocode results, output rows
//! - [`config`]: job config and credentials loading
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ColumnMap, Credentials, FieldRoleMapping, GeocodeField, GeocoderConfig, JobConfig,
    LocatorConfig, LogFormat, LoggingConfig, ReplicaConfig, RoleBinding, SchemaConfig,
};
pub use error::ConfigError;
pub use types::{
    Attributes, AddressRecord, GeocodeResult, IncidentId, Locality, MatchStatus, OutputRow, Point,
    StreetComponents,
};
