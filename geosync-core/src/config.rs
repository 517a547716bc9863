//! Job configuration and credentials.
//!
//! # File layout
//!
//! ```yaml
//! input: orig-data/incidents.csv
//! store: data/published/geocoded.json
//! staging_dir: data/to_append
//! credentials: data/ago-creds.json
//! replica:
//!   kind: feature_service
//!   url: https://services.example.com/arcgis/rest/services/Incidents/FeatureServer/0
//! geocoder:
//!   kind: reference
//!   points: locator/address_points.csv
//! schema:
//!   required_fields: [Status, Score]
//! logging:
//!   file: logs/geocode-addresses.log
//! ```
//!
//! Relative paths resolve against the directory holding the config file.
//!
//! # API pattern
//!
//! - `load_at(path)`: explicit path; used in tests with `TempDir`
//! - `load(explicit)`: resolves the default locations, delegates to `load_at`

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// File name looked up when no explicit config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "geosync.yaml";

// ---------------------------------------------------------------------------
// 1. Job config
// ---------------------------------------------------------------------------

/// A fully loaded job. Paths are absolute (or relative to the process cwd
/// when the config itself was given relatively).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Raw batch file (`.csv`, `.json` or `.ndjson`).
    pub input: PathBuf,
    #[serde(default)]
    pub columns: ColumnMap,
    /// Authoritative store document.
    pub store: PathBuf,
    pub replica: ReplicaConfig,
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    /// Directory holding the staged replica payload.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default)]
    pub credentials: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("to_append")
}

/// Raw column names for each record role.
///
/// Defaults are the incident export's CSV headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub incident_id: String,
    pub street_number: String,
    pub street_direction: String,
    pub street_name: String,
    pub street_type: String,
    pub city: String,
    pub county: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            incident_id: "Incidentid".to_string(),
            street_number: "Locationstreetnumber".to_string(),
            street_direction: "Locationstreetdir".to_string(),
            street_name: "Locationstreetname".to_string(),
            street_type: "Locationstreettype".to_string(),
            city: "Locationcity".to_string(),
            county: "Locationcounty".to_string(),
            state: "Locationstate".to_string(),
            zip: "Locationpostal".to_string(),
            country: "Locationctry".to_string(),
        }
    }
}

/// Where the replica lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplicaConfig {
    /// A second store document on disk.
    File { path: PathBuf },
    /// A hosted feature layer (`.../FeatureServer/<n>`).
    FeatureService {
        url: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

/// Locator selection plus the role mapping handed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocoderConfig {
    #[serde(flatten)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub field_map: FieldRoleMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorConfig {
    /// Exact matching against a table of address points.
    Reference { points: PathBuf },
    /// A `geocodeAddresses` REST endpoint.
    Http {
        url: String,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default)]
        out_sr: Option<u32>,
    },
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_batch_size() -> usize {
    1000
}

/// Record field offered to the locator under some role name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeField {
    FullAddress,
    City,
    County,
    State,
    Zip,
    Country,
}

/// One `role ↦ field` binding, e.g. `"ZIP" ↦ zip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub role: String,
    pub field: GeocodeField,
}

/// Ordered list of role bindings passed to the locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldRoleMapping(pub Vec<RoleBinding>);

impl Default for FieldRoleMapping {
    fn default() -> Self {
        let bind = |role: &str, field| RoleBinding {
            role: role.to_string(),
            field,
        };
        Self(vec![
            bind("Address or Place", GeocodeField::FullAddress),
            bind("City", GeocodeField::City),
            bind("County", GeocodeField::County),
            bind("State", GeocodeField::State),
            bind("ZIP", GeocodeField::Zip),
            bind("Country", GeocodeField::Country),
        ])
    }
}

impl FieldRoleMapping {
    /// Role name bound to `field`, if any.
    pub fn role_for(&self, field: GeocodeField) -> Option<&str> {
        self.0
            .iter()
            .find(|b| b.field == field)
            .map(|b| b.role.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleBinding> {
        self.0.iter()
    }

    /// The full address must be bound exactly once and role names must be unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let address_bindings = self
            .0
            .iter()
            .filter(|b| b.field == GeocodeField::FullAddress)
            .count();
        if address_bindings != 1 {
            return Err(ConfigError::Invalid(format!(
                "geocoder.field_map must bind full_address exactly once (found {address_bindings})"
            )));
        }
        let mut roles: Vec<&str> = self.0.iter().map(|b| b.role.as_str()).collect();
        roles.sort_unstable();
        if let Some(dup) = roles.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid(format!(
                "geocoder.field_map binds role '{}' more than once",
                dup[0]
            )));
        }
        Ok(())
    }
}

/// Destination schema rules used by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Engine output fields the destination cannot do without.
    pub required_fields: Vec<String>,
    /// Prefix for an original field displaced by a same-named engine field.
    pub source_prefix: String,
    /// Suffix for a colliding engine field that is not required.
    pub engine_suffix: String,
    /// Name of the temporary full-address column; never reaches a store.
    pub working_field: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            required_fields: vec!["Status".to_string(), "Score".to_string()],
            source_prefix: "USER_".to_string(),
            engine_suffix: "_1".to_string(),
            working_field: "full_add_temp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log destination; stderr when unset.
    pub file: Option<PathBuf>,
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: Option<String>,
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate the job config at `path`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<JobConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut config: JobConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    config.resolve_paths(base);
    config.validate()?;
    Ok(config)
}

/// Locate the config file: `explicit` if given, else `./geosync.yaml`, else
/// `<config dir>/geosync/geosync.yaml`.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }
    if let Some(dir) = dirs::config_dir() {
        let user = dir.join("geosync").join(DEFAULT_CONFIG_FILE);
        if user.exists() {
            return Ok(user);
        }
    }
    Err(ConfigError::NotFound { path: local })
}

/// `load_at` convenience wrapper over [`resolve_path`].
pub fn load(explicit: Option<&Path>) -> Result<(PathBuf, JobConfig), ConfigError> {
    let path = resolve_path(explicit)?;
    let config = load_at(&path)?;
    Ok((path, config))
}

impl JobConfig {
    fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.input);
        join(&mut self.store);
        join(&mut self.staging_dir);
        if let Some(creds) = self.credentials.as_mut() {
            join(creds);
        }
        if let Some(log) = self.logging.file.as_mut() {
            join(log);
        }
        if let ReplicaConfig::File { path } = &mut self.replica {
            join(path);
        }
        if let LocatorConfig::Reference { points } = &mut self.geocoder.locator {
            join(points);
        }
    }

    /// Checks that cannot be expressed in the serde shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geocoder.field_map.validate()?;
        if let ReplicaConfig::File { path } = &self.replica {
            if path == &self.store {
                return Err(ConfigError::Invalid(format!(
                    "replica path must differ from store path ({})",
                    path.display()
                )));
            }
        }
        if let LocatorConfig::Http { batch_size, .. } = &self.geocoder.locator {
            if *batch_size == 0 {
                return Err(ConfigError::Invalid(
                    "geocoder.batch_size must be at least 1".to_string(),
                ));
            }
        }
        let working = &self.schema.working_field;
        if working.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "schema.working_field must not be empty".to_string(),
            ));
        }
        if self.schema.source_prefix.is_empty() && self.schema.engine_suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "schema.source_prefix and schema.engine_suffix cannot both be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 3. Credentials
// ---------------------------------------------------------------------------

/// Contents of the credentials JSON file.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(rename = "orgURL")]
    pub org_url: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("org_url", &self.org_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Load the credentials JSON at `path`.
pub fn load_credentials_at(path: &Path) -> Result<Credentials, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Credentials {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = "\
input: batch.csv
store: data/geocoded.json
replica:
  kind: file
  path: data/replica.json
geocoder:
  kind: reference
  points: locator/points.csv
";

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_at(&write_config(&dir, MINIMAL)).unwrap();
        assert_eq!(config.columns, ColumnMap::default());
        assert_eq!(config.schema, SchemaConfig::default());
        assert_eq!(config.geocoder.field_map, FieldRoleMapping::default());
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let config = load_at(&write_config(&dir, MINIMAL)).unwrap();
        assert_eq!(config.input, dir.path().join("batch.csv"));
        assert_eq!(config.store, dir.path().join("data/geocoded.json"));
        assert_eq!(config.staging_dir, dir.path().join("to_append"));
        match &config.replica {
            ReplicaConfig::File { path } => assert_eq!(path, &dir.path().join("data/replica.json")),
            other => panic!("unexpected replica: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_at(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn replica_sharing_store_path_is_rejected() {
        let dir = TempDir::new().unwrap();
        let body = MINIMAL.replace("data/replica.json", "data/geocoded.json");
        let err = load_at(&write_config(&dir, &body)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    }

    #[test]
    fn field_map_requires_single_full_address() {
        let mapping = FieldRoleMapping(vec![RoleBinding {
            role: "City".to_string(),
            field: GeocodeField::City,
        }]);
        assert!(mapping.validate().is_err());
        assert!(FieldRoleMapping::default().validate().is_ok());
        assert_eq!(
            FieldRoleMapping::default().role_for(GeocodeField::Zip),
            Some("ZIP")
        );
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(
            &path,
            r#"{"orgURL":"https://org.example.com","username":"gis_admin","password":"hunter2","token":"abc"}"#,
        )
        .unwrap();
        let creds = load_credentials_at(&path).unwrap();
        assert_eq!(creds.username, "gis_admin");
        let shown = format!("{creds:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("abc"));
    }
}
