//! Build pipeline collaborators from a loaded job config.

use anyhow::{Context, Result};

use geosync_core::{config::load_credentials_at, JobConfig, LocatorConfig, ReplicaConfig};
use geosync_remote::{FeatureServiceReplica, HttpLocator};
use geosync_sync::{
    Collaborators, FileBatch, GeocodeAdapter, JsonFileStore, ReferenceLocator, RemoteReplica,
};

/// Owned collaborators for one run.
pub struct Job {
    pub source: FileBatch,
    pub store: JsonFileStore,
    pub replica: Box<dyn RemoteReplica>,
    pub geocoder: Box<dyn GeocodeAdapter>,
}

impl Job {
    pub fn build(config: &JobConfig) -> Result<Self> {
        let token = token(config)?;
        let geocoder = locator(config, token.clone())?;
        Ok(Self {
            source: FileBatch::new(&config.input),
            store: JsonFileStore::new(&config.store),
            replica: replica(config, token),
            geocoder,
        })
    }

    pub fn parts(&self) -> Collaborators<'_> {
        Collaborators {
            source: &self.source,
            store: &self.store,
            replica: self.replica.as_ref(),
            geocoder: self.geocoder.as_ref(),
        }
    }
}

/// Token from the credentials file, if one is configured.
pub fn token(config: &JobConfig) -> Result<Option<String>> {
    let Some(path) = &config.credentials else {
        return Ok(None);
    };
    let creds = load_credentials_at(path)
        .with_context(|| format!("failed to load credentials from {}", path.display()))?;
    if creds.token.is_none() {
        tracing::warn!(
            "credentials for '{}' carry no token; remote requests will be anonymous",
            creds.username
        );
    }
    Ok(creds.token)
}

pub fn replica(config: &JobConfig, token: Option<String>) -> Box<dyn RemoteReplica> {
    match &config.replica {
        ReplicaConfig::File { path } => Box::new(JsonFileStore::new(path)),
        ReplicaConfig::FeatureService { url, timeout_ms } => {
            Box::new(FeatureServiceReplica::new(url.as_str(), *timeout_ms, token))
        }
    }
}

pub fn locator(config: &JobConfig, token: Option<String>) -> Result<Box<dyn GeocodeAdapter>> {
    Ok(match &config.geocoder.locator {
        LocatorConfig::Reference { points } => Box::new(
            ReferenceLocator::load(points)
                .with_context(|| format!("failed to load reference points {}", points.display()))?,
        ),
        LocatorConfig::Http {
            url,
            batch_size,
            timeout_ms,
            out_sr,
        } => Box::new(HttpLocator::new(
            url.as_str(),
            *batch_size,
            *timeout_ms,
            *out_sr,
            token,
        )),
    })
}
