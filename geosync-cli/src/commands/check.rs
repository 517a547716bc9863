//! `geosync check`: validate config and credentials, show resolved paths.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use geosync_core::{config::load_credentials_at, LocatorConfig, ReplicaConfig};
use geosync_sync::GeocodeAdapter;

use super::ConfigArg;
use crate::{logging, wiring, Exit};

/// Arguments for `geosync check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArg,
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "item")]
    item: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

fn row(item: &'static str, value: impl Into<String>) -> CheckRow {
    CheckRow {
        item,
        value: value.into(),
    }
}

impl CheckArgs {
    pub fn run(self) -> Result<Exit> {
        logging::init_quiet();
        let (path, config) = self.config.load()?;

        if !config.input.exists() {
            bail!("input batch {} does not exist", config.input.display());
        }

        let mut rows = vec![
            row("config", path.display().to_string()),
            row("input", config.input.display().to_string()),
            row("store", config.store.display().to_string()),
        ];
        rows.push(match &config.replica {
            ReplicaConfig::File { path } => row("replica", format!("file {}", path.display())),
            ReplicaConfig::FeatureService { url, timeout_ms } => {
                row("replica", format!("feature service {url} ({timeout_ms} ms)"))
            }
        });

        let credentials = match &config.credentials {
            Some(p) => Some(
                load_credentials_at(p)
                    .with_context(|| format!("failed to load credentials from {}", p.display()))?,
            ),
            None => None,
        };
        let token = credentials.as_ref().and_then(|c| c.token.clone());
        let locator = wiring::locator(&config, token)?;
        rows.push(match &config.geocoder.locator {
            LocatorConfig::Reference { .. } => row("locator", format!("reference {}", locator.name())),
            LocatorConfig::Http { batch_size, .. } => {
                row("locator", format!("http {} (batches of {batch_size})", locator.name()))
            }
        });
        let roles: Vec<&str> = config.geocoder.field_map.iter().map(|b| b.role.as_str()).collect();
        rows.push(row("field roles", roles.join(", ")));
        rows.push(row("required fields", config.schema.required_fields.join(", ")));
        rows.push(row("staging", config.staging_dir.display().to_string()));
        rows.push(match (&config.credentials, &credentials) {
            (Some(p), Some(c)) => row(
                "credentials",
                format!(
                    "{} as {} ({})",
                    p.display(),
                    c.username,
                    if c.token.is_some() { "token" } else { "no token" }
                ),
            ),
            _ => row("credentials", "none"),
        });
        rows.push(row(
            "log",
            config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stderr".to_string()),
        ));

        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("{} configuration is valid", "✓".green().bold());
        Ok(Exit::Ok)
    }
}
