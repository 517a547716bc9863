pub mod check;
pub mod run;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use geosync_core::{config, JobConfig};

/// `--config`, shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Job config file [default: ./geosync.yaml, then <config dir>/geosync/geosync.yaml].
    #[arg(long, env = "GEOSYNC_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigArg {
    pub fn load(&self) -> Result<(PathBuf, JobConfig)> {
        config::load(self.config.as_deref()).context("failed to load job config")
    }
}
