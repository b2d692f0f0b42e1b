pub mod init;
pub mod run;
pub mod status;
pub mod worker;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use bckp_core::config;

/// Configuration file selection shared by `run` and `status`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file [default: <config dir>/bckp/config.yaml].
    #[arg(value_name = "CONFIG", conflicts_with = "config")]
    pub path: Option<PathBuf>,

    /// Same as the positional CONFIG.
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn path(&self) -> Result<PathBuf> {
        match self.config.as_ref().or(self.path.as_ref()) {
            Some(path) => Ok(path.clone()),
            None => config::default_path().context("no configuration file given"),
        }
    }
}
