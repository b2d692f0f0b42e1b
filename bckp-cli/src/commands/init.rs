//! `bckp init [PATH] [--force]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use bckp_core::config;

/// Write a commented sample configuration.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the file [default: <config dir>/bckp/config.yaml].
    pub path: Option<PathBuf>,

    /// Replace an existing file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let path = match self.path {
            Some(path) => {
                config::write_sample_at(&path, self.force)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                path
            }
            None => config::write_sample(self.force).context("failed to write sample config")?,
        };
        println!("✓ Wrote sample configuration to {}", path.display());
        println!("  Edit the jobs, then run: bckp run {}", path.display());
        Ok(())
    }
}
