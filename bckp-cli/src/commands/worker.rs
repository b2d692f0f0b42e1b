//! Hidden `bckp worker` — one job per process.

use std::io;

use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    bckp_runner::serve(stdin, stdout).context("worker protocol failure")
}
