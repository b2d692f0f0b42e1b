//! bckp — incremental, rotation-aware directory backups.
//!
//! # Usage
//!
//! ```text
//! bckp run [CONFIG] [-c CONFIG] [-p N] [--force] [--in-process]
//! bckp status [CONFIG] [--json]
//! bckp init [PATH] [--force]
//! ```
//!
//! Global flags: `-q/--quiet` (warnings only), `--log-json`. Logs go to
//! stderr; `RUST_LOG` overrides the level.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, run::RunArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "bckp",
    version,
    about = "Back up directory trees into rotated, compressed and encrypted tar archives",
    long_about = None,
)]
struct Cli {
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Back up every job whose source changed since its latest artifact.
    Run(RunArgs),

    /// Show latest artifact, age and staleness per job.
    Status(StatusArgs),

    /// Write a commented sample configuration.
    Init(InitArgs),

    /// Serve one job request on stdin/stdout (used internally by `run`).
    #[command(hide = true)]
    Worker,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    bckp_runner::init_tracing(cli.quiet, cli.log_json);
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Init(args) => args.run(),
        Commands::Worker => commands::worker::run(),
    }
}
