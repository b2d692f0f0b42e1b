//! Job dispatch: run coordinator, executors and the worker protocol.

pub mod coordinator;
mod error;
pub mod executor;
pub mod protocol;

pub use coordinator::{Coordinator, Interrupt, RunOptions, RunReport};
pub use error::RunnerError;
pub use executor::{Executor, WORKER_SUBCOMMAND};
pub use protocol::{serve, WorkerRequest, WorkerResponse};

use bckp_core::Job;

/// Run `jobs` on a fresh multi-threaded runtime, stopping early on ctrl-c.
pub fn run_blocking(coordinator: &Coordinator, jobs: Vec<Job>) -> Result<RunReport, RunnerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| error::io_err("tokio-runtime", e))?;
    runtime.block_on(async {
        coordinator.interrupt().listen_for_ctrl_c();
        coordinator.run(jobs).await
    })
}

/// Install the global subscriber. Output always goes to stderr: a worker's
/// stdout carries the protocol.
pub fn init_tracing(quiet: bool, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
