use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the worker protocol, executors and the run coordinator.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine error: {0}")]
    Engine(#[from] bckp_engine::EngineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker protocol error: {0}")]
    Protocol(String),

    /// The worker process exited without writing a response.
    #[error("worker for job {job} exited without a response ({status})")]
    WorkerCrashed { job: String, status: String },

    /// A failure reported by the worker for its job.
    #[error("{0}")]
    Job(String),

    #[error("{failed} of {total} job(s) did not complete; first: {first}")]
    JobsFailed {
        failed: usize,
        total: usize,
        first: String,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RunnerError {
    RunnerError::Io {
        path: path.into(),
        source,
    }
}
