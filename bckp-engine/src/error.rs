//! Error types for bckp-engine.

use std::path::PathBuf;

use thiserror::Error;

use bckp_archive::ArchiveError;

/// All errors that can arise while scanning, expanding or publishing a job.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An error from the archive, compression or encryption layer.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The root of a scan could not be read.
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job {job}: encryption enabled but no password was resolved")]
    MissingPassword { job: String },

    /// Two concrete jobs would publish to the same latest artifact.
    #[error("jobs resolve to the same artifact: '{id}' in {dest}")]
    DuplicateJob { id: String, dest: PathBuf },
}

/// Convenience constructor for [`EngineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}

/// Map a walk failure at the root to [`EngineError::Scan`].
pub(crate) fn scan_err(err: ArchiveError) -> EngineError {
    match err {
        ArchiveError::Io { path, source } => EngineError::Scan { path, source },
        other => EngineError::Archive(other),
    }
}
