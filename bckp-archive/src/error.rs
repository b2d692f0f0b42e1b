//! Error types for bckp-archive.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while building an artifact stream.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An exclusion pattern failed to compile.
    #[error("invalid exclude pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`ArchiveError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.into(),
        source,
    }
}
