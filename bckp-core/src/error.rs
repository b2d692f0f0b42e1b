//! Error types for bckp-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading and resolving configuration.
///
/// Every variant is fatal for a run: configuration is resolved once, before
/// any job starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// `dirs::config_dir()` returned `None` — cannot locate the default config.
    #[error("cannot determine config directory; pass a config path explicitly")]
    ConfigDirNotFound,

    /// A job is missing a required field after merging global defaults.
    #[error("job {job}: missing `{field}`")]
    MissingField { job: String, field: &'static str },

    /// Two configured jobs share the same id.
    #[error("duplicate job id '{id}'")]
    DuplicateJobId { id: String },

    /// The id would place artifacts outside the destination directory.
    #[error("invalid job id '{id}': {reason}")]
    InvalidJobId { id: String, reason: &'static str },

    /// `*` may only appear as the last component of a job directory.
    #[error("job {job}: invalid wildcard in {dir}; only a trailing `/*` is supported")]
    InvalidWildcard { job: String, dir: PathBuf },

    #[error("invalid date format '{format}': {reason}")]
    InvalidDateFormat { format: String, reason: String },

    /// Encryption is enabled but no password could be resolved.
    #[error("job {job}: encryption enabled but no password available")]
    MissingPassword { job: String },

    /// Reading the password from the terminal failed.
    #[error("password prompt failed: {0}")]
    Prompt(#[source] std::io::Error),
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
