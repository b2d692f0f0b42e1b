//! bckp core library — domain types, configuration resolution, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes, [`Job`], artifact and outcome structs
//! - [`datefmt`] — [`DateFormat`] for rotated artifact names
//! - [`config`] — load / resolve / password resolution / sample config
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod datefmt;
pub mod error;
pub mod types;

pub use config::{ConfigFile, JobSpec, Overrides, ResolvedConfig, RunSettings};
pub use datefmt::DateFormat;
pub use error::ConfigError;
pub use types::{ArtifactInfo, Compression, Job, JobId, JobOutcome, Password};
