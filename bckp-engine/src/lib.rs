//! # bckp-engine
//!
//! Per-job backup logic, independent of how jobs are scheduled:
//!
//! - [`scanner`] — newest mtime under a tree; immediate subdirectories
//! - [`expand`] — wildcard expansion and artifact collision checks
//! - [`staleness`] — does a job need a new artifact?
//! - [`naming`] — latest, rotated and temporary artifact names
//! - [`publisher`] — build, finish and atomically publish an artifact

pub mod error;
pub mod expand;
pub mod naming;
pub mod publisher;
pub mod scanner;
pub mod staleness;

pub use error::EngineError;
pub use expand::{check_collisions, expand, expand_all, Expansion};
pub use publisher::publish;
pub use staleness::{check, inspect, JobStatus, Staleness};
