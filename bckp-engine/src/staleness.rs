//! Staleness detection.
//!
//! Signal precedence:
//! 1. `Stale` when forced (no filesystem access)
//! 2. `NoPriorArtifact` (latest artifact missing)
//! 3. `Fresh` when no source file is newer than the latest artifact
//! 4. `Stale`
//!
//! Equal timestamps count as fresh.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use bckp_archive::ExcludeSet;
use bckp_core::{Job, JobId};

use crate::error::{io_err, EngineError};
use crate::naming;
use crate::scanner;

/// Whether a job needs a new artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
    NoPriorArtifact,
    Stale,
    Fresh,
}

impl Staleness {
    pub fn needs_backup(self) -> bool {
        !matches!(self, Staleness::Fresh)
    }
}

/// Decide whether `job` needs a new artifact.
pub fn check(job: &Job, force: bool) -> Result<Staleness, EngineError> {
    if force {
        return Ok(Staleness::Stale);
    }
    let latest = naming::latest_path(job);
    let Some(artifact_mtime) = artifact_mtime(&latest)? else {
        return Ok(Staleness::NoPriorArtifact);
    };
    let newest = newest_source(job)?;
    Ok(classify(artifact_mtime, newest))
}

fn classify(artifact: SystemTime, newest_source: Option<SystemTime>) -> Staleness {
    match newest_source {
        Some(source) if source > artifact => Staleness::Stale,
        _ => Staleness::Fresh,
    }
}

fn artifact_mtime(latest: &std::path::Path) -> Result<Option<SystemTime>, EngineError> {
    match std::fs::metadata(latest) {
        Ok(meta) => meta.modified().map(Some).map_err(|e| io_err(latest, e)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(latest, err)),
    }
}

fn newest_source(job: &Job) -> Result<Option<SystemTime>, EngineError> {
    let excludes = ExcludeSet::new(&job.exclude)?;
    scanner::newest_mtime(&job.source_dir, &excludes, job.follow_symlinks)
}

// ---------------------------------------------------------------------------
// Status reporting
// ---------------------------------------------------------------------------

/// The latest artifact as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactState {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Read-only snapshot of a job for `bckp status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub latest: PathBuf,
    pub artifact: Option<ArtifactState>,
    pub newest_source: Option<DateTime<Utc>>,
    pub staleness: Staleness,
}

/// Inspect a concrete job without modifying anything.
pub fn inspect(job: &Job) -> Result<JobStatus, EngineError> {
    let latest = naming::latest_path(job);
    let artifact = match std::fs::metadata(&latest) {
        Ok(meta) => Some((meta.len(), meta.modified().map_err(|e| io_err(&latest, e))?)),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => return Err(io_err(&latest, err)),
    };
    let newest = newest_source(job)?;

    let staleness = match artifact {
        None => Staleness::NoPriorArtifact,
        Some((_, modified)) => classify(modified, newest),
    };
    Ok(JobStatus {
        id: job.id.clone(),
        latest,
        artifact: artifact.map(|(size, modified)| ArtifactState {
            size,
            modified: modified.into(),
        }),
        newest_source: newest.map(Into::into),
        staleness,
    })
}

/// Format age from a chrono timestamp.
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let now = Utc::now();
    let age = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
