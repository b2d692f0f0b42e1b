//! Wildcard job expansion and artifact collision checks.

use std::collections::HashSet;
use std::path::Path;

use bckp_archive::ExcludeSet;
use bckp_core::{Job, JobId};

use crate::error::EngineError;
use crate::scanner;

/// Concrete jobs plus the wildcard jobs that could not be expanded.
#[derive(Debug, Default)]
pub struct Expansion {
    pub jobs: Vec<Job>,
    pub failures: Vec<(JobId, EngineError)>,
}

/// Expand one job. A plain job yields itself; a wildcard job yields one
/// job per immediate subdirectory of its parent, with id `parent/name`.
pub fn expand(job: &Job) -> Result<Vec<Job>, EngineError> {
    let Some(parent) = job.wildcard_parent() else {
        return Ok(vec![job.clone()]);
    };

    let excludes = ExcludeSet::new(&job.exclude)?;
    let subdirs = scanner::subdirectories(parent, &excludes)?;

    let mut expanded = Vec::with_capacity(subdirs.len());
    for dir in subdirs {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let mut child = job.clone();
        child.id = job.id.child(&name);
        child.source_dir = dir;
        expanded.push(child);
    }
    tracing::debug!(job = %job.id, count = expanded.len(), "expanded wildcard job");
    Ok(expanded)
}

/// Expand every job; a failing wildcard does not stop its siblings.
pub fn expand_all(jobs: &[Job]) -> Expansion {
    let mut expansion = Expansion::default();
    for job in jobs {
        match expand(job) {
            Ok(expanded) => expansion.jobs.extend(expanded),
            Err(err) => {
                tracing::warn!(job = %job.id, error = %err, "wildcard expansion failed");
                expansion.failures.push((job.id.clone(), err));
            }
        }
    }
    expansion
}

/// Reject concrete jobs that would publish under the same id into the same
/// destination. Artifacts of such jobs would rotate each other away, whatever
/// their compression.
pub fn check_collisions(jobs: &[Job]) -> Result<(), EngineError> {
    let mut seen: HashSet<(&Path, &JobId)> = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen.insert((job.dest_dir.as_path(), &job.id)) {
            return Err(EngineError::DuplicateJob {
                id: job.id.to_string(),
                dest: job.dest_dir.clone(),
            });
        }
    }
    Ok(())
}
