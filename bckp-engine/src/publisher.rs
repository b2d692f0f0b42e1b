//! Artifact publication.
//!
//! ## `publish` protocol
//!
//! 1. Ensure the artifact directory exists (mode `0700`).
//! 2. Create `<latest>.<hex>.tmp` with `create_new`.
//! 3. Stream `tar → compress → encrypt → tmp` and finish every layer.
//! 4. `fsync` the temp file.
//! 5. Rename the existing latest artifact to its dated name.
//! 6. Rename the temp file to the latest name (atomic on POSIX).
//!
//! Any failure removes the temp file. If step 6 fails the rotated artifact
//! is moved back, so the previous latest artifact survives.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bckp_archive::{build_archive, writer_chain, ExcludeSet};
use bckp_core::{ArtifactInfo, Job, Password};

use crate::error::{io_err, EngineError};
use crate::naming;

/// Produce a new artifact for `job` and rotate the previous one.
pub fn publish(job: &Job) -> Result<ArtifactInfo, EngineError> {
    let tmp = naming::temp_path(job);
    publish_with_tmp(job, &tmp)
}

fn publish_with_tmp(job: &Job, tmp: &Path) -> Result<ArtifactInfo, EngineError> {
    let started = Instant::now();
    let password = password_for(job)?;
    let excludes = ExcludeSet::new(&job.exclude)?;

    let latest = naming::latest_path(job);
    if let Some(parent) = latest.parent() {
        ensure_dir(parent)?;
    }

    let file = create_tmp(tmp)?;
    let rotated = match write_and_swap(job, file, tmp, &latest, &excludes, password) {
        Ok(rotated) => rotated,
        Err(err) => {
            let _ = fs::remove_file(tmp);
            return Err(err);
        }
    };

    let size = fs::metadata(&latest).map_err(|e| io_err(&latest, e))?.len();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        job = %job.id,
        path = %latest.display(),
        size,
        elapsed_ms,
        "published artifact"
    );
    Ok(ArtifactInfo {
        path: latest,
        rotated,
        size,
        elapsed_ms,
    })
}

fn password_for(job: &Job) -> Result<Option<&Password>, EngineError> {
    if !job.encrypt {
        return Ok(None);
    }
    match job.password.as_ref() {
        Some(password) if !password.is_empty() => Ok(Some(password)),
        _ => Err(EngineError::MissingPassword {
            job: job.id.to_string(),
        }),
    }
}

fn write_and_swap(
    job: &Job,
    file: File,
    tmp: &Path,
    latest: &Path,
    excludes: &ExcludeSet,
    password: Option<&Password>,
) -> Result<Option<PathBuf>, EngineError> {
    let chain = writer_chain(file, job.compression, password).map_err(|e| io_err(tmp, e))?;
    let (chain, stats) = build_archive(
        &job.source_dir,
        |rel: &Path| !excludes.is_excluded(rel),
        job.follow_symlinks,
        chain,
    )?;
    chain.finish().map_err(|e| io_err(tmp, e))?;
    tracing::debug!(job = %job.id, files = stats.files, skipped = stats.skipped, "archive written");

    let rotated = rotate(job, latest)?;
    swap_in(tmp, latest, rotated.as_deref())?;
    Ok(rotated)
}

/// Move the current latest artifact (if any) to its dated name.
fn rotate(job: &Job, latest: &Path) -> Result<Option<PathBuf>, EngineError> {
    let meta = match fs::symlink_metadata(latest) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(latest, err)),
    };
    let modified = meta.modified().map_err(|e| io_err(latest, e))?;
    let rotated = naming::rotated_path(job, modified);
    fs::rename(latest, &rotated).map_err(|e| io_err(&rotated, e))?;
    tracing::info!(job = %job.id, rotated = %rotated.display(), "rotated previous artifact");
    Ok(Some(rotated))
}

/// Rename `tmp` over `latest`; on failure move `rotated` back.
fn swap_in(tmp: &Path, latest: &Path, rotated: Option<&Path>) -> Result<(), EngineError> {
    let Err(err) = fs::rename(tmp, latest) else {
        return Ok(());
    };
    if let Some(rotated) = rotated {
        if let Err(restore) = fs::rename(rotated, latest) {
            tracing::error!(
                rotated = %rotated.display(),
                error = %restore,
                "could not restore previous artifact"
            );
        }
    }
    Err(io_err(latest, err))
}

fn create_tmp(tmp: &Path) -> Result<File, EngineError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(tmp).map_err(|e| io_err(tmp, e))
}

fn ensure_dir(dir: &Path) -> Result<(), EngineError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| io_err(dir, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
