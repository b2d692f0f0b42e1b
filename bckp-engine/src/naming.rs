//! Artifact file names.
//!
//! ```text
//! <dest>/<id>.latest.tar[.gz|.br|.xz][.aes]           latest
//! <dest>/<id>.<date>[-N].tar[.gz|.br|.xz][.aes]       rotated
//! <dest>/<id>.latest.tar[...].<hex>.tmp               in progress
//! ```
//!
//! Ids of expanded wildcard jobs contain `/`, so their artifacts live in a
//! subdirectory of `dest`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use rand::RngCore;

use bckp_archive::archive_extension;
use bckp_core::Job;

pub const LATEST_MARKER: &str = "latest";
pub const TMP_SUFFIX: &str = "tmp";

const TMP_RANDOM_BYTES: usize = 6;

/// `tar[.<compression>][.aes]` for this job.
pub fn extension(job: &Job) -> String {
    archive_extension(job.compression, job.encrypt)
}

/// Path of the job's current artifact.
pub fn latest_path(job: &Job) -> PathBuf {
    job.dest_dir
        .join(format!("{}.{}.{}", job.id, LATEST_MARKER, extension(job)))
}

/// Free name for rotating an artifact last modified at `modified`.
///
/// The date is the artifact's mtime in local time. When that name is taken
/// (two rotations on one day) a `-1`, `-2`, ... suffix is added to the date.
pub fn rotated_path(job: &Job, modified: SystemTime) -> PathBuf {
    let date = job.date_format.render(&DateTime::<Local>::from(modified));
    let ext = extension(job);

    let first = job.dest_dir.join(format!("{}.{}.{}", job.id, date, ext));
    if !exists(&first) {
        return first;
    }
    let mut n = 1u32;
    loop {
        let candidate = job
            .dest_dir
            .join(format!("{}.{}-{}.{}", job.id, date, n, ext));
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Fresh temporary path next to the latest artifact.
pub fn temp_path(job: &Job) -> PathBuf {
    let mut bytes = [0u8; TMP_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut name = latest_path(job).into_os_string();
    name.push(format!(".{}.{}", hex::encode(bytes), TMP_SUFFIX));
    PathBuf::from(name)
}

fn exists(path: &Path) -> bool {
    // symlink_metadata so that a dangling link still counts as taken.
    std::fs::symlink_metadata(path).is_ok()
}
