//! Tar stream of a directory tree.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{io_err, ArchiveError};
use crate::walk::{EntryKind, TreeWalk};

/// Name used for the top-level entry when the root has no final component (`/`).
const FALLBACK_ROOT_NAME: &str = "root";

/// What went into an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: u64,
    pub dirs: u64,
    pub links: u64,
    /// Entries that disappeared or became unreadable while archiving.
    pub skipped: u64,
}

/// Write a tar stream of `root` into `writer` and hand the writer back.
///
/// Entries are named `<root basename>/<relative path>`. `filter` decides
/// per relative path whether an entry is included; rejected directories are
/// pruned. Unfollowed symlinks are stored as links.
pub fn build_archive<W, F>(
    root: &Path,
    filter: F,
    follow_symlinks: bool,
    writer: W,
) -> Result<(W, ArchiveStats), ArchiveError>
where
    W: Write,
    F: FnMut(&Path) -> bool,
{
    let walk = TreeWalk::new(root, follow_symlinks, filter)?;
    let prefix = PathBuf::from(root.file_name().unwrap_or(OsStr::new(FALLBACK_ROOT_NAME)));

    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(follow_symlinks);
    builder
        .append_dir(&prefix, root)
        .map_err(|e| io_err(root, e))?;

    let mut stats = ArchiveStats::default();
    for entry in walk {
        let name = prefix.join(&entry.relative);
        match entry.kind {
            EntryKind::Dir => {
                builder
                    .append_dir(&name, &entry.path)
                    .map_err(|e| io_err(&entry.path, e))?;
                stats.dirs += 1;
            }
            EntryKind::File => {
                let mut file = match File::open(&entry.path) {
                    Ok(file) => file,
                    Err(err) if is_transient(err.kind()) => {
                        tracing::warn!(path = %entry.path.display(), error = %err, "skipping file");
                        stats.skipped += 1;
                        continue;
                    }
                    Err(err) => return Err(io_err(&entry.path, err)),
                };
                append_snapshot(&mut builder, &name, &entry.path, file)?;
                stats.files += 1;
            }
            EntryKind::Symlink => {
                builder
                    .append_path_with_name(&entry.path, &name)
                    .map_err(|e| io_err(&entry.path, e))?;
                stats.links += 1;
            }
            EntryKind::Other => {
                tracing::debug!(path = %entry.path.display(), "skipping special file");
                stats.skipped += 1;
            }
        }
    }

    let writer = builder.into_inner().map_err(|e| io_err(root, e))?;
    tracing::debug!(
        root = %root.display(),
        files = stats.files,
        dirs = stats.dirs,
        links = stats.links,
        skipped = stats.skipped,
        "archive stream complete"
    );
    Ok((writer, stats))
}

/// Append exactly as many bytes as the open file had when it was stat'ed.
/// Growth past that size is cut off and a shrunk file is padded with zeros,
/// so the entry always matches its header.
fn append_snapshot<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &Path,
    path: &Path,
    file: File,
) -> Result<(), ArchiveError> {
    let meta = file.metadata().map_err(|e| io_err(path, e))?;
    let size = meta.len();
    let mut header = tar::Header::new_gnu();
    header.set_metadata_in_mode(&meta, tar::HeaderMode::Complete);
    header.set_size(size);

    let mut counted = CountingReader {
        inner: (&file).take(size),
        read: 0,
    };
    let data = (&mut counted).chain(io::repeat(0)).take(size);
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| io_err(path, e))?;

    if counted.read < size {
        tracing::warn!(
            path = %path.display(),
            expected = size,
            read = counted.read,
            "file shrank while archiving; padded with zeros"
        );
    } else if file.metadata().map(|now| now.len() != size).unwrap_or(false) {
        tracing::warn!(path = %path.display(), archived = size, "file grew while archiving; truncated");
    }
    Ok(())
}

struct CountingReader<R> {
    inner: R,
    read: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        Ok(n)
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::NotFound | ErrorKind::PermissionDenied)
}
