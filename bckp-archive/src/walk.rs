//! Depth-first directory walk shared by the staleness scan and the archive
//! builder, so both see exactly the same set of entries.
//!
//! - Entries are visited in name order, parents before children.
//! - `filter` receives the path relative to the root; a rejected directory
//!   is pruned and never read.
//! - Without `follow_symlinks` a symlink is yielded as [`EntryKind::Symlink`]
//!   and never dereferenced. With it, the link is resolved to its real path
//!   and recorded in a seen-set seeded with the root; a link whose target was
//!   already seen is dropped, which cuts cycles.
//! - Only an unreadable root is an error. Entries that vanish or cannot be
//!   stat'ed or read mid-walk are skipped.

use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use crate::error::{io_err, ArchiveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// An unfollowed symbolic link.
    Symlink,
    /// Sockets, FIFOs, devices.
    Other,
}

#[derive(Debug)]
pub struct Entry {
    /// Filesystem path, possibly running through followed links.
    pub path: PathBuf,
    /// Logical path relative to the walk root.
    pub relative: PathBuf,
    pub kind: EntryKind,
    /// Metadata of the entry, or of the link target when following.
    pub metadata: Metadata,
}

/// Iterator over the entries below a root (the root itself is not yielded).
pub struct TreeWalk<F> {
    stack: Vec<(PathBuf, PathBuf)>,
    seen: HashSet<PathBuf>,
    follow_symlinks: bool,
    filter: F,
}

impl<F: FnMut(&Path) -> bool> TreeWalk<F> {
    /// Start a walk. Fails only if `root` itself cannot be read.
    pub fn new(root: &Path, follow_symlinks: bool, filter: F) -> Result<Self, ArchiveError> {
        let entries = read_sorted(root).map_err(|e| io_err(root, e))?;

        let mut seen = HashSet::new();
        if follow_symlinks {
            if let Ok(real) = fs::canonicalize(root) {
                seen.insert(real);
            }
        }

        let mut walk = Self {
            stack: Vec::new(),
            seen,
            follow_symlinks,
            filter,
        };
        walk.push_children(entries, Path::new(""));
        Ok(walk)
    }

    fn push_children(&mut self, children: Vec<(std::ffi::OsString, PathBuf)>, relative: &Path) {
        // Reverse so that popping yields name order.
        for (name, path) in children.into_iter().rev() {
            self.stack.push((path, relative.join(name)));
        }
    }

    fn descend(&mut self, path: &Path, relative: &Path) {
        match read_sorted(path) {
            Ok(children) => self.push_children(children, relative),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable directory");
            }
        }
    }

    fn resolve(&mut self, path: &Path) -> Option<(EntryKind, Metadata)> {
        let meta = fs::symlink_metadata(path).ok()?;
        let ty = meta.file_type();
        if !ty.is_symlink() {
            return Some((kind_of(&meta), meta));
        }
        if !self.follow_symlinks {
            return Some((EntryKind::Symlink, meta));
        }

        let real = match fs::canonicalize(path) {
            Ok(real) => real,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "skipping dangling symlink");
                return None;
            }
        };
        if !self.seen.insert(real.clone()) {
            tracing::debug!(path = %path.display(), target = %real.display(), "symlink target already visited");
            return None;
        }
        let target = fs::metadata(&real).ok()?;
        Some((kind_of(&target), target))
    }
}

impl<F: FnMut(&Path) -> bool> Iterator for TreeWalk<F> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        while let Some((path, relative)) = self.stack.pop() {
            if !(self.filter)(&relative) {
                continue;
            }
            let Some((kind, metadata)) = self.resolve(&path) else {
                continue;
            };
            if kind == EntryKind::Dir {
                self.descend(&path, &relative);
            }
            return Some(Entry {
                path,
                relative,
                kind,
                metadata,
            });
        }
        None
    }
}

fn kind_of(meta: &Metadata) -> EntryKind {
    let ty = meta.file_type();
    if ty.is_file() {
        EntryKind::File
    } else if ty.is_dir() {
        EntryKind::Dir
    } else if ty.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::Other
    }
}

fn read_sorted(dir: &Path) -> std::io::Result<Vec<(std::ffi::OsString, PathBuf)>> {
    let mut children: Vec<_> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| (entry.file_name(), entry.path()))
        .collect();
    children.sort();
    Ok(children)
}
