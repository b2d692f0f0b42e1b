//! Tree scanner: newest modification time under a directory, and the
//! immediate subdirectories used for wildcard expansion.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bckp_archive::{EntryKind, ExcludeSet, TreeWalk};

use crate::error::{scan_err, EngineError};

/// Newest mtime over every non-excluded regular file below `root`.
///
/// Returns `None` when there are no such files. Only an unreadable `root`
/// is an error; entries that fail to stat mid-walk are ignored.
pub fn newest_mtime(
    root: &Path,
    excludes: &ExcludeSet,
    follow_symlinks: bool,
) -> Result<Option<SystemTime>, EngineError> {
    let walk = TreeWalk::new(root, follow_symlinks, |rel: &Path| !excludes.is_excluded(rel))
        .map_err(scan_err)?;

    let mut newest: Option<SystemTime> = None;
    let mut files = 0u64;
    for entry in walk.filter(|e| e.kind == EntryKind::File) {
        files += 1;
        let Ok(mtime) = entry.metadata.modified() else {
            continue;
        };
        if newest.map_or(true, |current| mtime > current) {
            newest = Some(mtime);
        }
    }
    tracing::debug!(root = %root.display(), files, "scanned tree");
    Ok(newest)
}

/// Immediate subdirectories of `dir`, sorted by path.
///
/// Symlinks to directories count. Exclusions are matched against the entry
/// name only.
pub fn subdirectories(dir: &Path, excludes: &ExcludeSet) -> Result<Vec<PathBuf>, EngineError> {
    let entries = fs::read_dir(dir).map_err(|source| EngineError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        if excludes.is_excluded(Path::new(&name)) {
            continue;
        }
        let path = entry.path();
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => dirs.push(path),
            _ => {}
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn touch(path: &Path, secs: i64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
        set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn finds_newest_file_at_any_depth() {
        let dir = TempDir::new().expect("tmp");
        touch(&dir.path().join("a"), 1_000);
        touch(&dir.path().join("x/y/z/deep"), 5_000);
        touch(&dir.path().join("x/b"), 3_000);

        let newest = newest_mtime(dir.path(), &ExcludeSet::empty(), false).expect("scan");
        assert_eq!(newest, Some(at(5_000)));
    }

    #[test]
    fn empty_tree_has_no_newest() {
        let dir = TempDir::new().expect("tmp");
        fs::create_dir(dir.path().join("empty")).unwrap();
        assert_eq!(
            newest_mtime(dir.path(), &ExcludeSet::empty(), false).expect("scan"),
            None
        );
    }

    #[test]
    fn excluded_files_and_directories_do_not_count() {
        let dir = TempDir::new().expect("tmp");
        touch(&dir.path().join("keep"), 1_000);
        touch(&dir.path().join("node_modules/pkg/index.js"), 9_000);
        touch(&dir.path().join("scratch.tmp"), 8_000);

        let excludes = ExcludeSet::new(&["**/node_modules", "**/*.tmp"]).unwrap();
        let newest = newest_mtime(dir.path(), &excludes, false).expect("scan");
        assert_eq!(newest, Some(at(1_000)));
    }

    #[test]
    fn unreadable_root_is_a_scan_error() {
        let dir = TempDir::new().expect("tmp");
        let err = newest_mtime(&dir.path().join("missing"), &ExcludeSet::empty(), false)
            .unwrap_err();
        assert!(matches!(err, EngineError::Scan { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_ignored_unless_followed() {
        let dir = TempDir::new().expect("tmp");
        let outside = dir.path().join("outside");
        let root = dir.path().join("root");
        touch(&outside.join("new"), 9_000);
        touch(&root.join("old"), 1_000);
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let plain = newest_mtime(&root, &ExcludeSet::empty(), false).expect("scan");
        assert_eq!(plain, Some(at(1_000)));

        let followed = newest_mtime(&root, &ExcludeSet::empty(), true).expect("scan");
        assert_eq!(followed, Some(at(9_000)));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_terminates() {
        let dir = TempDir::new().expect("tmp");
        let root = dir.path().join("root");
        touch(&root.join("a/file"), 2_000);
        std::os::unix::fs::symlink(&root, root.join("a/loop")).unwrap();
        std::os::unix::fs::symlink(root.join("a"), root.join("a/self")).unwrap();

        let newest = newest_mtime(&root, &ExcludeSet::empty(), true).expect("scan");
        assert_eq!(newest, Some(at(2_000)));
    }

    #[cfg(unix)]
    #[test]
    fn excludes_apply_to_logical_path_through_link() {
        let dir = TempDir::new().expect("tmp");
        let outside = dir.path().join("outside");
        let root = dir.path().join("root");
        touch(&outside.join("cache/blob"), 9_000);
        touch(&root.join("keep"), 1_000);
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let excludes = ExcludeSet::new(&["link/cache"]).unwrap();
        let newest = newest_mtime(&root, &excludes, true).expect("scan");
        assert_eq!(newest, Some(at(1_000)));
    }

    #[test]
    fn subdirectories_lists_one_level_and_honours_excludes() {
        let dir = TempDir::new().expect("tmp");
        fs::create_dir_all(dir.path().join("a/nested")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("file"), "x").unwrap();

        let excludes = ExcludeSet::new(&[".git"]).unwrap();
        let subdirs = subdirectories(dir.path(), &excludes).expect("list");
        assert_eq!(subdirs, vec![dir.path().join("a"), dir.path().join("b")]);
    }

    #[cfg(unix)]
    #[test]
    fn subdirectories_include_links_to_directories() {
        let dir = TempDir::new().expect("tmp");
        let target = TempDir::new().expect("target");
        std::os::unix::fs::symlink(target.path(), dir.path().join("linked")).unwrap();

        let subdirs = subdirectories(dir.path(), &ExcludeSet::empty()).expect("list");
        assert_eq!(subdirs, vec![dir.path().join("linked")]);
    }
}
