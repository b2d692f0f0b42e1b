//! Glob exclusion matching.
//!
//! Patterns are matched against paths relative to the directory being
//! scanned or archived, so one pattern set works for every job.
//! `*` and `?` never cross a `/`; `**` spans any number of directories and
//! `**/name` also matches `name` at the top level.

use std::path::Path;

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::ArchiveError;

/// A compiled set of exclusion patterns.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExcludeSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ArchiveError> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder.add(build_glob(pattern)?);
            kept.push(pattern.to_string());
        }
        let set = builder.build().map_err(|source| ArchiveError::Pattern {
            pattern: kept.join(", "),
            source,
        })?;
        Ok(Self {
            patterns: kept,
            set,
        })
    }

    /// A set that excludes nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `relative` matches any pattern. The root itself (empty path)
    /// is never excluded.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if relative.as_os_str().is_empty() || self.patterns.is_empty() {
            return false;
        }
        self.set.is_match(relative)
    }
}

/// Match a single pattern against a relative path.
pub fn matches(pattern: &str, path: &Path) -> Result<bool, ArchiveError> {
    Ok(build_glob(pattern)?.compile_matcher().is_match(path))
}

fn build_glob(pattern: &str) -> Result<Glob, ArchiveError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|source| ArchiveError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}
