//! Domain types for bckp jobs and their outcomes.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Everything a worker receives or returns is serde-serializable so it can
//! cross the worker process boundary as JSON.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::datefmt::DateFormat;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed job identifier. Expanded wildcard jobs carry a
/// hierarchical suffix (`www/site-a`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Separator between a wildcard job id and the subdirectory name.
    pub const SEPARATOR: char = '/';

    /// Id of a job expanded from this one for the subdirectory `name`.
    pub fn child(&self, name: &str) -> JobId {
        JobId(format!("{}{}{}", self.0, Self::SEPARATOR, name))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Secret used for AES encryption. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Compression applied to the tar stream before (optional) encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    #[serde(alias = "gzip")]
    Gz,
    #[serde(alias = "brotli")]
    Br,
    #[serde(alias = "lzma", alias = "lzma-xz")]
    Xz,
}

impl Compression {
    /// File suffix appended after `.tar`, if any.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gz => Some("gz"),
            Compression::Br => Some("br"),
            Compression::Xz => Some("xz"),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix().unwrap_or("none"))
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A fully-resolved backup job. Built once by [`crate::config::resolve`];
/// immutable once handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Absolute source directory. A trailing `*` component marks a wildcard
    /// job ("each immediate subdirectory").
    pub source_dir: PathBuf,
    /// Absolute destination directory for artifacts.
    pub dest_dir: PathBuf,
    /// Global and per-job exclusion globs, duplicates removed.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    pub date_format: DateFormat,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Password>,
    #[serde(default)]
    pub disabled: bool,
}

impl Job {
    /// Marker component for wildcard source directories.
    pub const WILDCARD: &'static str = "*";

    /// `true` when `source_dir` ends with `/*`.
    pub fn is_wildcard(&self) -> bool {
        self.source_dir
            .file_name()
            .map(|name| name == Self::WILDCARD)
            .unwrap_or(false)
    }

    /// Directory whose children a wildcard job expands to.
    pub fn wildcard_parent(&self) -> Option<&Path> {
        if self.is_wildcard() {
            self.source_dir.parent()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Informational description of a freshly published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    /// Final ("latest") path of the artifact.
    pub path: PathBuf,
    /// Where the previous latest artifact was rotated to, if one existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotated: Option<PathBuf>,
    pub size: u64,
    pub elapsed_ms: u64,
}

/// Result of one job in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Source unchanged since the latest artifact.
    Skipped,
    Succeeded { artifact: ArtifactInfo },
    Failed { error: String },
    /// Never started because the run was interrupted.
    Interrupted,
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. } | JobOutcome::Interrupted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn job(source: &str) -> Job {
        Job {
            id: JobId::from("www"),
            source_dir: PathBuf::from(source),
            dest_dir: PathBuf::from("/backup"),
            exclude: vec![],
            follow_symlinks: false,
            date_format: DateFormat::default(),
            compression: Compression::None,
            encrypt: false,
            password: None,
            disabled: false,
        }
    }

    #[test]
    fn child_id_uses_separator() {
        assert_eq!(JobId::from("www").child("site").to_string(), "www/site");
    }

    #[test]
    fn wildcard_detection() {
        assert!(job("/var/www/*").is_wildcard());
        assert_eq!(
            job("/var/www/*").wildcard_parent(),
            Some(Path::new("/var/www"))
        );
        assert!(!job("/var/www").is_wildcard());
        assert!(!job("/var/www*").is_wildcard());
        assert_eq!(job("/var/www").wildcard_parent(), None);
    }

    #[test]
    fn compression_suffixes() {
        assert_eq!(Compression::None.suffix(), None);
        assert_eq!(Compression::Gz.suffix(), Some("gz"));
        assert_eq!(Compression::Br.suffix(), Some("br"));
        assert_eq!(Compression::Xz.suffix(), Some("xz"));
        assert_eq!(Compression::Xz.to_string(), "xz");
        assert_eq!(Compression::None.to_string(), "none");
    }

    #[test]
    fn compression_accepts_long_aliases() {
        let parsed: Vec<Compression> =
            serde_yaml::from_str("[gz, gzip, brotli, lzma-xz, none]").expect("parse");
        assert_eq!(
            parsed,
            vec![
                Compression::Gz,
                Compression::Gz,
                Compression::Br,
                Compression::Xz,
                Compression::None
            ]
        );
    }

    #[test]
    fn password_debug_is_redacted() {
        let secret = Password::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Password(***)");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn outcome_failure_classification() {
        assert!(!JobOutcome::Skipped.is_failure());
        assert!(JobOutcome::Interrupted.is_failure());
        assert!(JobOutcome::Failed {
            error: "boom".into()
        }
        .is_failure());
    }
}
