//! YAML configuration: loading, merging and validation.
//!
//! # File layout
//!
//! ```yaml
//! datefmt: YYYYMMDD        # rotation date format
//! concurrency: 4           # parallel jobs (default: cores - 1)
//! dest: /opt/backup        # default destination
//! compress: none           # default compression: none | gz | br | xz
//! symlinks: false          # default follow-symlinks flag
//! password: secret         # shared AES password
//! exclude: ["**/.git"]     # global exclusions
//! jobs:
//!   - id: etc
//!     dir: /etc
//!     compress: xz
//!     encrypt: true        # or the password itself
//!   - id: www
//!     dir: /var/www/*      # one archive per subdirectory
//!     exclude: ["**/logs"]
//! ```
//!
//! # API pattern
//!
//! Functions come in two forms:
//! - `fn_at(path: &Path, …)` — explicit config path; used in tests with `TempDir`
//! - `fn(…)` — derives the path from `dirs::config_dir()`, delegates to `_at`
//!
//! [`resolve`] turns the sparse file model into fully-populated [`Job`]s; no
//! later stage looks at optional fields again.

use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::datefmt::{DateFormat, DEFAULT_DATE_FORMAT};
use crate::error::{io_err, ConfigError};
use crate::types::{Compression, Job, JobId, Password};

/// Environment variable consulted for the AES password.
pub const PASSWORD_ENV: &str = "BCKP_PASSWORD";

// ---------------------------------------------------------------------------
// 1. File model
// ---------------------------------------------------------------------------

/// Root of the YAML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datefmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<Compression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlinks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default, alias = "src")]
    pub jobs: Vec<JobSpec>,
}

/// One job entry as written in the file. Every field except `id` and `dir`
/// falls back to the global value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<Compression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<EncryptSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlinks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datefmt: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// `encrypt: true` or `encrypt: "the password"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncryptSpec {
    Enabled(bool),
    Password(String),
}

// ---------------------------------------------------------------------------
// 2. Resolved model
// ---------------------------------------------------------------------------

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub concurrency: Option<usize>,
    pub force: bool,
}

/// Run-wide settings after merging file and command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub concurrency: usize,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub settings: RunSettings,
    pub jobs: Vec<Job>,
}

/// `max(1, cores - 1)`.
pub fn default_concurrency() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// `<config_dir>/bckp/config.yaml` — pure, no I/O.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(dir.join("bckp").join("config.yaml"))
}

/// Load a configuration file.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `load_at` convenience wrapper for the default config path.
pub fn load() -> Result<ConfigFile, ConfigError> {
    load_at(&default_path()?)
}

/// Load and resolve in one step. Relative paths in the file are resolved
/// against the file's own directory.
pub fn resolve_at(path: &Path, overrides: &Overrides) -> Result<ResolvedConfig, ConfigError> {
    let file = load_at(path)?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let base = std::fs::canonicalize(&base).map_err(|e| io_err(&base, e))?;
    resolve(&file, &base, overrides)
}

// ---------------------------------------------------------------------------
// 4. Resolve
// ---------------------------------------------------------------------------

/// Merge per-job values over global defaults and validate every job.
///
/// Passwords given in the file (per job, then shared) are attached here;
/// environment and prompt fallbacks are applied by [`resolve_passwords`].
pub fn resolve(
    file: &ConfigFile,
    base_dir: &Path,
    overrides: &Overrides,
) -> Result<ResolvedConfig, ConfigError> {
    let global_format = match file.datefmt.as_deref() {
        Some(raw) => DateFormat::parse(raw)?,
        None => DateFormat::parse(DEFAULT_DATE_FORMAT)?,
    };

    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(file.jobs.len());
    for (index, spec) in file.jobs.iter().enumerate() {
        let job = resolve_job(file, spec, index, base_dir, &global_format)?;
        if !seen.insert(job.id.clone()) {
            return Err(ConfigError::DuplicateJobId { id: job.id.0 });
        }
        jobs.push(job);
    }

    let concurrency = overrides
        .concurrency
        .or(file.concurrency)
        .unwrap_or_else(default_concurrency)
        .max(1);

    tracing::debug!(jobs = jobs.len(), concurrency, "configuration resolved");
    Ok(ResolvedConfig {
        settings: RunSettings {
            concurrency,
            force: overrides.force,
        },
        jobs,
    })
}

fn resolve_job(
    file: &ConfigFile,
    spec: &JobSpec,
    index: usize,
    base_dir: &Path,
    global_format: &DateFormat,
) -> Result<Job, ConfigError> {
    let id = spec
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            job: format!("#{}", index + 1),
            field: "id",
        })?;
    validate_id(id)?;
    let label = format!("'{id}'");

    let dir = non_empty_path(spec.dir.as_deref()).ok_or_else(|| ConfigError::MissingField {
        job: label.clone(),
        field: "dir",
    })?;
    let source_dir = absolutize(base_dir, dir);
    validate_wildcard(&label, &source_dir)?;

    let dest = non_empty_path(spec.dest.as_deref())
        .or_else(|| non_empty_path(file.dest.as_deref()))
        .ok_or_else(|| ConfigError::MissingField {
            job: label.clone(),
            field: "dest",
        })?;
    let dest_dir = absolutize(base_dir, dest);

    let (encrypt, inline_password) = match &spec.encrypt {
        None | Some(EncryptSpec::Enabled(false)) => (false, None),
        Some(EncryptSpec::Enabled(true)) => (true, None),
        Some(EncryptSpec::Password(secret)) if secret.is_empty() => (false, None),
        Some(EncryptSpec::Password(secret)) => (true, Some(secret.clone())),
    };
    let password = if encrypt {
        spec.password
            .clone()
            .or(inline_password)
            .or_else(|| file.password.clone())
            .filter(|secret| !secret.is_empty())
            .map(Password::new)
    } else {
        None
    };

    let date_format = match spec.datefmt.as_deref() {
        Some(raw) => DateFormat::parse(raw)?,
        None => global_format.clone(),
    };

    Ok(Job {
        id: JobId::from(id),
        source_dir,
        dest_dir,
        exclude: merge_excludes(&file.exclude, &spec.exclude),
        follow_symlinks: spec.symlinks.or(file.symlinks).unwrap_or(false),
        date_format,
        compression: spec.compress.or(file.compress).unwrap_or_default(),
        encrypt,
        password,
        disabled: spec.disabled,
    })
}

fn non_empty_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn absolutize(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Ids become artifact file names below `dest`; `/` nests them in
/// subdirectories but every segment must be a plain name.
fn validate_id(id: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &'static str| ConfigError::InvalidJobId {
        id: id.to_string(),
        reason,
    };
    if id.starts_with(JobId::SEPARATOR) {
        return Err(invalid("must not start with `/`"));
    }
    for segment in id.split(JobId::SEPARATOR) {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("`.` and `..` segments are not allowed")),
            _ if segment.contains('\\') => return Err(invalid("`\\` is not allowed")),
            _ => {}
        }
    }
    Ok(())
}

fn validate_wildcard(label: &str, dir: &Path) -> Result<(), ConfigError> {
    let components: Vec<_> = dir.components().collect();
    let Some((last, parents)) = components.split_last() else {
        return Ok(());
    };
    let has_star = |c: &Component<'_>| c.as_os_str().to_string_lossy().contains('*');
    let bad_last = has_star(last) && last.as_os_str() != Job::WILDCARD;
    if bad_last || parents.iter().any(has_star) {
        return Err(ConfigError::InvalidWildcard {
            job: label.to_string(),
            dir: dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Global then per-job patterns, first occurrence wins.
fn merge_excludes(global: &[String], local: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(global.len() + local.len());
    for pattern in global.iter().chain(local) {
        if pattern.trim().is_empty() || merged.contains(pattern) {
            continue;
        }
        merged.push(pattern.clone());
    }
    merged
}

// ---------------------------------------------------------------------------
// 5. Passwords
// ---------------------------------------------------------------------------

/// Interactive fallback for encrypted jobs without a configured password.
pub trait PasswordPrompt {
    fn prompt(&mut self, message: &str) -> io::Result<String>;
}

impl<F> PasswordPrompt for F
where
    F: FnMut(&str) -> io::Result<String>,
{
    fn prompt(&mut self, message: &str) -> io::Result<String> {
        self(message)
    }
}

/// Prompt that never answers; encrypted jobs without a password fail.
pub struct NoPrompt;

impl PasswordPrompt for NoPrompt {
    fn prompt(&mut self, _message: &str) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no interactive prompt available",
        ))
    }
}

/// Read [`PASSWORD_ENV`], ignoring empty values.
pub fn env_password() -> Option<String> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|secret| !secret.is_empty())
}

/// Fill in passwords for encrypted jobs that did not get one from the file.
///
/// Fallback order: `env` (usually [`env_password`]), then `prompt`. The
/// prompt is asked at most once per call; its answer is shared by all jobs.
/// Runs before dispatch, never inside a worker.
pub fn resolve_passwords(
    jobs: &mut [Job],
    env: Option<String>,
    prompt: &mut dyn PasswordPrompt,
) -> Result<(), ConfigError> {
    let mut fallback = env.filter(|secret| !secret.is_empty()).map(Password::new);

    for job in jobs.iter_mut().filter(|job| job.encrypt && !job.disabled) {
        if job.password.as_ref().is_some_and(|p| !p.is_empty()) {
            continue;
        }
        if fallback.is_none() {
            let answer = prompt
                .prompt(&format!("Password for encrypted backups (job '{}'): ", job.id))
                .map_err(|err| match err.kind() {
                    io::ErrorKind::NotFound => ConfigError::MissingPassword {
                        job: job.id.0.clone(),
                    },
                    _ => ConfigError::Prompt(err),
                })?;
            if answer.is_empty() {
                return Err(ConfigError::MissingPassword {
                    job: job.id.0.clone(),
                });
            }
            fallback = Some(Password::new(answer));
        }
        job.password = fallback.clone();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 6. Sample config
// ---------------------------------------------------------------------------

/// Commented starting point written by `bckp init`.
pub const SAMPLE_CONFIG: &str = r#"# bckp configuration
datefmt: YYYYMMDD        # date format for rotated archives
concurrency: 4           # concurrent backups (default: cores - 1)
dest: /opt/backup        # default destination directory
compress: none           # default compression: none | gz | br | xz
exclude:                 # global exclude list
  - "**/.git"
  - "**/node_modules"
  - "**/*.tmp"
  - "**/*~"
  - "**/.DS_Store"
jobs:
  - id: etc              # identifier -> <id>.latest.tar[.<compress>][.aes]
    dir: /etc            # one archive
    compress: xz
    encrypt: true        # password from `password:`, $BCKP_PASSWORD or prompt
  - id: www
    dir: /var/www/*      # separate archives per subdirectory
    compress: gz
    exclude:             # per-job exclude list
      - "**/*_OLD"
      - "**/.htpasswd"
      - "**/logs"
"#;

/// Write [`SAMPLE_CONFIG`] to `path`.
///
/// Write flow: `.yaml.tmp` sibling → `chmod 0600` → `rename`. Refuses to
/// replace an existing file unless `overwrite` is set.
pub fn write_sample_at(path: &Path, overwrite: bool) -> Result<(), ConfigError> {
    if path.exists() && !overwrite {
        return Err(io_err(
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "config already exists"),
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, SAMPLE_CONFIG).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        io_err(path, e)
    })
}

/// `write_sample_at` convenience wrapper for the default config path.
pub fn write_sample(overwrite: bool) -> Result<PathBuf, ConfigError> {
    let path = default_path()?;
    write_sample_at(&path, overwrite)?;
    Ok(path)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> ConfigFile {
        serde_yaml::from_str(yaml).expect("parse config")
    }

    fn resolve_yaml(yaml: &str) -> Result<ResolvedConfig, ConfigError> {
        resolve(&parse(yaml), Path::new("/base"), &Overrides::default())
    }

    #[test]
    fn per_job_values_override_globals() {
        let resolved = resolve_yaml(
            r#"
dest: /backup
compress: gz
symlinks: true
datefmt: YYYY-MM
jobs:
  - id: etc
    dir: /etc
  - id: www
    dir: /var/www
    dest: /other
    compress: xz
    symlinks: false
    datefmt: YYYYMMDD
"#,
        )
        .expect("resolve");

        let etc = &resolved.jobs[0];
        assert_eq!(etc.dest_dir, PathBuf::from("/backup"));
        assert_eq!(etc.compression, Compression::Gz);
        assert!(etc.follow_symlinks);
        assert_eq!(etc.date_format.as_str(), "YYYY-MM");

        let www = &resolved.jobs[1];
        assert_eq!(www.dest_dir, PathBuf::from("/other"));
        assert_eq!(www.compression, Compression::Xz);
        assert!(!www.follow_symlinks);
        assert_eq!(www.date_format.as_str(), "YYYYMMDD");
    }

    #[test]
    fn excludes_merge_global_first_without_duplicates() {
        let resolved = resolve_yaml(
            r#"
dest: /backup
exclude: ["**/.git", "**/*.tmp"]
jobs:
  - id: etc
    dir: /etc
    exclude: ["**/*.tmp", "**/logs", "**/logs"]
"#,
        )
        .expect("resolve");
        assert_eq!(
            resolved.jobs[0].exclude,
            vec!["**/.git", "**/*.tmp", "**/logs"]
        );
    }

    #[test]
    fn relative_paths_resolve_against_base_dir() {
        let resolved = resolve_yaml(
            r#"
dest: backups
jobs:
  - id: data
    dir: data/*
"#,
        )
        .expect("resolve");
        assert_eq!(resolved.jobs[0].dest_dir, PathBuf::from("/base/backups"));
        assert_eq!(resolved.jobs[0].source_dir, PathBuf::from("/base/data/*"));
        assert!(resolved.jobs[0].is_wildcard());
    }

    #[test]
    fn missing_id_dir_and_dest_are_reported() {
        let err = resolve_yaml("dest: /b\njobs:\n  - dir: /etc\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingField { field: "id", .. }),
            "got: {err}"
        );

        let err = resolve_yaml("dest: /b\njobs:\n  - id: etc\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingField { field: "dir", .. }),
            "got: {err}"
        );

        let err = resolve_yaml("jobs:\n  - id: etc\n    dir: /etc\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingField { field: "dest", .. }),
            "got: {err}"
        );
        assert!(err.to_string().contains("'etc'"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = resolve_yaml(
            "dest: /b\njobs:\n  - id: etc\n    dir: /etc\n  - id: etc\n    dir: /srv\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateJobId { .. }), "got: {err}");
    }

    #[test]
    fn ids_cannot_escape_the_destination() {
        for id in ["../x", "a/../../x", "/etc/x", "a//b", "./a", "a\\\\b"] {
            let yaml = format!("dest: /b\njobs:\n  - id: \"{id}\"\n    dir: /etc\n");
            let err = resolve_yaml(&yaml).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidJobId { .. }), "{id}: got {err}");
        }

        let ok = resolve_yaml("dest: /b\njobs:\n  - id: hosts/web-1\n    dir: /etc\n")
            .expect("nested id");
        assert_eq!(ok.jobs[0].id, JobId::from("hosts/web-1"));
    }

    #[test]
    fn only_trailing_wildcards_are_accepted() {
        let err = resolve_yaml("dest: /b\njobs:\n  - id: x\n    dir: /srv/*/data\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWildcard { .. }), "got: {err}");

        let err = resolve_yaml("dest: /b\njobs:\n  - id: x\n    dir: /srv/site*\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWildcard { .. }), "got: {err}");
    }

    #[test]
    fn encrypt_accepts_flag_or_inline_password() {
        let resolved = resolve_yaml(
            r#"
dest: /b
password: shared
jobs:
  - id: flag
    dir: /a
    encrypt: true
  - id: inline
    dir: /b
    encrypt: inline-secret
  - id: explicit
    dir: /c
    encrypt: true
    password: explicit-secret
  - id: plain
    dir: /d
"#,
        )
        .expect("resolve");
        let secret = |i: usize| {
            resolved.jobs[i]
                .password
                .as_ref()
                .map(|p| p.expose().to_string())
        };
        assert_eq!(secret(0).as_deref(), Some("shared"));
        assert_eq!(secret(1).as_deref(), Some("inline-secret"));
        assert_eq!(secret(2).as_deref(), Some("explicit-secret"));
        assert!(!resolved.jobs[3].encrypt);
        assert_eq!(secret(3), None);
    }

    #[test]
    fn concurrency_prefers_override_and_is_at_least_one() {
        let file = parse("concurrency: 3\n");
        let resolved = resolve(&file, Path::new("/"), &Overrides::default()).expect("resolve");
        assert_eq!(resolved.settings.concurrency, 3);

        let overrides = Overrides {
            concurrency: Some(0),
            force: true,
        };
        let resolved = resolve(&file, Path::new("/"), &overrides).expect("resolve");
        assert_eq!(resolved.settings.concurrency, 1);
        assert!(resolved.settings.force);

        let resolved = resolve(&parse("{}"), Path::new("/"), &Overrides::default()).expect("resolve");
        assert_eq!(resolved.settings.concurrency, default_concurrency());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_yaml::from_str::<ConfigFile>("jobz: []\n").unwrap_err();
        assert!(err.to_string().contains("jobz"));
    }

    #[test]
    fn src_alias_is_accepted_for_jobs() {
        let file = parse("src:\n  - id: etc\n    dir: /etc\n");
        assert_eq!(file.jobs.len(), 1);
    }

    #[test]
    fn sample_config_resolves() {
        let resolved = resolve(&parse(SAMPLE_CONFIG), Path::new("/"), &Overrides::default())
            .expect("sample resolves");
        assert_eq!(resolved.jobs.len(), 2);
        assert!(resolved.jobs[0].encrypt);
        assert!(resolved.jobs[1].is_wildcard());
    }
}
