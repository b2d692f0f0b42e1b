//! End-to-end job pipelines: expand → staleness → publish, on real temp trees.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bckp_core::{Compression, DateFormat, Job, JobId, Password};
use bckp_engine::{check, expand, naming, publish, Staleness};
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

fn job(id: &str, source: &Path, dest: &Path) -> Job {
    Job {
        id: JobId::from(id),
        source_dir: source.to_path_buf(),
        dest_dir: dest.to_path_buf(),
        exclude: vec![],
        follow_symlinks: false,
        date_format: DateFormat::default(),
        compression: Compression::None,
        encrypt: false,
        password: None,
        disabled: false,
    }
}

fn write(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}

/// Run one pipeline the way the coordinator does.
fn run(job: &Job) -> Staleness {
    let staleness = check(job, false).expect("check");
    if staleness.needs_backup() {
        publish(job).expect("publish");
    }
    staleness
}

fn tar_names(bytes: &[u8]) -> Vec<String> {
    tar::Archive::new(bytes)
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Scenario 1: first run
// ---------------------------------------------------------------------------

#[test]
fn first_run_publishes_latest_artifact() {
    let tmp = TempDir::new().expect("tmp");
    let etc = tmp.path().join("etc");
    write(&etc.join("hosts"), "127.0.0.1 localhost\n");
    let backup = tmp.path().join("backup");
    let j = job("etc", &etc, &backup);

    assert_eq!(run(&j), Staleness::NoPriorArtifact);
    assert_eq!(listing(&backup), vec!["etc.latest.tar"]);
}

// ---------------------------------------------------------------------------
// Scenario 2: stale source rotates the previous artifact
// ---------------------------------------------------------------------------

#[test]
fn stale_source_rotates_previous_artifact() {
    let tmp = TempDir::new().expect("tmp");
    let etc = tmp.path().join("etc");
    write(&etc.join("hosts"), "v1\n");
    let backup = tmp.path().join("backup");
    let j = job("etc", &etc, &backup);

    run(&j);
    let latest = naming::latest_path(&j);
    let t0 = SystemTime::now() - Duration::from_secs(3 * 24 * 60 * 60);
    set_file_mtime(&latest, FileTime::from_system_time(t0)).unwrap();
    let expected_rotated = naming::rotated_path(&j, t0);
    write(&etc.join("hosts"), "v2\n");

    assert_eq!(run(&j), Staleness::Stale);

    let files = listing(&backup);
    assert_eq!(files.len(), 2, "got: {files:?}");
    assert!(expected_rotated.exists(), "missing {}", expected_rotated.display());
    assert!(latest.exists());
    let fresh_mtime = fs::metadata(&latest).unwrap().modified().unwrap();
    assert!(fresh_mtime > t0);
}

// ---------------------------------------------------------------------------
// Scenario 3: xz + aes
// ---------------------------------------------------------------------------

#[test]
fn xz_encrypted_job_produces_layered_artifact() {
    let tmp = TempDir::new().expect("tmp");
    let etc = tmp.path().join("etc");
    write(&etc.join("shadow"), "root:*:19000:0:99999:7:::\n");
    let backup = tmp.path().join("backup");
    let mut j = job("etc", &etc, &backup);
    j.compression = Compression::Xz;
    j.encrypt = true;
    j.password = Some(Password::new("correct horse"));

    run(&j);

    let files = listing(&backup);
    assert_eq!(files, vec!["etc.latest.tar.xz.aes"]);
    let bytes = fs::read(backup.join(&files[0])).unwrap();
    assert_eq!(&bytes[..3], b"AES", "encryption must be the outermost layer");
    // xz magic would only be visible if compression ran after encryption.
    assert!(!bytes.windows(6).any(|w| w == b"\xfd7zXZ\x00"));
}

// ---------------------------------------------------------------------------
// Scenario 4: wildcard
// ---------------------------------------------------------------------------

#[test]
fn wildcard_job_publishes_each_subdirectory() {
    let tmp = TempDir::new().expect("tmp");
    let data = tmp.path().join("data");
    write(&data.join("a/one.txt"), "1");
    write(&data.join("b/two.txt"), "2");
    let backup = tmp.path().join("backup");
    let j = job("data", &data.join("*"), &backup);

    let mut concrete = expand(&j).expect("expand");
    concrete.sort_by(|x, y| x.id.cmp(&y.id));
    let ids: Vec<String> = concrete.iter().map(|c| c.id.to_string()).collect();
    assert_eq!(ids, vec!["data/a", "data/b"]);

    for c in &concrete {
        assert_eq!(run(c), Staleness::NoPriorArtifact);
    }
    assert_eq!(
        listing(&backup.join("data")),
        vec!["a.latest.tar", "b.latest.tar"]
    );
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn second_run_without_changes_is_fresh() {
    let tmp = TempDir::new().expect("tmp");
    let etc = tmp.path().join("etc");
    write(&etc.join("hosts"), "x");
    set_file_mtime(etc.join("hosts"), FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    let j = job("etc", &etc, &tmp.path().join("backup"));

    assert_eq!(run(&j), Staleness::NoPriorArtifact);
    let before = fs::metadata(naming::latest_path(&j)).unwrap().modified().unwrap();
    assert_eq!(run(&j), Staleness::Fresh);
    let after = fs::metadata(naming::latest_path(&j)).unwrap().modified().unwrap();
    assert_eq!(before, after, "fresh job must not republish");
}

#[test]
fn excluded_files_never_reach_the_archive() {
    let tmp = TempDir::new().expect("tmp");
    let site = tmp.path().join("site");
    write(&site.join("index.html"), "<html/>");
    write(&site.join("logs/access.log"), "GET /");
    write(&site.join("node_modules/x/index.js"), "module");
    write(&site.join("deep/a/b/cache.tmp"), "tmp");
    let mut j = job("site", &site, &tmp.path().join("backup"));
    j.exclude = vec!["logs".into(), "**/node_modules".into(), "**/*.tmp".into()];
    j.compression = Compression::Gz;

    let info = publish(&j).expect("publish");
    let mut plain = Vec::new();
    flate2::read::GzDecoder::new(File::open(&info.path).unwrap())
        .read_to_end(&mut plain)
        .unwrap();
    let names = tar_names(&plain);

    assert!(names.iter().any(|n| n == "site/index.html"), "got: {names:?}");
    for banned in ["logs", "node_modules", "cache.tmp"] {
        assert!(!names.iter().any(|n| n.contains(banned)), "{banned} in {names:?}");
    }
}

#[cfg(unix)]
#[test]
fn symlink_cycle_is_scanned_and_archived_once() {
    let tmp = TempDir::new().expect("tmp");
    let a = tmp.path().join("root/a");
    let b = tmp.path().join("root/b");
    write(&a.join("fa"), "a");
    write(&b.join("fb"), "b");
    std::os::unix::fs::symlink(&b, a.join("to_b")).unwrap();
    std::os::unix::fs::symlink(&a, b.join("to_a")).unwrap();

    let mut j = job("root", &tmp.path().join("root"), &tmp.path().join("backup"));
    j.follow_symlinks = true;

    assert_eq!(check(&j, false).expect("check"), Staleness::NoPriorArtifact);
    let info = publish(&j).expect("publish");
    let names = tar_names(&fs::read(&info.path).unwrap());
    let fb_copies = names.iter().filter(|n| n.ends_with("/fb")).count();
    let fa_copies = names.iter().filter(|n| n.ends_with("/fa")).count();
    assert!(fb_copies <= 2 && fa_copies <= 2, "got: {names:?}");
    assert!(names.len() < 20, "cycle was not cut: {names:?}");
}

#[test]
fn concurrent_jobs_share_a_destination() {
    let tmp = TempDir::new().expect("tmp");
    let backup: PathBuf = tmp.path().join("shared/backup");
    let jobs: Vec<Job> = (0..8)
        .map(|i| {
            let src = tmp.path().join(format!("src{i}"));
            write(&src.join("f"), "x");
            job(&format!("job{i}"), &src, &backup)
        })
        .collect();

    std::thread::scope(|scope| {
        for j in &jobs {
            scope.spawn(move || publish(j).expect("publish"));
        }
    });
    assert_eq!(listing(&backup).len(), 8);
}
