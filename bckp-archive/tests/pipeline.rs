//! Tree → tar → compression on a real file, read back with the matching decoders.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use bckp_archive::{archive_extension, build_archive, writer_chain, ExcludeSet};
use bckp_core::Compression;
use rstest::rstest;
use tempfile::TempDir;

fn source_tree() -> TempDir {
    let dir = TempDir::new().expect("tmp");
    let root = dir.path().join("site");
    for (file, body) in [
        ("index.html", "<h1>hi</h1>"),
        ("logs/access.log", "GET /"),
        ("assets/app.js", "console.log(1)"),
        ("assets/app.js~", "backup"),
    ] {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }
    dir
}

fn entry_names(reader: impl Read) -> Vec<String> {
    let mut archive = tar::Archive::new(reader);
    let mut names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn decoder(compression: Compression, file: File) -> Box<dyn Read> {
    match compression {
        Compression::None => Box::new(file),
        Compression::Gz => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::Br => Box::new(brotli::Decompressor::new(file, 4096)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
    }
}

#[rstest]
#[case::plain(Compression::None)]
#[case::gzip(Compression::Gz)]
#[case::brotli(Compression::Br)]
#[case::xz(Compression::Xz)]
fn excluded_entries_never_reach_the_artifact(#[case] compression: Compression) {
    let src = source_tree();
    let out = TempDir::new().expect("tmp");
    let artifact = out
        .path()
        .join(format!("site.latest.{}", archive_extension(compression, false)));

    let excludes = ExcludeSet::new(&["**/logs", "**/*~"]).unwrap();
    let chain = writer_chain(File::create(&artifact).unwrap(), compression, None).unwrap();
    let (chain, stats) = build_archive(
        &src.path().join("site"),
        |rel: &Path| !excludes.is_excluded(rel),
        false,
        chain,
    )
    .unwrap();
    chain.finish().unwrap();

    assert_eq!(stats.files, 2);
    let names = entry_names(decoder(compression, File::open(&artifact).unwrap()));
    assert!(names.contains(&"site/index.html".to_string()), "got: {names:?}");
    assert!(names.contains(&"site/assets/app.js".to_string()), "got: {names:?}");
    assert!(names.iter().all(|n| !n.contains("logs") && !n.ends_with('~')), "got: {names:?}");
}

#[test]
fn encrypted_artifact_hides_the_tar_stream() {
    let src = source_tree();
    let out = TempDir::new().expect("tmp");
    let artifact = out.path().join("site.latest.tar.gz.aes");
    let password = bckp_core::Password::new("hunter2");

    let chain = writer_chain(File::create(&artifact).unwrap(), Compression::Gz, Some(&password)).unwrap();
    let (chain, _) = build_archive(&src.path().join("site"), |_: &Path| true, false, chain).unwrap();
    chain.finish().unwrap();

    let bytes = fs::read(&artifact).unwrap();
    assert_eq!(&bytes[..5], b"AES\x02\x00");
    assert!(!bytes.windows(b"index.html".len()).any(|w| w == b"index.html"));
}
