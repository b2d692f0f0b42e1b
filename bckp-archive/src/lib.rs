//! # bckp-archive
//!
//! Byte-stream collaborators used to produce a backup artifact:
//!
//! - [`matcher`] — glob exclusion sets (`**`, `*`, `?`) over relative paths
//! - [`walk`] — the directory walk shared by scanning and archiving
//! - [`archive`] — tar stream of a directory tree with a per-entry filter
//! - [`compress`] — the layered writer chain (compression, then encryption)
//! - [`aescrypt`] — AES Crypt (format version 2) encryption transform
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::path::Path;
//!
//! use bckp_archive::{build_archive, writer_chain, ExcludeSet};
//! use bckp_core::Compression;
//!
//! fn snapshot(root: &Path, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
//!     let excludes = ExcludeSet::new(&["**/.git"])?;
//!     let chain = writer_chain(File::create(out)?, Compression::Gz, None)?;
//!     let (chain, _stats) = build_archive(root, |rel| !excludes.is_excluded(rel), false, chain)?;
//!     chain.finish()?;
//!     Ok(())
//! }
//! ```

pub mod aescrypt;
pub mod archive;
pub mod compress;
pub mod error;
pub mod matcher;
pub mod walk;

pub use aescrypt::AesCryptWriter;
pub use archive::{build_archive, ArchiveStats};
pub use compress::{archive_extension, writer_chain, Layer};
pub use error::ArchiveError;
pub use matcher::{matches, ExcludeSet};
pub use walk::{Entry, EntryKind, TreeWalk};
