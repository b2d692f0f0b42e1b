//! Layered artifact writer.
//!
//! The chain is assembled inside-out so that bytes flow
//! `tar → compressor → encryptor → file`: compression always happens before
//! encryption, matching the suffix order `.tar[.gz|.br|.xz][.aes]`.
//! Every layer must be [`Layer::finish`]ed; dropping a chain leaves a
//! truncated stream behind.

use std::fs::File;
use std::io::{self, Write};

use flate2::write::GzEncoder;
use xz2::write::XzEncoder;

use bckp_core::{Compression, Password};

use crate::aescrypt::AesCryptWriter;

/// Suffix of AES Crypt encrypted artifacts.
pub const ENCRYPTED_SUFFIX: &str = "aes";

const BROTLI_BUFFER: usize = 64 * 1024;
const BROTLI_QUALITY: u32 = 9;
const BROTLI_WINDOW: u32 = 22;
const XZ_LEVEL: u32 = 6;

/// A writer that must be explicitly completed. `finish` completes this layer
/// and then every layer below it, ending with an `fsync` of the file.
pub trait Layer: Write {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

struct FileSink(File);

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Layer for FileSink {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()?;
        self.0.sync_all()
    }
}

impl Layer for GzEncoder<Box<dyn Layer>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        GzEncoder::finish(*self)?.finish()
    }
}

impl Layer for XzEncoder<Box<dyn Layer>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        XzEncoder::finish(*self)?.finish()
    }
}

impl Layer for brotli::CompressorWriter<Box<dyn Layer>> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.flush()?;
        // `into_inner` writes the final brotli block.
        brotli::CompressorWriter::into_inner(*self).finish()
    }
}

impl Layer for AesCryptWriter<Box<dyn Layer>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        AesCryptWriter::finish(*self)?.finish()
    }
}

/// Build the writer chain for an artifact file.
///
/// `password` enables the AES Crypt layer; compression sits on top of it.
pub fn writer_chain(
    file: File,
    compression: Compression,
    password: Option<&Password>,
) -> io::Result<Box<dyn Layer>> {
    let mut sink: Box<dyn Layer> = Box::new(FileSink(file));

    if let Some(password) = password {
        sink = Box::new(AesCryptWriter::new(sink, password)?);
    }

    let sink: Box<dyn Layer> = match compression {
        Compression::None => sink,
        Compression::Gz => Box::new(GzEncoder::new(sink, flate2::Compression::default())),
        Compression::Br => Box::new(brotli::CompressorWriter::new(
            sink,
            BROTLI_BUFFER,
            BROTLI_QUALITY,
            BROTLI_WINDOW,
        )),
        Compression::Xz => Box::new(XzEncoder::new(sink, XZ_LEVEL)),
    };
    Ok(sink)
}

/// `tar[.<compression>][.aes]` — the extension shared by every artifact of a job.
pub fn archive_extension(compression: Compression, encrypted: bool) -> String {
    let mut ext = String::from("tar");
    if let Some(suffix) = compression.suffix() {
        ext.push('.');
        ext.push_str(suffix);
    }
    if encrypted {
        ext.push('.');
        ext.push_str(ENCRYPTED_SUFFIX);
    }
    ext
}
