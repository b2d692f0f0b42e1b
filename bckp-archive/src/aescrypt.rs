//! AES Crypt stream format, version 2.
//!
//! Layout written by [`AesCryptWriter`]:
//!
//! ```text
//! "AES" 0x02 0x00
//! extensions (u16 BE length + bytes) ... 0x0000
//! IV1                                   16 bytes
//! AES-256-CBC(key1, IV1)(IV2 || key2)   48 bytes
//! HMAC-SHA256(key1) of the 48 bytes     32 bytes
//! AES-256-CBC(key2, IV2)(payload)       n * 16 bytes
//! payload length mod 16                 1 byte
//! HMAC-SHA256(key2) of the ciphertext   32 bytes
//! ```
//!
//! `key1` is stretched from the password (UTF-16LE) with 8192 rounds of
//! SHA-256 seeded by IV1. Output is readable by the reference `aescrypt`
//! tool.

use std::io::{self, Write};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use bckp_core::Password;

type HmacSha256 = Hmac<Sha256>;
type Encryptor = cbc::Encryptor<Aes256>;

const BLOCK: usize = 16;
const KEY_LEN: usize = 32;
const STRETCH_ROUNDS: usize = 8192;
const CONTAINER_LEN: usize = 128;

const MAGIC: &[u8; 3] = b"AES";
const VERSION: u8 = 2;

/// Streaming AES Crypt encryptor. Call [`AesCryptWriter::finish`] to write the
/// final block and trailer; dropping the writer leaves an unreadable file.
pub struct AesCryptWriter<W: Write> {
    inner: W,
    cipher: Encryptor,
    mac: HmacSha256,
    pending: Vec<u8>,
    total: u64,
}

impl<W: Write> AesCryptWriter<W> {
    /// Write the header to `inner` and prepare the payload cipher.
    pub fn new(mut inner: W, password: &Password) -> io::Result<Self> {
        let mut iv1 = [0u8; BLOCK];
        let mut iv2 = [0u8; BLOCK];
        let mut key2 = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut iv1);
        OsRng.fill_bytes(&mut iv2);
        OsRng.fill_bytes(&mut key2);

        let key1 = stretch_key(&iv1, password.expose());

        let mut session = [0u8; BLOCK + KEY_LEN];
        session[..BLOCK].copy_from_slice(&iv2);
        session[BLOCK..].copy_from_slice(&key2);
        let mut key_cipher =
            Encryptor::new(GenericArray::from_slice(&key1), GenericArray::from_slice(&iv1));
        for chunk in session.chunks_exact_mut(BLOCK) {
            key_cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        let mut key_mac = new_mac(&key1)?;
        key_mac.update(&session);

        inner.write_all(MAGIC)?;
        inner.write_all(&[VERSION, 0x00])?;
        write_extensions(&mut inner)?;
        inner.write_all(&iv1)?;
        inner.write_all(&session)?;
        inner.write_all(&key_mac.finalize().into_bytes())?;

        Ok(Self {
            inner,
            cipher: Encryptor::new(GenericArray::from_slice(&key2), GenericArray::from_slice(&iv2)),
            mac: new_mac(&key2)?,
            pending: Vec::with_capacity(BLOCK * 2),
            total: 0,
        })
    }

    /// Pad and encrypt the last partial block, write the trailer and
    /// return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.pending.is_empty() {
            let pad = BLOCK - self.pending.len();
            self.pending.resize(BLOCK, pad as u8);
            let mut last = std::mem::take(&mut self.pending);
            self.encrypt_in_place(&mut last);
            self.inner.write_all(&last)?;
        }
        self.inner.write_all(&[(self.total % BLOCK as u64) as u8])?;
        self.inner.write_all(&self.mac.finalize().into_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn encrypt_in_place(&mut self, blocks: &mut [u8]) {
        for chunk in blocks.chunks_exact_mut(BLOCK) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        self.mac.update(blocks);
    }
}

impl<W: Write> Write for AesCryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let whole = self.pending.len() - self.pending.len() % BLOCK;
        if whole > 0 {
            let mut blocks: Vec<u8> = self.pending.drain(..whole).collect();
            self.encrypt_in_place(&mut blocks);
            self.inner.write_all(&blocks)?;
        }
        self.total += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Derive the 256-bit header key from `password`.
pub fn stretch_key(iv: &[u8; BLOCK], password: &str) -> [u8; KEY_LEN] {
    let utf16: Vec<u8> = password
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();

    let mut digest = [0u8; KEY_LEN];
    digest[..BLOCK].copy_from_slice(iv);
    for _ in 0..STRETCH_ROUNDS {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(&utf16);
        digest.copy_from_slice(&hasher.finalize());
    }
    digest
}

fn new_mac(key: &[u8]) -> io::Result<HmacSha256> {
    HmacSha256::new_from_slice(key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
}

fn write_extensions<W: Write>(out: &mut W) -> io::Result<()> {
    let created_by = format!("CREATED_BY\0bckp {}", env!("CARGO_PKG_VERSION"));
    write_extension(out, created_by.as_bytes())?;
    write_extension(out, &[0u8; CONTAINER_LEN])?;
    out.write_all(&[0x00, 0x00])
}

fn write_extension<W: Write>(out: &mut W, body: &[u8]) -> io::Result<()> {
    let len = u16::try_from(body.len())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(body)
}
