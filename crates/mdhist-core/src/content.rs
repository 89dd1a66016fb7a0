//! Content store primitives: hashing, compression, dedup
//!
//! Blobs are stored header-less: either raw UTF-8 or a gzip stream. A gzip
//! stream always starts with `1f 8b`, a pair that can never open valid
//! UTF-8, so a blob is only fed to the decoder when it carries that magic.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Content shorter than this many UTF-16 code units is never compressed
pub const COMPRESSION_THRESHOLD: usize = 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_LEVEL: u32 = 6;

/// How snapshot blobs are encoded on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    None,
    #[default]
    Gzip,
}

/// Bytes ready to be written as a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedContent {
    pub bytes: Vec<u8>,
    pub compressed: bool,
}

impl EncodedContent {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Hex digest of the uncompressed text
pub fn compute_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Length as the editor measures it (UTF-16 code units)
pub fn text_length(content: &str) -> usize {
    content.encode_utf16().count()
}

pub fn compress_content(content: &str, mode: CompressionMode) -> Result<EncodedContent> {
    if mode == CompressionMode::None || text_length(content) < COMPRESSION_THRESHOLD {
        return Ok(EncodedContent {
            bytes: content.as_bytes().to_vec(),
            compressed: false,
        });
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(GZIP_LEVEL));
    encoder
        .write_all(content.as_bytes())
        .map_err(Error::Compression)?;
    let bytes = encoder.finish().map_err(Error::Compression)?;

    Ok(EncodedContent {
        bytes,
        compressed: true,
    })
}

/// Decode a blob, falling back to reading it as UTF-8 when it is not a
/// valid gzip stream
pub fn decompress_content(bytes: &[u8]) -> String {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut text = String::new();
        if decoder.read_to_string(&mut text).is_ok() {
            return text;
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// A missing prior hash is never a duplicate
pub fn is_duplicate(content: &str, latest_hash: Option<&str>) -> bool {
    match latest_hash {
        Some(hash) => compute_hash(content) == hash,
        None => false,
    }
}
