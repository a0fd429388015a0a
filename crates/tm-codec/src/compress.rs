// SPDX-License-Identifier: MIT OR Apache-2.0
//! GZIP framing for outbound envelopes and decompression for inbound
//! datagrams.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

/// GZIP magic bytes. A datagram beginning with these two bytes is
/// decompressed before further parsing.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wire datagrams at or above this many bytes are GZIP compressed before
/// sending.
pub const COMPRESS_THRESHOLD_BYTES: usize = 4096;

/// Errors from compression or decompression.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The underlying GZIP stream could not be read or written.
    #[error("gzip I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// `true` if `bytes` begins with the GZIP magic number.
#[must_use]
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// GZIP-compress `text` at the default compression level.
///
/// # Errors
///
/// Returns [`CompressError::Io`] if the encoder fails.
pub fn compress(text: &str) -> Result<Vec<u8>, CompressError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(encoder.finish()?)
}

/// Decompress a GZIP byte stream to UTF-8 text.
///
/// # Errors
///
/// Returns [`CompressError::Io`] if the stream is not valid GZIP or is not
/// valid UTF-8 once decompressed.
pub fn decompress(bytes: &[u8]) -> Result<String, CompressError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = String::new();
    decoder.read_to_string(&mut out)?;
    Ok(out)
}

/// Decode an inbound datagram: GZIP-decompress if the magic bytes are
/// present, otherwise decode the bytes directly as UTF-8.
///
/// # Errors
///
/// Returns [`CompressError::Io`] if GZIP decompression fails. Non-UTF-8
/// plain bytes are lossily decoded rather than erroring, matching the
/// reactor's "log and drop" handling for malformed packets further
/// upstream.
pub fn decode_datagram(bytes: &[u8]) -> Result<String, CompressError> {
    if is_gzip(bytes) {
        decompress(bytes)
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Encode an outbound payload, GZIP-compressing it when it meets or
/// exceeds [`COMPRESS_THRESHOLD_BYTES`].
///
/// # Errors
///
/// Returns [`CompressError::Io`] if compression fails.
pub fn encode_datagram(text: &str) -> Result<Vec<u8>, CompressError> {
    if text.len() >= COMPRESS_THRESHOLD_BYTES {
        compress(text)
    } else {
        Ok(text.as_bytes().to_vec())
    }
}
