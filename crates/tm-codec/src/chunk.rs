// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunk-envelope shape for oversized datagrams, and the JSON-escape set
//! used to pack/unpack `chunkData`.
//!
//! Reassembly state (the TTL'd buffer keyed by `correlationId`) lives in
//! `tm-net`, which is the component that owns the reactor's receive loop;
//! this module only knows how to recognise and (de)serialize one chunk.

use serde::{Deserialize, Serialize};

/// A payload identified as a chunk by the presence of `chunkIndex`,
/// `totalChunks`, and `correlationId` in its decoded text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEnvelope {
    /// 0-based index of this chunk within the reassembled message.
    pub chunk_index: usize,
    /// Total number of chunks in the reassembled message (`>= 1`).
    pub total_chunks: usize,
    /// Sender-generated id correlating all chunks of one message.
    pub correlation_id: String,
    /// JSON-escaped substring of the original payload.
    pub chunk_data: String,
    /// Service type carried on the first chunk, for routing before
    /// reassembly completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    /// Operation name carried on the first chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// Quick textual sniff for whether `text` looks like a [`ChunkEnvelope`]
/// before paying for a full JSON parse.
#[must_use]
pub fn looks_like_chunk(text: &str) -> bool {
    text.contains("\"chunkIndex\"") && text.contains("\"totalChunks\"") && text.contains("\"correlationId\"")
}

/// Parse `text` as a [`ChunkEnvelope`].
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if `text` is not valid chunk JSON.
pub fn parse_chunk(text: &str) -> Result<ChunkEnvelope, serde_json::Error> {
    serde_json::from_str(text)
}

/// Unescape the standard JSON escape set (`\"`, `\\`, `\n`, `\r`, `\t`,
/// `\uXXXX`) from a chunk's `chunkData` field.
#[must_use]
pub fn unescape_chunk_data(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('/') => out.push('/'),
            Some('u') => {
                let hex: String = (&mut chars).take(4).collect();
                if let Ok(code) = u32::from_str_radix(&hex, 16) {
                    if let Some(ch) = char::from_u32(code) {
                        out.push(ch);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Split `payload` into `n` chunk envelopes sharing `correlation_id`, each
/// escaped into the `chunkData` field via `serde_json`'s string escaping.
#[must_use]
pub fn split_into_chunks(payload: &str, correlation_id: &str, chunk_size: usize) -> Vec<ChunkEnvelope> {
    let total_chunks = payload.len().div_ceil(chunk_size).max(1);
    payload
        .as_bytes()
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, bytes)| ChunkEnvelope {
            chunk_index: i,
            total_chunks,
            correlation_id: correlation_id.to_string(),
            chunk_data: String::from_utf8_lossy(bytes).into_owned(),
            service_type: None,
            operation_name: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chunk_shaped_text() {
        let text = r#"{"chunkIndex":0,"totalChunks":2,"correlationId":"abc","chunkData":"x"}"#;
        assert!(looks_like_chunk(text));
        assert!(!looks_like_chunk(r#"{"tokenId":1}"#));
    }

    #[test]
    fn unescapes_unicode_sequences() {
        assert_eq!(unescape_chunk_data("caf\\u00e9"), "café");
        assert_eq!(unescape_chunk_data("a\\nb"), "a\nb");
        assert_eq!(unescape_chunk_data("a\\\"b"), "a\"b");
    }

    #[test]
    fn split_and_reassemble_round_trips() {
        let payload = "0123456789".repeat(10);
        let chunks = split_into_chunks(&payload, "corr-1", 30);
        assert!(chunks.len() > 1);
        let mut reassembled = String::new();
        for c in &chunks {
            reassembled.push_str(&c.chunk_data);
        }
        assert_eq!(reassembled, payload);
        assert!(chunks.iter().all(|c| c.total_chunks == chunks.len()));
    }
}
