// SPDX-License-Identifier: MIT OR Apache-2.0
//! TTL'd chunk reassembly buffers, keyed by `correlationId`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tm_codec::chunk::ChunkEnvelope;

/// Time-to-live for an incomplete chunk buffer before it is discarded and
/// counted as lost.
pub const CHUNK_TTL: Duration = Duration::from_secs(30);
/// Interval between sweeps that discard expired buffers.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

struct PendingChunks {
    slots: Vec<Option<String>>,
    received_count: usize,
    created_at: Instant,
}

impl PendingChunks {
    fn new(total_chunks: usize) -> Self {
        Self {
            slots: vec![None; total_chunks],
            received_count: 0,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= CHUNK_TTL
    }
}

/// Outcome of feeding one chunk into the reassembly buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// More chunks are still expected for this `correlationId`.
    Incomplete,
    /// All chunks have arrived; the reassembled text is ready.
    Complete(String),
    /// `chunk_index` was out of range or a duplicate of an already-filled
    /// slot. The chunk is ignored.
    Ignored,
}

/// Accumulates chunk envelopes into complete messages, evicting buffers
/// that outlive [`CHUNK_TTL`].
pub struct ChunkReassembler {
    buffers: Mutex<HashMap<String, PendingChunks>>,
}

impl ChunkReassembler {
    /// Create an empty reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one chunk into its buffer, creating the buffer on first sight
    /// of a `correlationId`. Duplicate or out-of-range indices are ignored.
    pub fn feed(&self, chunk: &ChunkEnvelope) -> FeedOutcome {
        let mut buffers = self.buffers.lock().expect("chunk buffer mutex poisoned");

        let entry = buffers
            .entry(chunk.correlation_id.clone())
            .or_insert_with(|| PendingChunks::new(chunk.total_chunks));

        let Some(slot) = entry.slots.get_mut(chunk.chunk_index) else {
            return FeedOutcome::Ignored;
        };
        if slot.is_some() {
            return FeedOutcome::Ignored;
        }

        let unescaped = tm_codec::chunk::unescape_chunk_data(&chunk.chunk_data);
        *slot = Some(unescaped);
        entry.received_count += 1;

        if entry.received_count == entry.slots.len() {
            let pending = buffers.remove(&chunk.correlation_id).expect("just inserted");
            let reassembled = pending.slots.into_iter().map(Option::unwrap_or_default).collect();
            FeedOutcome::Complete(reassembled)
        } else {
            FeedOutcome::Incomplete
        }
    }

    /// Discard every buffer older than [`CHUNK_TTL`], returning the number
    /// evicted so callers can bump a lost-event counter.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut buffers = self.buffers.lock().expect("chunk buffer mutex poisoned");
        let before = buffers.len();
        buffers.retain(|_, pending| !pending.is_expired(now));
        before - buffers.len()
    }

    /// Number of in-flight correlation ids.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.buffers.lock().expect("chunk buffer mutex poisoned").len()
    }
}

impl Default for ChunkReassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_codec::chunk::split_into_chunks;

    #[test]
    fn reassembles_chunks_in_index_order() {
        let reassembler = ChunkReassembler::new();
        let payload = "hello token mesh world";
        let chunks = split_into_chunks(payload, "corr-1", 8);

        let mut result = None;
        for chunk in &chunks {
            match reassembler.feed(chunk) {
                FeedOutcome::Complete(text) => result = Some(text),
                FeedOutcome::Incomplete => {}
                FeedOutcome::Ignored => panic!("unexpected ignore"),
            }
        }
        assert_eq!(result.as_deref(), Some(payload));
        assert_eq!(reassembler.pending_count(), 0);
    }

    #[test]
    fn duplicate_index_is_ignored() {
        let reassembler = ChunkReassembler::new();
        let chunks = split_into_chunks("abcdefgh", "corr-2", 4);
        assert_eq!(reassembler.feed(&chunks[0]), FeedOutcome::Incomplete);
        assert_eq!(reassembler.feed(&chunks[0]), FeedOutcome::Ignored);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let reassembler = ChunkReassembler::new();
        let mut chunk = split_into_chunks("abcd", "corr-3", 4).remove(0);
        chunk.chunk_index = 9;
        assert_eq!(reassembler.feed(&chunk), FeedOutcome::Ignored);
    }
}
