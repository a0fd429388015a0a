// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-scheduler
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;

use tm_core::Envelope;
use tm_error::{ErrorCode, PlaceError};

/// Default bounded capacity of a place's priority buffer when
/// [`tm_core::PlaceConfig::max_queue`] is not otherwise specified.
pub const MAXQUEUE: usize = 5;

/// A 64-bit ordering key: lower sorts first. The high 32 bits are either the
/// header's `sequence_id` (SID-prioritised) or the arrival order; the low 32
/// bits are a strictly increasing tie-breaker so no two keys compare equal.
pub type CostKey = u64;

fn compose(base: u64, tie_breaker: u64) -> CostKey {
    ((base & 0xFFFF_FFFF) << 32) | (tie_breaker & 0xFFFF_FFFF)
}

/// Bounded, cost-key-ordered buffer of accepted envelopes for one place.
///
/// Dispatch order is ascending cost key: when a header requests SID
/// prioritisation, that is ascending `sequence_id` among whatever is
/// present in the buffer at the moment of pop, since entries are resorted
/// on every insert by virtue of the backing sorted map.
pub struct PriorityBuffer {
    place: String,
    capacity: usize,
    entries: BTreeMap<CostKey, Envelope>,
    arrival_counter: u64,
    lost: u64,
}

impl PriorityBuffer {
    /// Create an empty buffer bounded at `capacity` entries (`MAXQUEUE`).
    #[must_use]
    pub fn new(place: impl Into<String>, capacity: usize) -> Self {
        Self {
            place: place.into(),
            capacity,
            entries: BTreeMap::new(),
            arrival_counter: 0,
            lost: 0,
        }
    }

    /// Number of entries currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the buffer holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining capacity before arrivals are rejected (`queueAction` in the
    /// scheduling algorithm).
    #[must_use]
    pub fn queue_action(&self) -> i64 {
        self.capacity as i64 - self.entries.len() as i64
    }

    /// Total arrivals rejected for this place since creation.
    #[must_use]
    pub fn lost_count(&self) -> u64 {
        self.lost
    }

    /// Offer an envelope to the buffer, assigning it a [`CostKey`].
    ///
    /// Rejects with [`ErrorCode::BufferOverflow`] iff [`queue_action`]
    /// would be `<= 0`; the lost counter is incremented and the envelope is
    /// never buffered.
    ///
    /// [`queue_action`]: Self::queue_action
    pub fn offer(&mut self, envelope: Envelope) -> Result<CostKey, PlaceError> {
        if self.queue_action() <= 0 {
            self.lost += 1;
            return Err(PlaceError::new(
                ErrorCode::BufferOverflow,
                format!("buffer full at capacity {}", self.capacity),
            )
            .with_context("place", &self.place)
            .with_context("sequence_id", envelope.header.sequence_id.to_string()));
        }

        let base = if envelope.header.priortise_sid {
            envelope.header.sequence_id
        } else {
            self.arrival_counter
        };
        let key = compose(base, self.arrival_counter);
        self.arrival_counter += 1;

        // A collision here would mean two arrivals shared the same
        // (base, tie_breaker) pair, which cannot happen since tie_breaker
        // is assigned from a counter that only ever increases.
        self.entries.insert(key, envelope);
        Ok(key)
    }

    /// Remove and return the lowest-cost-key entry, if any.
    pub fn pop(&mut self) -> Option<(CostKey, Envelope)> {
        self.entries.pop_first()
    }

    /// Peek at the lowest-cost-key entry without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<(&CostKey, &Envelope)> {
        self.entries.iter().next()
    }
}
