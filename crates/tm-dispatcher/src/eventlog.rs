// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Event Log Sink interface: one record per firing, for audit and
//! operational visibility.

use tracing::info;

/// One dispatcher firing, recorded after step 9 of the firing loop.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Place that fired.
    pub place: String,
    /// Header `sequenceId` of the fired entry.
    pub sequence_id: u64,
    /// The cost key it was popped under.
    pub cost_key: u64,
    /// Wall-clock milliseconds spent in the business handler.
    pub elapsed_ms: u64,
    /// `"dispatched"`, `"expired"`, `"handler_error"`, or `"unmatched"`.
    pub outcome: String,
}

/// Durable or observable sink for [`EventRecord`]s.
pub trait EventLogSink: Send + Sync {
    /// Append one record. Implementations must not block the dispatcher
    /// loop for long; a slow sink should buffer internally.
    fn append(&self, record: EventRecord);
}

/// Logs each record via `tracing` at `info` level. The default sink when no
/// durable store is configured.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl EventLogSink for TracingSink {
    fn append(&self, record: EventRecord) {
        info!(
            place = %record.place,
            sequence_id = record.sequence_id,
            cost_key = record.cost_key,
            elapsed_ms = record.elapsed_ms,
            outcome = %record.outcome,
            "dispatcher firing"
        );
    }
}
