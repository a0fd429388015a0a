// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::io::IsTerminal;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Initialize the global `tracing` subscriber.
///
/// The filter is driven by `RUST_LOG`, defaulting to `info`. Output is
/// human-readable when stdout is a TTY and line-delimited JSON otherwise,
/// so a terminal session stays readable while a supervised deployment gets
/// structured logs a collector can parse.
///
/// Calling this more than once in a process is a programmer error; the
/// second call's subscriber is simply ignored by `tracing`'s global
/// dispatcher, matching `tracing_subscriber::fmt().init()`'s own behavior.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::io::stdout().is_terminal() {
        builder.init();
    } else {
        builder.json().init();
    }
}

// ---------------------------------------------------------------------------
// PlaceMetrics
// ---------------------------------------------------------------------------

/// Atomic counters for one place, read by its health check and exported as
/// a point-in-time [`PlaceMetricsSnapshot`].
#[derive(Debug, Default)]
pub struct PlaceMetrics {
    lost_events: AtomicU64,
    dispatched: AtomicU64,
    join_timeouts: AtomicU64,
    fork_overflows: AtomicU64,
}

impl PlaceMetrics {
    /// A fresh, all-zero counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the lost-events counter (buffer overflow, chunk reassembly
    /// timeout, or an unregistered destination).
    pub fn record_lost_event(&self) {
        self.lost_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the dispatched counter: one successful firing.
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the join-timeout counter: an accumulator discarded before
    /// reaching quorum.
    pub fn record_join_timeout(&self) {
        self.join_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the fork-overflow counter: a branch number would exceed
    /// the `[1..=99]` range.
    pub fn record_fork_overflow(&self) {
        self.fork_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot of all four counters for reporting.
    #[must_use]
    pub fn snapshot(&self) -> PlaceMetricsSnapshot {
        PlaceMetricsSnapshot {
            lost_events: self.lost_events.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            join_timeouts: self.join_timeouts.load(Ordering::Relaxed),
            fork_overflows: self.fork_overflows.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time, serializable copy of [`PlaceMetrics`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaceMetricsSnapshot {
    /// Events dropped: buffer overflow, reassembly timeout, resolver miss.
    pub lost_events: u64,
    /// Successful firings.
    pub dispatched: u64,
    /// Join accumulators discarded before reaching quorum.
    pub join_timeouts: u64,
    /// Fork attempts that would have exceeded the branch-number range.
    pub fork_overflows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_all_zero() {
        let metrics = PlaceMetrics::new();
        assert_eq!(metrics.snapshot(), PlaceMetricsSnapshot::default());
    }

    #[test]
    fn each_counter_increments_independently() {
        let metrics = PlaceMetrics::new();
        metrics.record_lost_event();
        metrics.record_lost_event();
        metrics.record_dispatch();
        metrics.record_join_timeout();
        metrics.record_fork_overflow();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lost_events, 2);
        assert_eq!(snapshot.dispatched, 1);
        assert_eq!(snapshot.join_timeouts, 1);
        assert_eq!(snapshot.fork_overflows, 1);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let metrics = PlaceMetrics::new();
        metrics.record_dispatch();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["dispatched"], 1);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(PlaceMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_dispatch();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().dispatched, 800);
    }
}
