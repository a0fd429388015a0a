// SPDX-License-Identifier: MIT OR Apache-2.0
//! Place health reporting: `Healthy | Degraded { reason } | Stopped`,
//! derived from supervised-task liveness and accumulated metrics.

use serde::{Deserialize, Serialize};
use tm_telemetry::PlaceMetricsSnapshot;

/// A place's current health, as reported to an operator or a readiness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every spawned task is alive and metrics are within threshold.
    Healthy,
    /// Tasks are alive but accumulated metrics have crossed a threshold.
    Degraded {
        /// Human-readable cause.
        reason: String,
    },
    /// One or more supervised tasks has exited (shutdown, or a panic).
    Stopped,
}

/// A point-in-time health report for one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// The place this report describes.
    pub place: String,
    /// Current status.
    pub status: HealthStatus,
    /// Epoch milliseconds this report was generated.
    pub checked_at_ms: i64,
    /// The metrics snapshot the status was derived from.
    pub metrics: PlaceMetricsSnapshot,
}

/// Counts past which an otherwise-healthy place is reported as degraded.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Lost events (reassembly/compression failure, buffer overflow) before degrading.
    pub max_lost_events: u64,
    /// Join accumulators discarded before quorum, before degrading.
    pub max_join_timeouts: u64,
    /// Fork attempts that would have exceeded the branch-number range, before degrading.
    pub max_fork_overflows: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_lost_events: 50,
            max_join_timeouts: 10,
            max_fork_overflows: 0,
        }
    }
}

/// Derive a [`HealthStatus`] from task liveness and accumulated metrics.
///
/// Liveness dominates: a place with a dead task is `Stopped` regardless of
/// how clean its metrics look. Otherwise the first threshold crossed, in
/// fork-overflow, join-timeout, lost-event order, names the reason.
#[must_use]
pub fn evaluate(all_tasks_alive: bool, metrics: PlaceMetricsSnapshot, thresholds: HealthThresholds) -> HealthStatus {
    if !all_tasks_alive {
        return HealthStatus::Stopped;
    }
    if metrics.fork_overflows > thresholds.max_fork_overflows {
        return HealthStatus::Degraded {
            reason: format!("fork_overflows ({}) exceeds threshold ({})", metrics.fork_overflows, thresholds.max_fork_overflows),
        };
    }
    if metrics.join_timeouts > thresholds.max_join_timeouts {
        return HealthStatus::Degraded {
            reason: format!("join_timeouts ({}) exceeds threshold ({})", metrics.join_timeouts, thresholds.max_join_timeouts),
        };
    }
    if metrics.lost_events > thresholds.max_lost_events {
        return HealthStatus::Degraded {
            reason: format!("lost_events ({}) exceeds threshold ({})", metrics.lost_events, thresholds.max_lost_events),
        };
    }
    HealthStatus::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_task_is_stopped_regardless_of_metrics() {
        let status = evaluate(false, PlaceMetricsSnapshot::default(), HealthThresholds::default());
        assert_eq!(status, HealthStatus::Stopped);
    }

    #[test]
    fn clean_metrics_are_healthy() {
        let status = evaluate(true, PlaceMetricsSnapshot::default(), HealthThresholds::default());
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn a_single_fork_overflow_degrades_by_default() {
        let metrics = PlaceMetricsSnapshot { fork_overflows: 1, ..Default::default() };
        let status = evaluate(true, metrics, HealthThresholds::default());
        assert!(matches!(status, HealthStatus::Degraded { .. }));
    }

    #[test]
    fn fork_overflow_takes_precedence_over_lost_events_in_the_reason() {
        let metrics = PlaceMetricsSnapshot { fork_overflows: 1, lost_events: 1_000, ..Default::default() };
        let status = evaluate(true, metrics, HealthThresholds::default());
        match status {
            HealthStatus::Degraded { reason } => assert!(reason.contains("fork_overflows")),
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[test]
    fn lost_events_within_threshold_stays_healthy() {
        let metrics = PlaceMetricsSnapshot { lost_events: 49, ..Default::default() };
        let status = evaluate(true, metrics, HealthThresholds::default());
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn status_serializes_with_a_tagged_reason() {
        let status = HealthStatus::Degraded { reason: "too many timeouts".to_string() };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"degraded\""));
        assert!(json.contains("too many timeouts"));
    }
}
