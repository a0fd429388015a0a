// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `PlaceHost` supervisor: binds one place's socket, spawns its reactor
//! workers and dispatcher task, and tears both down cleanly on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use tm_config::ReactorSettings;
use tm_core::{PlaceConfig, RoutingTable};
use tm_dispatcher::{BusinessHandler, Dispatcher, EventLogSink};
use tm_net::{CancelToken, Reactor, ReactorError, Sender};
use tm_resolver::ServiceResolver;
use tm_telemetry::PlaceMetrics;

use crate::health::{evaluate, HealthCheck, HealthThresholds};

/// Errors from standing up a [`PlaceHost`].
#[derive(Debug, Error)]
pub enum HostError {
    /// Socket binding failed, or the place's channel id did not parse.
    #[error(transparent)]
    Reactor(#[from] ReactorError),
    /// Reading the bound socket's local address failed.
    #[error("failed to read bound socket address: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns a place's bound socket and every task spawned to serve it.
///
/// Dropping a `PlaceHost` without calling [`shutdown`](PlaceHost::shutdown)
/// leaves its tasks running to completion; `shutdown` is the only way to
/// signal and wait for a clean stop.
pub struct PlaceHost {
    place: String,
    local_addr: SocketAddr,
    cancel: CancelToken,
    metrics: Arc<PlaceMetrics>,
    thresholds: HealthThresholds,
    handles: Vec<JoinHandle<()>>,
}

impl PlaceHost {
    /// Bind `config`'s socket, wire a dispatcher for it, and spawn the
    /// reactor worker pool, the chunk-cleanup task, and the dispatcher's
    /// feeder and fire-loop tasks.
    ///
    /// `expected_join_branches` makes this a join place: arrivals are first
    /// merged through a join correlator before buffering, via
    /// [`Dispatcher::new_join_place`].
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the socket cannot be bound or its local
    /// address cannot be read back.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        config: &PlaceConfig,
        settings: &ReactorSettings,
        remote_mode: bool,
        routing_table: RoutingTable,
        resolver: Arc<dyn ServiceResolver>,
        handler: Arc<dyn BusinessHandler>,
        sink: Arc<dyn EventLogSink>,
        expected_join_branches: Option<u32>,
    ) -> Result<Self, HostError> {
        let cancel = CancelToken::new();
        let reactor = Reactor::bind(config, remote_mode, cancel.clone())
            .await?
            .with_worker_count(settings.pool_size);
        let local_addr = reactor.local_addr()?;
        let socket = reactor.socket_handle();
        let (arrivals, mut handles) = reactor.spawn();

        let sender = Sender::with_max_wire_length(socket, settings.max_wire_length);
        let dispatcher = Arc::new(match expected_join_branches {
            Some(expected) => Dispatcher::new_join_place(
                config.service_name.clone(),
                config.max_queue,
                expected,
                routing_table,
                resolver,
                handler,
                sink,
                sender,
                cancel.clone(),
            ),
            None => Dispatcher::new(
                config.service_name.clone(),
                config.max_queue,
                routing_table,
                resolver,
                handler,
                sink,
                sender,
                cancel.clone(),
            ),
        });

        handles.extend(tm_dispatcher::spawn(dispatcher, arrivals));

        Ok(Self {
            place: config.service_name.clone(),
            local_addr,
            cancel,
            metrics: Arc::new(PlaceMetrics::new()),
            thresholds: HealthThresholds::default(),
            handles,
        })
    }

    /// Override the thresholds past which [`health`](PlaceHost::health)
    /// reports `Degraded`, builder-style.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// The bound local address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle to this place's metric counters, for a handler or an
    /// integration test to record against.
    #[must_use]
    pub fn metrics(&self) -> Arc<PlaceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The shared cancellation token. Cancelling it directly has the same
    /// effect as the first half of [`shutdown`](PlaceHost::shutdown), minus
    /// awaiting the tasks.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Derive a [`HealthCheck`] from current task liveness and metrics.
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        let all_tasks_alive = self.handles.iter().all(|h| !h.is_finished());
        let metrics = self.metrics.snapshot();
        let status = evaluate(all_tasks_alive, metrics, self.thresholds);
        HealthCheck {
            place: self.place.clone(),
            status,
            checked_at_ms: now_epoch_ms(),
            metrics,
        }
    }

    /// Signal cancellation and await every spawned task.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_dispatcher::{EchoHandler, TracingSink};
    use tm_resolver::StaticResolver;

    fn sample_config() -> PlaceConfig {
        PlaceConfig {
            service_name: "P_HOST_TEST".to_string(),
            operations: vec!["process".to_string()],
            channel_id: "ip9".to_string(),
            base_port: 900,
            max_queue: 5,
        }
    }

    #[tokio::test]
    async fn spawn_binds_a_socket_and_reports_healthy() {
        let host = PlaceHost::spawn(
            &sample_config(),
            &ReactorSettings::default(),
            false,
            RoutingTable::new(),
            Arc::new(StaticResolver::new()),
            Arc::new(EchoHandler),
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        assert!(host.local_addr().port() > 0);
        let health = host.health();
        assert_eq!(health.place, "P_HOST_TEST");
        assert_eq!(health.status, crate::health::HealthStatus::Healthy);

        host.shutdown().await;
    }

    #[tokio::test]
    async fn metrics_past_threshold_report_degraded() {
        let host = PlaceHost::spawn(
            &sample_config(),
            &ReactorSettings::default(),
            false,
            RoutingTable::new(),
            Arc::new(StaticResolver::new()),
            Arc::new(EchoHandler),
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        host.metrics().record_fork_overflow();
        match host.health().status {
            crate::health::HealthStatus::Degraded { .. } => {}
            other => panic!("expected degraded, got {other:?}"),
        }

        host.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_every_task_within_a_timeout() {
        let host = PlaceHost::spawn(
            &sample_config(),
            &ReactorSettings::default(),
            false,
            RoutingTable::new(),
            Arc::new(StaticResolver::new()),
            Arc::new(EchoHandler),
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), host.shutdown())
            .await
            .expect("shutdown should complete promptly once cancelled");
    }

    #[tokio::test]
    async fn join_place_builds_a_correlator_backed_dispatcher() {
        let host = PlaceHost::spawn(
            &sample_config(),
            &ReactorSettings::default(),
            false,
            RoutingTable::new(),
            Arc::new(StaticResolver::new()),
            Arc::new(EchoHandler),
            Arc::new(TracingSink),
            Some(2),
        )
        .await
        .unwrap();
        assert_eq!(host.health().status, crate::health::HealthStatus::Healthy);
        host.shutdown().await;
    }
}
