// SPDX-License-Identifier: MIT OR Apache-2.0
//! The async dispatch loop: wires a place's reactor arrivals, priority
//! buffer, business handler, routing table, resolver, and sender together,
//! enforcing the single-firing-per-place invariant.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{error, warn};

use tm_codec::parse_envelope;
use tm_core::RoutingTable;
use tm_correlator::{JoinCorrelator, JoinOutcome};
use tm_error::{ErrorCode, PlaceError};
use tm_net::{Arrival, CancelToken, Sender};
use tm_resolver::ServiceResolver;
use tm_scheduler::PriorityBuffer;

use crate::eventlog::{EventLogSink, EventRecord};
use crate::firing::fire;
use crate::handler::BusinessHandler;

/// Everything one place's dispatch loop needs for the lifetime of the place.
pub struct Dispatcher {
    place: String,
    routing_table: RoutingTable,
    resolver: Arc<dyn ServiceResolver>,
    handler: Arc<dyn BusinessHandler>,
    sink: Arc<dyn EventLogSink>,
    buffer: Mutex<PriorityBuffer>,
    buffer_ready: Notify,
    join_correlator: Option<Mutex<JoinCorrelator>>,
    sender: Sender,
    cancel: CancelToken,
}

impl Dispatcher {
    /// Build a dispatcher for `place`, bounded at `capacity` entries.
    #[must_use]
    pub fn new(
        place: impl Into<String>,
        capacity: usize,
        routing_table: RoutingTable,
        resolver: Arc<dyn ServiceResolver>,
        handler: Arc<dyn BusinessHandler>,
        sink: Arc<dyn EventLogSink>,
        sender: Sender,
        cancel: CancelToken,
    ) -> Self {
        let place = place.into();
        Self {
            buffer: Mutex::new(PriorityBuffer::new(place.clone(), capacity)),
            buffer_ready: Notify::new(),
            place,
            routing_table,
            resolver,
            handler,
            sink,
            join_correlator: None,
            sender,
            cancel,
        }
    }

    /// Build a dispatcher for a join place: every arrival is first offered
    /// to a [`JoinCorrelator`] expecting `expected_branches` branches per
    /// parent id, and only the merged token is admitted to the priority
    /// buffer for firing.
    #[must_use]
    pub fn new_join_place(
        place: impl Into<String>,
        capacity: usize,
        expected_branches: u32,
        routing_table: RoutingTable,
        resolver: Arc<dyn ServiceResolver>,
        handler: Arc<dyn BusinessHandler>,
        sink: Arc<dyn EventLogSink>,
        sender: Sender,
        cancel: CancelToken,
    ) -> Self {
        let mut dispatcher = Self::new(place, capacity, routing_table, resolver, handler, sink, sender, cancel);
        dispatcher.join_correlator = Some(Mutex::new(JoinCorrelator::new(expected_branches)));
        dispatcher
    }

    /// Feed one reactor arrival into the priority buffer, parsing the wire
    /// envelope first. Malformed envelopes and buffer overflow are logged
    /// and dropped rather than propagated, matching the reactor's own
    /// drop-and-continue posture toward unreadable datagrams. At a join
    /// place the envelope is first merged through the [`JoinCorrelator`];
    /// an arrival that completes no quorum is buffered, not discarded.
    pub async fn offer(&self, arrival: Arrival) {
        let envelope = match parse_envelope(&arrival.text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(place = %self.place, from = %arrival.from, error = %err, "dropping malformed envelope");
                return;
            }
        };

        let envelope = match &self.join_correlator {
            None => envelope,
            Some(correlator) => {
                let join_id = envelope.header.join_id;
                let now_ms = now_epoch_ms();
                let mut correlator = correlator.lock().await;
                match correlator.offer(envelope.token.clone(), join_id, now_ms) {
                    JoinOutcome::Pending => return,
                    JoinOutcome::TimedOut(parent_id) => {
                        warn!(place = %self.place, parent_id, "join accumulator timed out before quorum");
                        return;
                    }
                    JoinOutcome::Merged(merged_token) => {
                        let mut merged_envelope = envelope;
                        merged_envelope.token = merged_token;
                        merged_envelope
                    }
                }
            }
        };

        let mut buffer = self.buffer.lock().await;
        match buffer.offer(envelope) {
            Ok(_) => {
                drop(buffer);
                self.buffer_ready.notify_one();
            }
            Err(err) => warn!(place = %self.place, error = %err, "dropping arrival: buffer overflow"),
        }
    }

    /// Run the fire loop until `cancel` is signalled: pop the lowest-cost
    /// entry, invoke the business handler on a blocking thread, route and
    /// send its outbound envelope(s), and append an event record. Only one
    /// entry is ever in flight per place, satisfying the single-firing
    /// invariant. While the buffer is empty, the loop waits on
    /// `buffer_ready` rather than polling.
    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                () = self.fire_next() => {}
            }
        }
    }

    async fn fire_next(&self) {
        // Register interest before checking the buffer, so an `offer()` that
        // lands between the check and the wait below isn't missed.
        let ready = self.buffer_ready.notified();
        tokio::pin!(ready);
        ready.as_mut().enable();

        let popped = {
            let mut buffer = self.buffer.lock().await;
            buffer.pop()
        };
        let Some((cost_key, envelope)) = popped else {
            ready.await;
            return;
        };

        let started = Instant::now();
        let now_ms = now_epoch_ms();
        let handler = Arc::clone(&self.handler);
        let routing_table = self.routing_table.clone();
        let resolver = Arc::clone(&self.resolver);
        let result = tokio::task::spawn_blocking(move || {
            fire(&envelope, handler.as_ref(), &routing_table, resolver.as_ref(), now_ms)
        })
        .await;

        let fired = match result {
            Ok(Ok(fired)) => fired,
            Ok(Err(err)) => {
                error!(place = %self.place, error = %err, "firing failed");
                self.sink.append(EventRecord {
                    place: self.place.clone(),
                    sequence_id: 0,
                    cost_key,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    outcome: "error".to_string(),
                });
                return;
            }
            Err(join_err) => {
                error!(place = %self.place, error = %join_err, "business handler task panicked");
                return;
            }
        };

        for outbound in &fired.outbound {
            match destination_addr(&outbound.destination) {
                Ok(addr) => {
                    if let Err(err) = self.sender.send(&outbound.envelope_xml, &outbound.correlation_id, addr).await {
                        error!(place = %self.place, error = %err, "failed to send outbound envelope");
                    }
                }
                Err(err) => error!(place = %self.place, error = %err, "unresolvable destination"),
            }
        }

        self.sink.append(EventRecord {
            place: self.place.clone(),
            sequence_id: 0,
            cost_key,
            elapsed_ms: started.elapsed().as_millis() as u64,
            outcome: fired.outcome.to_string(),
        });
    }
}

fn destination_addr(destination: &tm_resolver::Destination) -> Result<SocketAddr, PlaceError> {
    let port = destination.target_port().ok_or_else(|| {
        PlaceError::new(ErrorCode::ResolverMiss, "destination channel id is not ip{N}-shaped")
            .with_context("channel_id", destination.channel_id.clone())
    })?;
    format!("{}:{port}", destination.host).parse().map_err(|_| {
        PlaceError::new(ErrorCode::ResolverMiss, "destination host did not parse as an IP address")
            .with_context("host", destination.host.clone())
    })
}

fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Spawn one reactor-arrival feeder task plus the fire loop for `dispatcher`.
/// Returns both tasks' `JoinHandle`s so a supervisor can await them after
/// signalling the shared `CancelToken`.
pub fn spawn(dispatcher: Arc<Dispatcher>, mut arrivals: mpsc::Receiver<Arrival>) -> Vec<tokio::task::JoinHandle<()>> {
    let feeder = Arc::clone(&dispatcher);
    let feeder_handle = tokio::spawn(async move {
        while let Some(arrival) = arrivals.recv().await {
            feeder.offer(arrival).await;
        }
    });
    let run_handle = tokio::spawn(async move {
        dispatcher.run().await;
    });
    vec![feeder_handle, run_handle]
}
