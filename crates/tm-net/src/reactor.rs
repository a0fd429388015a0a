// SPDX-License-Identifier: MIT OR Apache-2.0
//! UDP reactor: receives datagrams, decompresses, reassembles chunks, and
//! hands complete envelope text off to the scheduler.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tm_codec::chunk::{looks_like_chunk, parse_chunk};
use tm_codec::compress::decode_datagram;
use tm_core::PlaceConfig;

use crate::cancel::CancelToken;
use crate::chunkbuf::{ChunkReassembler, FeedOutcome, CLEANUP_INTERVAL};

/// Receive timeout so each worker periodically rechecks the cancel token
/// and the reassembler's cleanup schedule.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of cooperative worker tasks per reactor.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Errors from binding or running the reactor.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// `channel_id` did not parse as `ip{N}`.
    #[error("place {place} has an unparseable channel id: {channel_id}")]
    BadChannelId {
        /// The place whose config was rejected.
        place: String,
        /// The offending channel id.
        channel_id: String,
    },
    /// Socket creation or binding failed.
    #[error("failed to bind UDP socket: {0}")]
    Bind(#[from] std::io::Error),
}

/// A fully decoded, non-chunked datagram ready for the scheduler.
#[derive(Debug, Clone)]
pub struct Arrival {
    /// Reassembled (and decompressed) envelope text.
    pub text: String,
    /// The sender's address, for diagnostics.
    pub from: SocketAddr,
}

/// Binds one UDP socket per place and runs its worker pool.
pub struct Reactor {
    socket: Arc<UdpSocket>,
    reassembler: Arc<ChunkReassembler>,
    cancel: CancelToken,
    lost_events: Arc<AtomicU64>,
    worker_count: usize,
}

impl Reactor {
    /// Bind a socket for `config` at `targetPort = 10000 + channelNumber*1000
    /// + basePort`. Binds `0.0.0.0` in `remote_mode`, else loopback.
    /// Enables address reuse.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::BadChannelId`] if `config.channel_id` is not
    /// `ip{N}`-shaped, or [`ReactorError::Bind`] if the socket cannot be
    /// created or bound.
    pub async fn bind(
        config: &PlaceConfig,
        remote_mode: bool,
        cancel: CancelToken,
    ) -> Result<Self, ReactorError> {
        let port = config
            .target_port()
            .ok_or_else(|| ReactorError::BadChannelId {
                place: config.service_name.clone(),
                channel_id: config.channel_id.clone(),
            })?;

        let addr_ip = if remote_mode {
            Ipv4Addr::UNSPECIFIED
        } else {
            Ipv4Addr::LOCALHOST
        };
        let addr = SocketAddr::from((addr_ip, port as u16));

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket)?;

        Ok(Self {
            socket: Arc::new(tokio_socket),
            reassembler: Arc::new(ChunkReassembler::new()),
            cancel,
            lost_events: Arc::new(AtomicU64::new(0)),
            worker_count: DEFAULT_WORKER_COUNT,
        })
    }

    /// Override the default worker count.
    #[must_use]
    pub fn with_worker_count(mut self, n: usize) -> Self {
        self.worker_count = n.max(1);
        self
    }

    /// Number of datagrams lost to GZIP failure or chunk TTL expiry so far.
    #[must_use]
    pub fn lost_events(&self) -> u64 {
        self.lost_events.load(Ordering::Relaxed)
    }

    /// The bound local address.
    ///
    /// # Errors
    ///
    /// Propagates the underlying socket's `local_addr` I/O error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// A clone of the bound socket handle, for a [`crate::Sender`] that
    /// replies from the same port it receives on.
    #[must_use]
    pub fn socket_handle(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Spawn the worker pool and a periodic chunk-cleanup task. Returns a
    /// receiver yielding each fully reassembled [`Arrival`] together with
    /// every spawned task's [`tokio::task::JoinHandle`], so a supervisor
    /// can await clean shutdown after signalling the shared cancel token.
    ///
    /// Workers run a cooperative receive loop: the blocking `recv_from`
    /// (with [`RECEIVE_TIMEOUT`]) and the output channel send are this
    /// reactor's two suspension points. They run in parallel; any
    /// serialization needed downstream (e.g. the priority buffer's insert)
    /// is the scheduler's responsibility, not the reactor's.
    pub fn spawn(self) -> (mpsc::Receiver<Arrival>, Vec<tokio::task::JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(256);
        let socket = self.socket;
        let reassembler = self.reassembler;
        let cancel = self.cancel;
        let lost_events = self.lost_events;
        let mut handles = Vec::with_capacity(self.worker_count + 1);

        for worker_id in 0..self.worker_count {
            let socket = Arc::clone(&socket);
            let reassembler = Arc::clone(&reassembler);
            let cancel = cancel.clone();
            let lost_events = Arc::clone(&lost_events);
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                receive_loop(worker_id, socket, reassembler, cancel, lost_events, tx).await;
            }));
        }

        let cleanup_reassembler = Arc::clone(&reassembler);
        let cleanup_cancel = cancel.clone();
        let cleanup_lost = Arc::clone(&lost_events);
        handles.push(tokio::spawn(async move {
            cleanup_loop(cleanup_reassembler, cleanup_cancel, cleanup_lost).await;
        }));

        (rx, handles)
    }
}

async fn receive_loop(
    worker_id: usize,
    socket: Arc<UdpSocket>,
    reassembler: Arc<ChunkReassembler>,
    cancel: CancelToken,
    lost_events: Arc<AtomicU64>,
    tx: mpsc::Sender<Arrival>,
) {
    let mut buf = vec![0u8; 65_536];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(worker_id, "reactor worker stopping");
                return;
            }
            received = tokio::time::timeout(RECEIVE_TIMEOUT, socket.recv_from(&mut buf)) => {
                let Ok(received) = received else {
                    continue; // timeout: loop back to recheck cancel
                };
                let Ok((n, from)) = received else {
                    continue;
                };

                let Ok(text) = decode_datagram(&buf[..n]) else {
                    warn!(worker_id, %from, "gzip decompression failed, dropping datagram");
                    lost_events.fetch_add(1, Ordering::Relaxed);
                    continue;
                };

                if looks_like_chunk(&text) {
                    let Ok(chunk) = parse_chunk(&text) else {
                        warn!(worker_id, %from, "malformed chunk envelope, dropping");
                        lost_events.fetch_add(1, Ordering::Relaxed);
                        continue;
                    };
                    match reassembler.feed(&chunk) {
                        FeedOutcome::Complete(reassembled) => {
                            if tx.send(Arrival { text: reassembled, from }).await.is_err() {
                                return;
                            }
                        }
                        FeedOutcome::Incomplete => {}
                        FeedOutcome::Ignored => {
                            warn!(worker_id, %from, chunk_index = chunk.chunk_index, "duplicate or out-of-range chunk index");
                        }
                    }
                } else if tx.send(Arrival { text, from }).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn cleanup_loop(reassembler: Arc<ChunkReassembler>, cancel: CancelToken, lost_events: Arc<AtomicU64>) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(CLEANUP_INTERVAL) => {
                let evicted = reassembler.sweep_expired();
                if evicted > 0 {
                    lost_events.fetch_add(evicted as u64, Ordering::Relaxed);
                    debug!(evicted, "swept expired chunk buffers");
                }
            }
        }
    }
}
