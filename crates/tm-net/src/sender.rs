// SPDX-License-Identifier: MIT OR Apache-2.0
//! Outbound send path: compress (and chunk, if needed) an envelope and
//! deliver it over UDP to a resolved destination.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;

use tm_codec::chunk::split_into_chunks;
use tm_codec::compress::{encode_datagram, CompressError};

/// Fallback chunking threshold used only when a caller doesn't supply a
/// configured [`tm_config::ReactorSettings::max_wire_length`] (whose own
/// default is 4096, per the wire contract).
pub const DEFAULT_MAX_WIRE_LENGTH: usize = 4_096;

/// Errors from the outbound send path.
#[derive(Debug, Error)]
pub enum SendError {
    /// GZIP framing failed.
    #[error(transparent)]
    Compress(#[from] CompressError),
    /// Serializing a chunk envelope failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The underlying socket send failed.
    #[error("failed to send datagram: {0}")]
    Io(#[from] std::io::Error),
}

/// Sends envelope text to a destination, splitting into chunk envelopes and
/// GZIP-compressing as needed.
pub struct Sender {
    socket: Arc<UdpSocket>,
    max_wire_length: usize,
}

impl Sender {
    /// Wrap an existing bound socket for outbound use, chunking at
    /// [`DEFAULT_MAX_WIRE_LENGTH`]. Prefer [`Sender::with_max_wire_length`]
    /// when a [`tm_config::ReactorSettings`] is available.
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self::with_max_wire_length(socket, DEFAULT_MAX_WIRE_LENGTH)
    }

    /// Wrap an existing bound socket for outbound use, chunking any payload
    /// over `max_wire_length` bytes.
    #[must_use]
    pub fn with_max_wire_length(socket: Arc<UdpSocket>, max_wire_length: usize) -> Self {
        Self { socket, max_wire_length }
    }

    /// Deliver `text` to `dest`. Payloads at or under the configured chunk
    /// threshold are sent as a single (optionally GZIP-compressed)
    /// datagram; larger payloads are split into chunk envelopes sent as
    /// separate datagrams.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if compression, chunk serialization, or the
    /// underlying socket send fails.
    pub async fn send(&self, text: &str, correlation_id: &str, dest: SocketAddr) -> Result<(), SendError> {
        if text.len() <= self.max_wire_length {
            let datagram = encode_datagram(text)?;
            self.socket.send_to(&datagram, dest).await?;
            return Ok(());
        }

        let chunks = split_into_chunks(text, correlation_id, self.max_wire_length);
        for chunk in &chunks {
            let payload = serde_json::to_vec(chunk)?;
            self.socket.send_to(&payload, dest).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sends_a_small_payload_as_one_datagram() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let local = socket.local_addr().unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        let sender = Sender::new(socket);
        sender.send("hello", "corr-x", receiver_addr).await.unwrap();

        let mut buf = vec![0u8; 1024];
        let (n, from) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from, local);
    }
}
