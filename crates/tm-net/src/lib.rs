// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-net
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! UDP transport for token mesh places: socket binding, the receive-side
//! reactor with chunk reassembly, the send-side chunking path, and the
//! cooperative cancellation token shared between them.

pub mod cancel;
pub mod chunkbuf;
pub mod reactor;
pub mod sender;

pub use cancel::CancelToken;
pub use chunkbuf::{ChunkReassembler, FeedOutcome};
pub use reactor::{Arrival, Reactor, ReactorError};
pub use sender::{SendError, Sender};
