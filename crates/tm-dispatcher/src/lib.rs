// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-dispatcher
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Business handler contract and the tagged outcome it returns.
pub mod handler;
/// Event log sink and per-firing record.
pub mod eventlog;
/// Pure per-entry firing algorithm: handler call, enrichment, routing.
pub mod firing;
/// The async dispatch loop tying buffer, handler, sender, and resolver together.
pub mod run;

pub use eventlog::{EventLogSink, EventRecord, TracingSink};
pub use firing::{fire, FiringResult, Outbound};
pub use handler::{BusinessHandler, EchoHandler, FnHandler, HandlerOutcome};
pub use run::{spawn, Dispatcher};
