// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-error
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Envelope / token codec errors.
    Codec,
    /// UDP reactor and chunk reassembly errors.
    Transport,
    /// Priority scheduler rejections.
    Scheduling,
    /// Service dispatcher firing errors.
    Dispatch,
    /// Fork/join correlator errors.
    Correlation,
    /// Configuration errors.
    Config,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Codec => "codec",
            Self::Transport => "transport",
            Self::Scheduling => "scheduling",
            Self::Dispatch => "dispatch",
            Self::Correlation => "correlation",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code. Each variant serialises to a
/// `SCREAMING_SNAKE_CASE` string matching the error kinds named in the
/// core's error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// XML/JSON parse failure. Datagram dropped, never buffered.
    MalformedEnvelope,
    /// Scheduler rejected an arrival because the place's buffer is full.
    BufferOverflow,
    /// `notAfter <= now` at dispatch time.
    ExpiredToken,
    /// The business handler panicked or returned an error object.
    HandlerFailure,
    /// A decision's `routing_path` matched no arc and no default exists.
    RoutingUnmatched,
    /// Fork factor exceeded the `[1..99]` branch encoding space.
    ForkOverflow,
    /// A join accumulator's branch expired before reaching quorum.
    JoinTimeout,
    /// An incomplete chunk buffer expired before reassembly completed.
    ChunkReassemblyTimeout,
    /// The service resolver had no `(host, port)` for a successor.
    ResolverMiss,
    /// Typed configuration failed validation.
    InvalidConfig,
}

impl ErrorCode {
    /// The [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::MalformedEnvelope => ErrorCategory::Codec,
            Self::BufferOverflow => ErrorCategory::Scheduling,
            Self::ExpiredToken | Self::HandlerFailure | Self::RoutingUnmatched => {
                ErrorCategory::Dispatch
            }
            Self::ForkOverflow | Self::JoinTimeout => ErrorCategory::Correlation,
            Self::ChunkReassemblyTimeout => ErrorCategory::Transport,
            Self::ResolverMiss => ErrorCategory::Dispatch,
            Self::InvalidConfig => ErrorCategory::Config,
        }
    }

    /// Whether this error kind is fatal to the dispatcher loop for the
    /// place that raised it (vs. recoverable: logged and the loop
    /// continues with the next entry).
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::ForkOverflow)
    }
}

// ---------------------------------------------------------------------------
// PlaceError
// ---------------------------------------------------------------------------

/// A single structured error raised anywhere in the token mesh core.
///
/// Carries a stable [`ErrorCode`], a human-readable message, and arbitrary
/// key-value context (e.g. `parent_id`, `branch`, `correlation_id`) useful
/// for event-log records and health-check bodies.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct PlaceError {
    /// Stable, machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Free-form context, e.g. `{"token_id": "1000000", "place": "P1"}`.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl PlaceError {
    /// Start building a [`PlaceError`] for the given code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context key-value pair, builder-style.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The [`ErrorCategory`] this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_routing_is_stable() {
        assert_eq!(ErrorCode::MalformedEnvelope.category(), ErrorCategory::Codec);
        assert_eq!(ErrorCode::BufferOverflow.category(), ErrorCategory::Scheduling);
        assert_eq!(ErrorCode::ForkOverflow.category(), ErrorCategory::Correlation);
        assert!(ErrorCode::ForkOverflow.is_fatal());
        assert!(!ErrorCode::JoinTimeout.is_fatal());
    }

    #[test]
    fn serializes_to_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::ChunkReassemblyTimeout).unwrap();
        assert_eq!(json, "\"CHUNK_REASSEMBLY_TIMEOUT\"");
    }

    #[test]
    fn context_builder_accumulates() {
        let err = PlaceError::new(ErrorCode::JoinTimeout, "branch expired")
            .with_context("parent_id", "1000000")
            .with_context("branch", "2");
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.context.get("branch").map(String::as_str), Some("2"));
    }
}
