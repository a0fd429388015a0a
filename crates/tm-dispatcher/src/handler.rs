// SPDX-License-Identifier: MIT OR Apache-2.0
//! The business handler contract: a synchronous `process` call invoked once
//! per dispatch, replacing the original system's reflection-based probing
//! of the result object with an explicit tagged outcome.

use indexmap::IndexMap;

/// What a [`BusinessHandler`] returns from one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// A plain field map merged into the response.
    Structured(IndexMap<String, String>),
    /// An opaque string result stored under a single `result` field.
    Fragment(String),
    /// A field map plus an explicit routing hint for a `Decision` arc.
    Routed {
        /// The value matched against a `Decision` arc's `decision_value`.
        routing_path: String,
        /// Field map merged into the response alongside the routing hint.
        data: IndexMap<String, String>,
    },
    /// The handler failed; `message` becomes the synthesized error
    /// response routed to the `"error"` outbound arc, if one is declared.
    Error(String),
}

/// A place's business logic: a synchronous transform of the token's
/// extracted business data into a [`HandlerOutcome`].
///
/// Handlers run on the dispatcher's thread; the host wraps the call in
/// `tokio::task::spawn_blocking` so a slow handler cannot starve the
/// reactor's own tasks (see the concurrency model).
pub trait BusinessHandler: Send + Sync {
    /// Process one token's business data.
    fn process(&self, input: &IndexMap<String, String>) -> HandlerOutcome;
}

/// A handler that echoes its input back unchanged, useful for pass-through
/// places and tests.
pub struct EchoHandler;

impl BusinessHandler for EchoHandler {
    fn process(&self, input: &IndexMap<String, String>) -> HandlerOutcome {
        HandlerOutcome::Structured(input.clone())
    }
}

/// A handler built from a plain closure, for wiring simple places without a
/// dedicated type.
pub struct FnHandler<F>(pub F)
where
    F: Fn(&IndexMap<String, String>) -> HandlerOutcome + Send + Sync;

impl<F> BusinessHandler for FnHandler<F>
where
    F: Fn(&IndexMap<String, String>) -> HandlerOutcome + Send + Sync,
{
    fn process(&self, input: &IndexMap<String, String>) -> HandlerOutcome {
        (self.0)(input)
    }
}
