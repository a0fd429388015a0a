// SPDX-License-Identifier: MIT OR Apache-2.0
//! The five-state machine a place's buffer/dispatcher pair moves through.

/// One place's firing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceState {
    /// No buffered arrivals; the dispatcher is parked.
    Idle,
    /// At least one arrival is buffered, awaiting dispatch.
    Buffering,
    /// The business handler is running for the entry just popped.
    Firing,
    /// The handler has returned; outbound tokens are being built and sent.
    Routing,
    /// Shutdown has been requested; no further transitions are accepted.
    Stopped,
}

/// An attempted transition that is not legal from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    /// The state the machine was in.
    pub from: PlaceState,
    /// The state the caller tried to move to.
    pub to: PlaceState,
}

impl PlaceState {
    /// First accepted arrival: `IDLE -> BUFFERING`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] unless the current state is `IDLE`.
    pub fn on_arrival(self) -> Result<Self, IllegalTransition> {
        match self {
            Self::Idle => Ok(Self::Buffering),
            other => Err(IllegalTransition { from: other, to: Self::Buffering }),
        }
    }

    /// Dispatcher pops an entry: `BUFFERING -> FIRING`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] unless the current state is `BUFFERING`.
    pub fn on_pop(self) -> Result<Self, IllegalTransition> {
        match self {
            Self::Buffering => Ok(Self::Firing),
            other => Err(IllegalTransition { from: other, to: Self::Firing }),
        }
    }

    /// The business handler returns: `FIRING -> ROUTING`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] unless the current state is `FIRING`.
    pub fn on_handler_return(self) -> Result<Self, IllegalTransition> {
        match self {
            Self::Firing => Ok(Self::Routing),
            other => Err(IllegalTransition { from: other, to: Self::Routing }),
        }
    }

    /// Outbound sends complete: `ROUTING -> BUFFERING` if more work remains,
    /// else `ROUTING -> IDLE`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] unless the current state is `ROUTING`.
    pub fn on_routed(self, buffer_non_empty: bool) -> Result<Self, IllegalTransition> {
        match self {
            Self::Routing if buffer_non_empty => Ok(Self::Buffering),
            Self::Routing => Ok(Self::Idle),
            other => Err(IllegalTransition { from: other, to: Self::Buffering }),
        }
    }

    /// Shutdown: any state moves unconditionally to `STOPPED`.
    #[must_use]
    pub fn on_shutdown(self) -> Self {
        Self::Stopped
    }
}
