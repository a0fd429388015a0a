// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-host
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Health status derivation from task liveness and accumulated metrics.
pub mod health;
/// The `PlaceHost` supervisor: bind, spawn, shut down.
pub mod host;

pub use health::{evaluate, HealthCheck, HealthStatus, HealthThresholds};
pub use host::{HostError, PlaceHost};
