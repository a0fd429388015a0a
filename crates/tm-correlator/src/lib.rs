// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-correlator
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod join;
pub mod state;

pub use join::{JoinCorrelator, JoinOutcome};
pub use state::{IllegalTransition, PlaceState};
