// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-cli
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Loading the routing-table deploy artifact and deriving a static resolver.
pub mod deploy;
/// `token-gen` argument parsing and token/envelope construction.
pub mod tokengen;
