// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-resolver
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tm_error::{ErrorCode, PlaceError};

/// Resolved destination for a successor token: the channel id (used in the
/// port-computation formula), the host to send to, and the base port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Channel id, e.g. `"ip1"`.
    pub channel_id: String,
    /// Destination host (IP or DNS name).
    pub host: String,
    /// Base port fed into the port-computation formula.
    pub base_port: u16,
}

impl Destination {
    /// `targetPort = 10000 + channelNumber*1000 + basePort`.
    ///
    /// Returns `None` if `channel_id` is not `ip{N}`-shaped.
    #[must_use]
    pub fn target_port(&self) -> Option<u32> {
        let channel_number = self.channel_id.strip_prefix("ip")?.parse::<u32>().ok()?;
        Some(10_000 + channel_number * 1_000 + u32::from(self.base_port))
    }
}

/// Maps a service's `(serviceName, operation)` to the [`Destination`] that
/// carries its tokens.
pub trait ServiceResolver: Send + Sync {
    /// Resolve a destination, or [`ErrorCode::ResolverMiss`] if none is
    /// registered for this pair.
    ///
    /// # Errors
    ///
    /// Returns a [`PlaceError`] with code [`ErrorCode::ResolverMiss`] when no
    /// entry is registered for `(service_name, operation)`.
    fn resolve(&self, service_name: &str, operation: &str) -> Result<Destination, PlaceError>;
}

fn key(service_name: &str, operation: &str) -> String {
    format!("{service_name}::{operation}")
}

/// A deploy-time, in-memory [`ServiceResolver`] backed by a static table.
///
/// This is the resolver a place host constructs from the same deployment
/// artifact that supplies the routing table (§4.5's Rule Deployer), and the
/// default used when no service-discovery backend is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: BTreeMap<String, Destination>,
}

impl StaticResolver {
    /// An empty resolver with no registered destinations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a destination for `(service_name, operation)`, builder-style.
    #[must_use]
    pub fn with_route(mut self, service_name: &str, operation: &str, destination: Destination) -> Self {
        self.table.insert(key(service_name, operation), destination);
        self
    }

    /// Register a destination for `(service_name, operation)` in place.
    pub fn register(&mut self, service_name: &str, operation: &str, destination: Destination) {
        self.table.insert(key(service_name, operation), destination);
    }
}

impl ServiceResolver for StaticResolver {
    fn resolve(&self, service_name: &str, operation: &str) -> Result<Destination, PlaceError> {
        self.table
            .get(&key(service_name, operation))
            .cloned()
            .ok_or_else(|| {
                PlaceError::new(ErrorCode::ResolverMiss, "no destination registered for service/operation")
                    .with_context("service_name", service_name)
                    .with_context("operation", operation)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(channel_id: &str, base_port: u16) -> Destination {
        Destination {
            channel_id: channel_id.to_string(),
            host: "127.0.0.1".to_string(),
            base_port,
        }
    }

    #[test]
    fn resolves_a_registered_route() {
        let resolver = StaticResolver::new().with_route("P2_Place", "process", dest("ip2", 50));
        let resolved = resolver.resolve("P2_Place", "process").unwrap();
        assert_eq!(resolved.target_port(), Some(12_050));
    }

    #[test]
    fn missing_route_is_resolver_miss() {
        let resolver = StaticResolver::new();
        let err = resolver.resolve("P9_Place", "process").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolverMiss);
    }

    #[test]
    fn later_registration_overwrites_earlier_one() {
        let mut resolver = StaticResolver::new();
        resolver.register("P1", "op", dest("ip0", 1));
        resolver.register("P1", "op", dest("ip1", 2));
        assert_eq!(resolver.resolve("P1", "op").unwrap().channel_id, "ip1");
    }
}
