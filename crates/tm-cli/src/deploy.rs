// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loads the deploy-time artifacts both binaries need: a
//! [`tm_config::MeshConfig`] and the static [`tm_core::RoutingTable`] it
//! doesn't itself carry.

use std::path::Path;

use tm_core::RoutingTable;

/// Errors loading or parsing the routing table file.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The file could not be read.
    #[error("failed to read routing table file {path}: {source}")]
    Read {
        /// Path that was requested.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file's contents did not parse as a routing table.
    #[error("failed to parse routing table as TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Read a [`RoutingTable`] from a TOML file: a table of place name to an
/// array of `[[places.P1]]`-style arc entries, the same shape
/// [`tm_core::RoutingArc`] serializes to.
///
/// # Errors
///
/// Returns [`DeployError::Read`] if the file cannot be read, or
/// [`DeployError::Parse`] if its contents don't parse as a routing table.
pub fn load_routing_table(path: &Path) -> Result<RoutingTable, DeployError> {
    let content = std::fs::read_to_string(path).map_err(|source| DeployError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Build a [`tm_resolver::StaticResolver`] from every place's own declared
/// channel: each place's operations all resolve to that place's own
/// `(channel_id, base_port)`, with `host` taken from `reactor.remote_host`
/// or loopback. This is the fallback a host without a live
/// service-discovery backend uses — the routing table and the static place
/// table are the same deployment artifact.
#[must_use]
pub fn resolver_from_places(config: &tm_config::MeshConfig) -> tm_resolver::StaticResolver {
    let host = config.reactor.remote_host.clone().unwrap_or_else(|| "127.0.0.1".to_string());
    let mut resolver = tm_resolver::StaticResolver::new();
    for place in config.places.values() {
        for operation in &place.operations {
            resolver.register(
                &place.service_name,
                operation,
                tm_resolver::Destination {
                    channel_id: place.channel_id.clone(),
                    host: host.clone(),
                    base_port: place.base_port,
                },
            );
        }
    }
    resolver
}
