// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-config
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tm_core::validate::validate_place_config;
use tm_core::PlaceConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent a place host from starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No remote host override was configured; the reactor binds to
    /// loopback only, which is fine for a single-host deployment but not a
    /// distributed one.
    NoRemoteHost,
    /// `pool_size` is unusually large for the declared `max_queue`.
    OversizedPool {
        /// Configured worker pool size.
        pool_size: usize,
        /// Configured buffer capacity.
        max_queue: usize,
    },
    /// A declared place has no inbound operations beyond the default.
    MinimalPlace {
        /// Name of the place.
        place: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::NoRemoteHost => {
                write!(f, "service.remote.host is unset; reactor binds to loopback only")
            }
            ConfigWarning::OversizedPool { pool_size, max_queue } => {
                write!(f, "pool_size ({pool_size}) exceeds max_queue ({max_queue}); extra workers will starve")
            }
            ConfigWarning::MinimalPlace { place } => {
                write!(f, "place '{place}' declares no operations beyond the default")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Reactor-wide settings shared by every place on a host. Corresponds to the
/// deploy-time `[reactor]` TOML table, with environment overrides applied on
/// top.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReactorSettings {
    /// Bounded per-place buffer capacity (`MAXQUEUE`).
    pub max_queue: usize,
    /// Reactor worker pool size per place.
    pub pool_size: usize,
    /// Whether outbound envelopes are gzip-compressed.
    pub compression_enabled: bool,
    /// `service.remote.host`: when set, the reactor binds to all
    /// interfaces instead of loopback.
    pub remote_host: Option<String>,
    /// Socket receive timeout, milliseconds.
    pub receive_timeout_ms: u64,
    /// Interval between chunk-reassembly sweeps, milliseconds.
    pub chunk_cleanup_interval_ms: u64,
    /// Time-to-live for a partial chunk reassembly, milliseconds.
    pub chunk_ttl_ms: u64,
    /// Maximum accepted wire length for a single envelope, bytes.
    pub max_wire_length: usize,
}

impl Default for ReactorSettings {
    fn default() -> Self {
        Self {
            max_queue: 5,
            pool_size: 2,
            compression_enabled: true,
            remote_host: None,
            receive_timeout_ms: 5_000,
            chunk_cleanup_interval_ms: 10_000,
            chunk_ttl_ms: 30_000,
            max_wire_length: 4_096,
        }
    }
}

/// Top-level deployment configuration: reactor-wide settings plus the
/// static place table a [`tm_core::RoutingTable`] dispatches against.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MeshConfig {
    /// Reactor-wide settings.
    #[serde(default)]
    pub reactor: ReactorSettings,
    /// Declared places, keyed by place name.
    #[serde(default)]
    pub places: BTreeMap<String, PlaceConfig>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            reactor: ReactorSettings::default(),
            places: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`MeshConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`MeshConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<MeshConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => MeshConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`MeshConfig`].
pub fn parse_toml(content: &str) -> Result<MeshConfig, ConfigError> {
    toml::from_str::<MeshConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `TM_REMOTE_HOST` — overrides `reactor.remote_host`.
/// - `TM_MAX_QUEUE` — overrides `reactor.max_queue`.
/// - `TM_POOL_SIZE` — overrides `reactor.pool_size`.
pub fn apply_env_overrides(config: &mut MeshConfig) {
    if let Ok(val) = std::env::var("TM_REMOTE_HOST") {
        config.reactor.remote_host = Some(val);
    }
    if let Ok(val) = std::env::var("TM_MAX_QUEUE")
        && let Ok(parsed) = val.parse::<usize>()
    {
        config.reactor.max_queue = parsed;
    }
    if let Ok(val) = std::env::var("TM_POOL_SIZE")
        && let Ok(parsed) = val.parse::<usize>()
    {
        config.reactor.pool_size = parsed;
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (`max_queue == 0`, `pool_size == 0`, a place with a
/// malformed `channel_id`) are returned as a [`ConfigError::ValidationError`];
/// everything else comes back as a [`ConfigWarning`].
pub fn validate_config(config: &MeshConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if config.reactor.max_queue == 0 {
        errors.push("reactor.max_queue must be greater than zero".to_string());
    }
    if config.reactor.pool_size == 0 {
        errors.push("reactor.pool_size must be greater than zero".to_string());
    }
    if config.reactor.pool_size > config.reactor.max_queue {
        warnings.push(ConfigWarning::OversizedPool {
            pool_size: config.reactor.pool_size,
            max_queue: config.reactor.max_queue,
        });
    }
    if config.reactor.remote_host.is_none() {
        warnings.push(ConfigWarning::NoRemoteHost);
    }

    for (name, place) in &config.places {
        if let Err(place_errors) = validate_place_config(place) {
            errors.extend(place_errors.iter().map(|e| format!("place '{name}': {e}")));
        }
        if place.operations.len() <= 1 {
            warnings.push(ConfigWarning::MinimalPlace { place: name.clone() });
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over
/// `base`; the place tables are combined with overlay entries winning on
/// name collisions.
pub fn merge_configs(base: MeshConfig, overlay: MeshConfig) -> MeshConfig {
    let default_reactor = ReactorSettings::default();
    let reactor = ReactorSettings {
        max_queue: if overlay.reactor.max_queue != default_reactor.max_queue {
            overlay.reactor.max_queue
        } else {
            base.reactor.max_queue
        },
        pool_size: if overlay.reactor.pool_size != default_reactor.pool_size {
            overlay.reactor.pool_size
        } else {
            base.reactor.pool_size
        },
        compression_enabled: overlay.reactor.compression_enabled,
        remote_host: overlay.reactor.remote_host.or(base.reactor.remote_host),
        receive_timeout_ms: if overlay.reactor.receive_timeout_ms != default_reactor.receive_timeout_ms {
            overlay.reactor.receive_timeout_ms
        } else {
            base.reactor.receive_timeout_ms
        },
        chunk_cleanup_interval_ms: if overlay.reactor.chunk_cleanup_interval_ms != default_reactor.chunk_cleanup_interval_ms {
            overlay.reactor.chunk_cleanup_interval_ms
        } else {
            base.reactor.chunk_cleanup_interval_ms
        },
        chunk_ttl_ms: if overlay.reactor.chunk_ttl_ms != default_reactor.chunk_ttl_ms {
            overlay.reactor.chunk_ttl_ms
        } else {
            base.reactor.chunk_ttl_ms
        },
        max_wire_length: if overlay.reactor.max_wire_length != default_reactor.max_wire_length {
            overlay.reactor.max_wire_length
        } else {
            base.reactor.max_wire_length
        },
    };
    let mut places = base.places;
    places.extend(overlay.places);
    MeshConfig { reactor, places }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn place(channel_id: &str, max_queue: usize) -> PlaceConfig {
        PlaceConfig {
            service_name: "Svc".into(),
            operations: vec!["process".into()],
            channel_id: channel_id.into(),
            base_port: 10,
            max_queue,
        }
    }

    // -- 1. Defaults ----------------------------------------------------------

    #[test]
    fn default_reactor_settings_match_documented_constants() {
        let settings = ReactorSettings::default();
        assert_eq!(settings.max_queue, 5);
        assert_eq!(settings.pool_size, 2);
        assert!(settings.compression_enabled);
        assert_eq!(settings.receive_timeout_ms, 5_000);
        assert_eq!(settings.chunk_cleanup_interval_ms, 10_000);
        assert_eq!(settings.chunk_ttl_ms, 30_000);
        assert_eq!(settings.max_wire_length, 4_096);
    }

    #[test]
    fn default_config_is_valid_with_advisory_warnings() {
        let cfg = MeshConfig::default();
        let warnings = validate_config(&cfg).expect("default config should be valid");
        assert!(warnings.contains(&ConfigWarning::NoRemoteHost));
    }

    // -- 2. Parsing -------------------------------------------------------------

    #[test]
    fn parse_valid_toml_string() {
        let toml_str = r#"
            [reactor]
            max_queue = 10
            pool_size = 4
            remote_host = "0.0.0.0"

            [places.P1_Place]
            service_name = "P1_Service"
            operations = ["process"]
            channel_id = "ip0"
            base_port = 1
        "#;
        let cfg = parse_toml(toml_str).unwrap();
        assert_eq!(cfg.reactor.max_queue, 10);
        assert_eq!(cfg.reactor.remote_host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cfg.places.len(), 1);
        assert_eq!(cfg.places["P1_Place"].channel_id, "ip0");
    }

    #[test]
    fn parse_invalid_toml_gives_parse_error() {
        let bad = "this is [not valid toml =";
        let err = parse_toml(bad).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn empty_string_toml_parses_to_defaults() {
        let cfg = parse_toml("").unwrap();
        assert_eq!(cfg.reactor, ReactorSettings::default());
        assert!(cfg.places.is_empty());
    }

    // -- 3. Validation: hard errors ----------------------------------------------

    #[test]
    fn validation_catches_zero_max_queue() {
        let mut cfg = MeshConfig::default();
        cfg.reactor.max_queue = 0;
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("max_queue")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_catches_zero_pool_size() {
        let mut cfg = MeshConfig::default();
        cfg.reactor.pool_size = 0;
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn validation_catches_malformed_channel_id() {
        let mut cfg = MeshConfig::default();
        cfg.places.insert("P1".into(), place("not-a-channel", 5));
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("P1")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_catches_place_zero_capacity() {
        let mut cfg = MeshConfig::default();
        cfg.places.insert("P1".into(), place("ip0", 0));
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn valid_places_pass_validation() {
        let mut cfg = MeshConfig::default();
        cfg.reactor.remote_host = Some("10.0.0.5".into());
        cfg.places.insert(
            "P1".into(),
            PlaceConfig {
                service_name: "Svc".into(),
                operations: vec!["process".into(), "compensate".into()],
                channel_id: "ip0".into(),
                base_port: 1,
                max_queue: 5,
            },
        );
        let warnings = validate_config(&cfg).unwrap();
        assert!(!warnings.iter().any(|w| matches!(w, ConfigWarning::MinimalPlace { .. })));
    }

    // -- 4. Validation: advisory warnings -----------------------------------------

    #[test]
    fn oversized_pool_produces_warning() {
        let mut cfg = MeshConfig::default();
        cfg.reactor.pool_size = 20;
        cfg.reactor.max_queue = 5;
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(w, ConfigWarning::OversizedPool { .. })));
    }

    #[test]
    fn minimal_place_produces_warning() {
        let mut cfg = MeshConfig::default();
        cfg.places.insert("P1".into(), place("ip0", 5));
        let warnings = validate_config(&cfg).unwrap();
        assert!(warnings.iter().any(|w| matches!(w, ConfigWarning::MinimalPlace { .. })));
    }

    // -- 5. Env overrides ---------------------------------------------------------

    #[test]
    fn env_override_sets_remote_host() {
        std::env::set_var("TM_REMOTE_HOST", "192.168.1.1");
        let mut cfg = MeshConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.reactor.remote_host.as_deref(), Some("192.168.1.1"));
        std::env::remove_var("TM_REMOTE_HOST");
    }

    #[test]
    fn env_override_sets_max_queue() {
        std::env::set_var("TM_MAX_QUEUE", "42");
        let mut cfg = MeshConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.reactor.max_queue, 42);
        std::env::remove_var("TM_MAX_QUEUE");
    }

    #[test]
    fn malformed_env_override_is_ignored() {
        std::env::set_var("TM_MAX_QUEUE", "not-a-number");
        let mut cfg = MeshConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.reactor.max_queue, 5);
        std::env::remove_var("TM_MAX_QUEUE");
    }

    // -- 6. Merging -----------------------------------------------------------------

    #[test]
    fn merge_overlay_overrides_base_remote_host() {
        let mut base = MeshConfig::default();
        base.reactor.remote_host = Some("10.0.0.1".into());
        let mut overlay = MeshConfig::default();
        overlay.reactor.remote_host = Some("10.0.0.2".into());
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.reactor.remote_host.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn merge_preserves_base_remote_host_when_overlay_unset() {
        let mut base = MeshConfig::default();
        base.reactor.remote_host = Some("10.0.0.1".into());
        let overlay = MeshConfig::default();
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.reactor.remote_host.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn merge_combines_place_tables() {
        let mut base = MeshConfig::default();
        base.places.insert("A".into(), place("ip0", 5));
        let mut overlay = MeshConfig::default();
        overlay.places.insert("B".into(), place("ip1", 5));
        let merged = merge_configs(base, overlay);
        assert!(merged.places.contains_key("A"));
        assert!(merged.places.contains_key("B"));
    }

    #[test]
    fn merge_overlay_place_wins_on_collision() {
        let mut base = MeshConfig::default();
        base.places.insert("A".into(), place("ip0", 5));
        let mut overlay = MeshConfig::default();
        overlay.places.insert("A".into(), place("ip9", 7));
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.places["A"].channel_id, "ip9");
    }

    #[test]
    fn merge_non_default_overlay_numeric_field_wins() {
        let mut base = MeshConfig::default();
        base.reactor.max_queue = 12;
        let mut overlay = MeshConfig::default();
        overlay.reactor.max_queue = 99;
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.reactor.max_queue, 99);
    }

    // -- 7. Load from disk ------------------------------------------------------

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[reactor]\nmax_queue = 7\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.reactor.max_queue, 7);
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/mesh.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_none_returns_default() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.reactor, ReactorSettings::default());
    }

    // -- 8. Roundtrip ---------------------------------------------------------

    #[test]
    fn toml_roundtrip() {
        let mut cfg = MeshConfig::default();
        cfg.places.insert("P1".into(), place("ip0", 5));
        let serialized = toml::to_string(&cfg).unwrap();
        let deserialized: MeshConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(cfg, deserialized);
    }

    // -- 9. Display impls ----------------------------------------------------

    #[test]
    fn config_warning_display() {
        assert!(ConfigWarning::NoRemoteHost.to_string().contains("remote.host"));
        let w = ConfigWarning::OversizedPool { pool_size: 9, max_queue: 3 };
        assert!(w.to_string().contains('9'));
        let w = ConfigWarning::MinimalPlace { place: "P1".into() };
        assert!(w.to_string().contains("P1"));
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::FileNotFound { path: "/foo".into() };
        assert!(e.to_string().contains("/foo"));
        let e = ConfigError::ParseError { reason: "bad toml".into() };
        assert!(e.to_string().contains("bad toml"));
    }
}
