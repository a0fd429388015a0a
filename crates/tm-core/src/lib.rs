// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! tm-core
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Token and place validation.
pub mod validate;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current wire contract version string embedded in generated envelopes.
///
/// # Examples
///
/// ```
/// assert_eq!(tm_core::CONTRACT_VERSION, "tm/v1");
/// ```
pub const CONTRACT_VERSION: &str = "tm/v1";

/// Lowest allowed fork branch number.
pub const MIN_BRANCH: u32 = 1;
/// Highest allowed fork branch number — the branch-encoding space is two
/// decimal digits, so a parent id plus branch never collides with the next
/// parent's multiple-of-100 id.
pub const MAX_BRANCH: u32 = 99;

/// Unique identifier for a token within a workflow family.
///
/// Encodes fork lineage: `parent_id + branch` where `branch` is `0` for a
/// root/parent token and in `[1..=99]` for a fork child. Parent ids are
/// always multiples of 100.
pub type TokenId = u64;

/// The in-flight unit of work carried between places.
///
/// See [`crate::validate::validate_token`] for the invariants enforced
/// before a token is considered dispatchable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// Unique id within this workflow family; encodes fork lineage.
    #[serde(rename = "tokenId")]
    pub token_id: TokenId,
    /// Version string matching `v[0-9]{3}`, partitioning concurrent workflows.
    pub version: String,
    /// Epoch-ms expiry. Expired tokens are dropped without dispatch.
    #[serde(rename = "notAfter")]
    pub not_after: i64,
    /// Destination place for this datagram.
    #[serde(rename = "currentPlace")]
    pub current_place: String,
    /// Epoch-ms of root token origin; preserved across all hops. Wire name
    /// is snake_case, unlike its sibling fields — inherited from the
    /// upstream event generator's JSON shape.
    pub workflow_start_time: i64,
    /// Ordered business payload. Insertion order is preserved on the wire
    /// for reproducibility, hence [`IndexMap`] rather than a sorted map.
    #[serde(default)]
    pub data: IndexMap<String, String>,
    /// Parent token id, present on fork children.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "parentTokenId")]
    pub parent_token_id: Option<TokenId>,
    /// This token's branch number, `0` for a root/parent token.
    #[serde(default, rename = "branchNumber")]
    pub branch_number: u32,
    /// Total fork fan-out `N`, present on fork children.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "forkCount")]
    pub fork_count: Option<u32>,
}

impl Token {
    /// `true` if `branch_number == 0`, i.e. this is a root/parent token
    /// rather than a fork child.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.branch_number == 0
    }

    /// The parent id a join accumulator should key this token under:
    /// the explicit `parent_token_id` if set, else `token_id - branch_number`.
    #[must_use]
    pub fn join_parent_id(&self) -> TokenId {
        self.parent_token_id
            .unwrap_or(self.token_id - u64::from(self.branch_number))
    }

    /// `true` if `not_after` has passed relative to `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.not_after <= now_ms
    }
}

/// Header group of the wire envelope (see `tm-codec`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Header {
    /// Sequence id used by the priority scheduler.
    pub sequence_id: u64,
    /// Static routing-table version deployed by the rule deployer.
    pub rule_base_version: String,
    /// When `true`, the scheduler orders by `sequence_id` instead of
    /// arrival order.
    #[serde(default)]
    pub priortise_sid: bool,
    /// When `true`, monitor data is populated and forwarded to the event log.
    #[serde(default)]
    pub monitor_incoming_events: bool,
    /// Parent id for join-bound children; absent for non-join arcs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_id: Option<TokenId>,
}

/// Service group of the wire envelope: which place and operation this
/// token targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRef {
    /// Declared `serviceName` of the destination place.
    pub name: String,
    /// Operation within that service the token invokes.
    pub operation: String,
}

/// `joinAttribute` group of the wire envelope: carries the embedded JSON
/// token body under an attribute name that encodes branch membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinAttribute {
    /// `token` for normal arrivals, `token_branch{N}` for join branch `N`.
    pub attribute_name: String,
    /// The raw embedded JSON text (parsed separately by the codec).
    pub attribute_value: String,
    /// Epoch-ms expiry, duplicated here for quick scheduler access without
    /// a full JSON parse.
    pub not_after: i64,
    /// Free-form status string, passed through unchanged.
    #[serde(default)]
    pub status: String,
}

/// `monitorData` group of the wire envelope: timing breadcrumbs from the
/// upstream event generator, forwarded to the event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorData {
    /// Epoch-ms when the producing place began processing.
    pub process_start_time: Option<i64>,
    /// Milliseconds spent in the producing place.
    pub process_elapsed_time: Option<i64>,
    /// Epoch-ms timestamp assigned by the originating event generator.
    pub event_generator_timestamp: Option<i64>,
    /// Identifier of the originating event generator.
    pub source_event_generator: Option<String>,
}

/// A fully parsed wire envelope: header groups plus the decoded [`Token`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Header group.
    pub header: Header,
    /// Service group.
    pub service: ServiceRef,
    /// Join attribute group (carries the token body on the wire).
    pub join_attribute: JoinAttribute,
    /// Monitor data group.
    pub monitor_data: MonitorData,
    /// The decoded token body.
    pub token: Token,
}

/// Static configuration for a place, as deployed by the rule deployer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaceConfig {
    /// Declared service name for this place.
    pub service_name: String,
    /// Operations this place accepts.
    pub operations: Vec<String>,
    /// Channel id, e.g. `"ip0"`, `"ip1"` — encodes the port-formula channel number.
    pub channel_id: String,
    /// Base port used in the port-computation formula.
    pub base_port: u16,
    /// Bounded buffer capacity. Defaults to `5` (`MAXQUEUE`).
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
}

fn default_max_queue() -> usize {
    5
}

impl PlaceConfig {
    /// Parse the channel number `N` out of a channel id of the form `ip{N}`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tm_core::PlaceConfig;
    /// assert_eq!(PlaceConfig::channel_number("ip0"), Some(0));
    /// assert_eq!(PlaceConfig::channel_number("ip12"), Some(12));
    /// assert_eq!(PlaceConfig::channel_number("bogus"), None);
    /// ```
    #[must_use]
    pub fn channel_number(channel_id: &str) -> Option<u32> {
        channel_id.strip_prefix("ip")?.parse().ok()
    }

    /// Compute `targetPort = 10000 + channelNumber*1000 + basePort`.
    ///
    /// Returns `None` if `channel_id` does not match the `ip{N}` shape.
    #[must_use]
    pub fn target_port(&self) -> Option<u32> {
        let channel_number = Self::channel_number(&self.channel_id)?;
        Some(10_000 + channel_number * 1_000 + u32::from(self.base_port))
    }
}

/// One arc out of a producing place, as deployed by the rule deployer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingArc {
    /// The kind of transition this arc implements.
    pub kind: TransitionKind,
    /// Destination place id.
    pub target_place: String,
    /// For [`TransitionKind::Decision`] arcs, the `routing_path` value this
    /// arc fires on. Empty string marks the default arc.
    #[serde(default)]
    pub decision_value: String,
    /// For [`TransitionKind::Fork`] / [`TransitionKind::Join`] arcs, the
    /// fan-out `N` (successors for Fork, expected branches for Join).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan: Option<u32>,
}

/// The kind of transition an outbound arc implements. Not materialized as
/// a standalone object — implicit in the routing table that maps a
/// producing place's result to its successor(s).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Exactly one successor; unconditional.
    Edge,
    /// N successors receive branch-encoded children.
    Fork,
    /// Successor chosen by `routing_path` extracted from the business result.
    Decision,
    /// Target place whose input expects N distinct join branches.
    Join,
}

/// Static routing table: maps a producing place id to its declared arcs.
pub type RoutingTable = BTreeMap<String, Vec<RoutingArc>>;
