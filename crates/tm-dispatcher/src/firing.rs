// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-place firing algorithm: business handler invocation, response
//! enrichment, routing table consultation, and fork/join envelope
//! construction. Pure and synchronous so it is testable without a runtime;
//! `lib.rs` wires it into the async dispatch loop.

use indexmap::IndexMap;

use tm_codec::builder::fork_children;
use tm_codec::router::{resolve_arcs, RouteOutcome};
use tm_codec::{branch_attribute_name, build_envelope, CodecError, EnvelopeFields, DEFAULT_ATTRIBUTE_NAME};
use tm_core::{Envelope, RoutingTable, TransitionKind};
use tm_error::{ErrorCode, PlaceError};
use tm_resolver::{Destination, ServiceResolver};

use crate::handler::{BusinessHandler, HandlerOutcome};

/// One envelope ready to hand to the send path, plus the destination it
/// resolved to.
pub struct Outbound {
    /// The UTF-8 XML envelope.
    pub envelope_xml: String,
    /// Where to send it.
    pub destination: Destination,
    /// Correlation id for the reactor's chunk reassembly on the far end.
    pub correlation_id: String,
}

/// Everything produced by firing one popped entry.
pub struct FiringResult {
    /// Zero or more outbound envelopes, ready to send.
    pub outbound: Vec<Outbound>,
    /// A short machine-readable outcome tag for the event log.
    pub outcome: &'static str,
}

/// Run steps 3-8 of the firing loop against one popped envelope.
///
/// # Errors
///
/// Returns a [`PlaceError`] if fork fan-out is invalid, envelope encoding
/// fails, or the resolver has no destination for a successor.
pub fn fire(
    envelope: &Envelope,
    handler: &dyn BusinessHandler,
    routing_table: &RoutingTable,
    resolver: &dyn ServiceResolver,
    now_ms: i64,
) -> Result<FiringResult, PlaceError> {
    if envelope.token.is_expired(now_ms) {
        return Ok(FiringResult { outbound: vec![], outcome: "expired" });
    }

    let outcome = handler.process(&envelope.token.data);

    let (response_data, routing_path, handler_failed) = match &outcome {
        HandlerOutcome::Structured(data) => (data.clone(), None, false),
        HandlerOutcome::Fragment(text) => {
            let mut data = IndexMap::new();
            data.insert("result".to_string(), text.clone());
            (data, None, false)
        }
        HandlerOutcome::Routed { routing_path, data } => (data.clone(), Some(routing_path.clone()), false),
        HandlerOutcome::Error(message) => {
            let mut data = IndexMap::new();
            data.insert("error".to_string(), message.clone());
            (data, Some("error".to_string()), true)
        }
    };

    let mut enriched = envelope.token.clone();
    for (k, v) in &response_data {
        enriched.data.insert(k.clone(), v.clone());
    }

    let place = envelope.token.current_place.as_str();
    let route_outcome = resolve_arcs(routing_table, place, routing_path.as_deref());

    let arcs = match route_outcome {
        RouteOutcome::NoArcs => {
            return Ok(FiringResult {
                outbound: vec![],
                outcome: if handler_failed { "handler_error_dropped" } else { "no_route" },
            });
        }
        RouteOutcome::Unmatched => return Ok(FiringResult { outbound: vec![], outcome: "unmatched" }),
        RouteOutcome::Matched(arcs) => arcs,
    };

    let mut outbound = Vec::new();
    for arc in arcs {
        let target = arc.target_place.as_str();
        match arc.kind {
            TransitionKind::Fork => {
                let n = arc.fan.unwrap_or(1);
                let children = fork_children(&enriched, n, target)
                    .map_err(|e| PlaceError::new(ErrorCode::ForkOverflow, e.to_string()))?;
                for child in &children {
                    let xml = build_envelope(EnvelopeFields {
                        service_name: target,
                        operation: "process",
                        sequence_id: envelope.header.sequence_id,
                        rule_base_version: envelope.header.rule_base_version.as_str(),
                        attribute_name: branch_attribute_name(child.branch_number),
                        token: child,
                        join_id: Some(enriched.token_id),
                        priortise_sid: envelope.header.priortise_sid,
                        monitor_data: None,
                    })
                    .map_err(codec_err)?;
                    let destination = resolver.resolve(target, "process")?;
                    outbound.push(Outbound { envelope_xml: xml, destination, correlation_id: child.token_id.to_string() });
                }
            }
            TransitionKind::Join => {
                let branch = arc.fan.unwrap_or(1);
                let xml = build_envelope(EnvelopeFields {
                    service_name: target,
                    operation: "process",
                    sequence_id: envelope.header.sequence_id,
                    rule_base_version: envelope.header.rule_base_version.as_str(),
                    attribute_name: branch_attribute_name(branch),
                    token: &enriched,
                    join_id: Some(enriched.token_id),
                    priortise_sid: envelope.header.priortise_sid,
                    monitor_data: None,
                })
                .map_err(codec_err)?;
                let destination = resolver.resolve(target, "process")?;
                outbound.push(Outbound { envelope_xml: xml, destination, correlation_id: enriched.token_id.to_string() });
            }
            TransitionKind::Edge | TransitionKind::Decision => {
                let mut routed = enriched.clone();
                routed.current_place = target.to_string();
                let xml = build_envelope(EnvelopeFields {
                    service_name: target,
                    operation: "process",
                    sequence_id: envelope.header.sequence_id,
                    rule_base_version: envelope.header.rule_base_version.as_str(),
                    attribute_name: DEFAULT_ATTRIBUTE_NAME.to_string(),
                    token: &routed,
                    join_id: None,
                    priortise_sid: envelope.header.priortise_sid,
                    monitor_data: None,
                })
                .map_err(codec_err)?;
                let destination = resolver.resolve(target, "process")?;
                outbound.push(Outbound { envelope_xml: xml, destination, correlation_id: routed.token_id.to_string() });
            }
        }
    }

    Ok(FiringResult {
        outbound,
        outcome: if handler_failed { "handler_error" } else { "dispatched" },
    })
}

fn codec_err(e: CodecError) -> PlaceError {
    PlaceError::new(ErrorCode::MalformedEnvelope, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_core::{Header, JoinAttribute, MonitorData, RoutingArc, ServiceRef, Token};
    use tm_resolver::StaticResolver;

    fn envelope(sequence_id: u64, not_after: i64) -> Envelope {
        Envelope {
            header: Header {
                sequence_id,
                rule_base_version: "rb1".into(),
                priortise_sid: false,
                monitor_incoming_events: false,
                join_id: None,
            },
            service: ServiceRef { name: "P1".into(), operation: "process".into() },
            join_attribute: JoinAttribute {
                attribute_name: "token".into(),
                attribute_value: "{}".into(),
                not_after,
                status: String::new(),
            },
            monitor_data: MonitorData::default(),
            token: Token {
                token_id: 1_000_000,
                version: "v001".into(),
                not_after,
                current_place: "P1".into(),
                workflow_start_time: 1,
                data: IndexMap::from([("k".to_string(), "v".to_string())]),
                parent_token_id: None,
                branch_number: 0,
                fork_count: None,
            },
        }
    }

    fn resolver_with(place: &str) -> StaticResolver {
        StaticResolver::new().with_route(
            place,
            "process",
            Destination { channel_id: "ip0".into(), host: "127.0.0.1".into(), base_port: 1 },
        )
    }

    #[test]
    fn expired_token_is_dropped_without_firing() {
        let env = envelope(1, -1);
        let table = RoutingTable::new();
        let resolver = StaticResolver::new();
        let result = fire(&env, &crate::handler::EchoHandler, &table, &resolver, 0).unwrap();
        assert_eq!(result.outcome, "expired");
        assert!(result.outbound.is_empty());
    }

    #[test]
    fn edge_arc_produces_one_outbound_envelope() {
        let env = envelope(1, 9999);
        let mut table = RoutingTable::new();
        table.insert("P1".into(), vec![RoutingArc { kind: TransitionKind::Edge, target_place: "P2".into(), decision_value: String::new(), fan: None }]);
        let resolver = resolver_with("P2");
        let result = fire(&env, &crate::handler::EchoHandler, &table, &resolver, 0).unwrap();
        assert_eq!(result.outcome, "dispatched");
        assert_eq!(result.outbound.len(), 1);
        assert!(result.outbound[0].envelope_xml.contains("P2"));
    }

    #[test]
    fn fork_arc_produces_one_envelope_per_branch() {
        let env = envelope(1, 9999);
        let mut table = RoutingTable::new();
        table.insert("P1".into(), vec![RoutingArc { kind: TransitionKind::Fork, target_place: "P2".into(), decision_value: String::new(), fan: Some(3) }]);
        let resolver = resolver_with("P2");
        let result = fire(&env, &crate::handler::EchoHandler, &table, &resolver, 0).unwrap();
        assert_eq!(result.outbound.len(), 3);
    }

    #[test]
    fn no_route_for_dropped_place_returns_empty() {
        let env = envelope(1, 9999);
        let table = RoutingTable::new();
        let resolver = StaticResolver::new();
        let result = fire(&env, &crate::handler::EchoHandler, &table, &resolver, 0).unwrap();
        assert_eq!(result.outcome, "no_route");
    }

    #[test]
    fn routed_outcome_picks_the_matching_decision_arc() {
        let env = envelope(1, 9999);
        let mut table = RoutingTable::new();
        table.insert(
            "P1".into(),
            vec![
                RoutingArc { kind: TransitionKind::Decision, target_place: "P_YES".into(), decision_value: "yes".into(), fan: None },
                RoutingArc { kind: TransitionKind::Decision, target_place: "P_NO".into(), decision_value: "no".into(), fan: None },
            ],
        );
        let resolver = resolver_with("P_YES");
        let handler = crate::handler::FnHandler(|_: &IndexMap<String, String>| HandlerOutcome::Routed {
            routing_path: "yes".into(),
            data: IndexMap::new(),
        });
        let result = fire(&env, &handler, &table, &resolver, 0).unwrap();
        assert_eq!(result.outbound.len(), 1);
        assert!(result.outbound[0].envelope_xml.contains("P_YES"));
    }
}
