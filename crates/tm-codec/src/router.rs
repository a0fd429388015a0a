// SPDX-License-Identifier: MIT OR Apache-2.0
//! Static routing-table consultation: picks the successor arc(s) for a
//! producing place's result.

use tm_core::{RoutingArc, RoutingTable, TransitionKind};

/// Outcome of consulting the routing table for one producing place.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome<'a> {
    /// No arcs are declared for this place; nothing to route.
    NoArcs,
    /// One or more arcs matched and should be fired.
    Matched(Vec<&'a RoutingArc>),
    /// A [`TransitionKind::Decision`] result did not match any arc and no
    /// default (empty `decision_value`) arc was declared either.
    Unmatched,
}

/// Resolve the successor arc(s) for `place`'s declared routing.
///
/// - [`TransitionKind::Edge`] and [`TransitionKind::Fork`] arcs always match.
/// - [`TransitionKind::Join`] arcs always match (the correlator decides
///   whether to actually release a merged token).
/// - [`TransitionKind::Decision`] arcs match when `routing_path` equals
///   their `decision_value` (case-sensitive); if none match, the arc with
///   an empty `decision_value` is taken as default.
#[must_use]
pub fn resolve_arcs<'a>(
    table: &'a RoutingTable,
    place: &str,
    routing_path: Option<&str>,
) -> RouteOutcome<'a> {
    let Some(arcs) = table.get(place) else {
        return RouteOutcome::NoArcs;
    };
    if arcs.is_empty() {
        return RouteOutcome::NoArcs;
    }

    let (decisions, unconditional): (Vec<&RoutingArc>, Vec<&RoutingArc>) = arcs
        .iter()
        .partition(|a| a.kind == TransitionKind::Decision);

    if decisions.is_empty() {
        return RouteOutcome::Matched(unconditional);
    }

    if let Some(path) = routing_path {
        if let Some(matched) = decisions.iter().find(|a| a.decision_value == path) {
            let mut out = unconditional;
            out.push(matched);
            return RouteOutcome::Matched(out);
        }
    }

    if let Some(default_arc) = decisions.iter().find(|a| a.decision_value.is_empty()) {
        let mut out = unconditional;
        out.push(default_arc);
        return RouteOutcome::Matched(out);
    }

    if unconditional.is_empty() {
        RouteOutcome::Unmatched
    } else {
        RouteOutcome::Matched(unconditional)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn arc(kind: TransitionKind, target: &str, decision_value: &str) -> RoutingArc {
        RoutingArc {
            kind,
            target_place: target.to_string(),
            decision_value: decision_value.to_string(),
            fan: None,
        }
    }

    #[test]
    fn edge_arc_always_matches() {
        let mut table = BTreeMap::new();
        table.insert("P1".to_string(), vec![arc(TransitionKind::Edge, "P2", "")]);
        let outcome = resolve_arcs(&table, "P1", None);
        assert!(matches!(outcome, RouteOutcome::Matched(arcs) if arcs.len() == 1));
    }

    #[test]
    fn decision_arc_matches_routing_path() {
        let mut table = BTreeMap::new();
        table.insert(
            "P1".to_string(),
            vec![
                arc(TransitionKind::Decision, "P_APPROVE", "approved"),
                arc(TransitionKind::Decision, "P_REJECT", "rejected"),
            ],
        );
        let outcome = resolve_arcs(&table, "P1", Some("rejected"));
        match outcome {
            RouteOutcome::Matched(arcs) => assert_eq!(arcs[0].target_place, "P_REJECT"),
            other => panic!("expected Matched, got {other:?}"),
        }
    }

    #[test]
    fn decision_without_match_falls_back_to_default() {
        let mut table = BTreeMap::new();
        table.insert(
            "P1".to_string(),
            vec![
                arc(TransitionKind::Decision, "P_APPROVE", "approved"),
                arc(TransitionKind::Decision, "P_DEFAULT", ""),
            ],
        );
        let outcome = resolve_arcs(&table, "P1", Some("unknown"));
        match outcome {
            RouteOutcome::Matched(arcs) => assert_eq!(arcs[0].target_place, "P_DEFAULT"),
            other => panic!("expected Matched, got {other:?}"),
        }
    }

    #[test]
    fn decision_without_match_or_default_is_unmatched() {
        let mut table = BTreeMap::new();
        table.insert(
            "P1".to_string(),
            vec![arc(TransitionKind::Decision, "P_APPROVE", "approved")],
        );
        let outcome = resolve_arcs(&table, "P1", Some("unknown"));
        assert_eq!(outcome, RouteOutcome::Unmatched);
    }

    #[test]
    fn unknown_place_has_no_arcs() {
        let table = BTreeMap::new();
        assert_eq!(resolve_arcs(&table, "P1", None), RouteOutcome::NoArcs);
    }
}
