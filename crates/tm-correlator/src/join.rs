// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-parent join accumulators: fill one slot per branch, release a merged
//! token once every branch has arrived.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use tm_core::{Token, TokenId};
use tracing::warn;

/// Outcome of offering one branch arrival to the [`JoinCorrelator`].
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// Not every branch has arrived yet.
    Pending,
    /// Every branch arrived; this is the merged token to route onward.
    Merged(Token),
    /// The accumulator for this parent was discarded because one of its
    /// branches expired before quorum was reached.
    TimedOut(TokenId),
}

struct Accumulator {
    slots: BTreeMap<u32, Token>,
}

impl Accumulator {
    fn new() -> Self {
        Self { slots: BTreeMap::new() }
    }

    fn has_expired_slot(&self, now_ms: i64) -> bool {
        self.slots.values().any(|t| t.is_expired(now_ms))
    }

    fn merge(self, parent_id: TokenId) -> Token {
        let mut data = IndexMap::new();
        let mut version = String::new();
        let mut not_after = i64::MIN;
        let mut workflow_start_time = 0;
        let mut current_place = String::new();
        for (branch, token) in &self.slots {
            for (k, v) in &token.data {
                data.insert(format!("branch{branch}.{k}"), v.clone());
            }
            version = token.version.clone();
            not_after = not_after.max(token.not_after);
            workflow_start_time = token.workflow_start_time;
            current_place = token.current_place.clone();
        }
        Token {
            token_id: parent_id,
            version,
            not_after,
            current_place,
            workflow_start_time,
            data,
            parent_token_id: None,
            branch_number: 0,
            fork_count: None,
        }
    }
}

/// Accumulates join branches per parent id for one place, releasing a
/// merged token once every declared branch has arrived.
pub struct JoinCorrelator {
    expected_branches: u32,
    accumulators: HashMap<TokenId, Accumulator>,
}

impl JoinCorrelator {
    /// Create a correlator expecting `expected_branches` arrivals per
    /// parent id before releasing a merged token.
    #[must_use]
    pub fn new(expected_branches: u32) -> Self {
        Self {
            expected_branches,
            accumulators: HashMap::new(),
        }
    }

    /// Offer one branch arrival. `join_id` is the header's `joinId` when
    /// present, else the parent id is derived from the token's own
    /// lineage via [`Token::join_parent_id`].
    pub fn offer(&mut self, token: Token, join_id: Option<TokenId>, now_ms: i64) -> JoinOutcome {
        let parent_id = join_id.unwrap_or_else(|| token.join_parent_id());
        let branch = token.branch_number;

        if token.is_expired(now_ms) {
            self.accumulators.remove(&parent_id);
            return JoinOutcome::TimedOut(parent_id);
        }

        let entry = self.accumulators.entry(parent_id).or_insert_with(Accumulator::new);
        if entry.has_expired_slot(now_ms) {
            self.accumulators.remove(&parent_id);
            return JoinOutcome::TimedOut(parent_id);
        }

        if entry.slots.insert(branch, token).is_some() {
            warn!(parent_id, branch, "duplicate join branch replaced (last write wins)");
        }

        if entry.slots.len() as u32 >= self.expected_branches {
            let accumulator = self.accumulators.remove(&parent_id).expect("just inserted");
            JoinOutcome::Merged(accumulator.merge(parent_id))
        } else {
            JoinOutcome::Pending
        }
    }

    /// Discard every accumulator with at least one expired branch, per the
    /// invariant that join timeouts are swept rather than retried.
    pub fn sweep_expired(&mut self, now_ms: i64) -> Vec<TokenId> {
        let expired: Vec<TokenId> = self
            .accumulators
            .iter()
            .filter(|(_, acc)| acc.has_expired_slot(now_ms))
            .map(|(parent_id, _)| *parent_id)
            .collect();
        for parent_id in &expired {
            self.accumulators.remove(parent_id);
        }
        expired
    }

    /// Number of parent ids with at least one branch buffered.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.accumulators.len()
    }
}
