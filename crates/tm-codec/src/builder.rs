// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builder for constructing outbound [`Token`]s ergonomically, including
//! the fork-child and join-merge derivations the correlator needs.

use std::fmt;

use indexmap::IndexMap;
use tm_core::{Token, TokenId, MAX_BRANCH, MIN_BRANCH};

/// Errors that can occur when building a [`Token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// A required field was not set.
    MissingField(&'static str),
    /// Fork fan-out exceeds the `[1..99]` branch encoding space.
    ForkOverflow {
        /// The requested fan-out.
        requested: u32,
    },
    /// A fork parent id is not a multiple of 100.
    DirtyParentId {
        /// The offending parent id.
        parent_id: TokenId,
    },
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field: {field}"),
            Self::ForkOverflow { requested } => {
                write!(f, "fork fan-out {requested} exceeds [1..{MAX_BRANCH}]")
            }
            Self::DirtyParentId { parent_id } => {
                write!(f, "parent id {parent_id} is not a multiple of 100")
            }
        }
    }
}

impl std::error::Error for BuilderError {}

/// Ergonomic builder for a root [`Token`].
///
/// # Examples
///
/// ```
/// use tm_codec::builder::TokenBuilder;
///
/// let token = TokenBuilder::new(1_000_000, "P1")
///     .version("v001")
///     .not_after(999)
///     .workflow_start_time(1)
///     .field("amount", "42")
///     .build()
///     .unwrap();
///
/// assert_eq!(token.token_id, 1_000_000);
/// assert_eq!(token.data.get("amount").map(String::as_str), Some("42"));
/// ```
#[derive(Debug, Default)]
pub struct TokenBuilder {
    token_id: TokenId,
    current_place: String,
    version: Option<String>,
    not_after: Option<i64>,
    workflow_start_time: Option<i64>,
    data: IndexMap<String, String>,
}

impl TokenBuilder {
    /// Start a new builder for the given token id and destination place.
    #[must_use]
    pub fn new(token_id: TokenId, current_place: impl Into<String>) -> Self {
        Self {
            token_id,
            current_place: current_place.into(),
            ..Self::default()
        }
    }

    /// Set the workflow version partition.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the expiry epoch-ms.
    #[must_use]
    pub fn not_after(mut self, not_after: i64) -> Self {
        self.not_after = Some(not_after);
        self
    }

    /// Set the root workflow start epoch-ms.
    #[must_use]
    pub fn workflow_start_time(mut self, ts: i64) -> Self {
        self.workflow_start_time = Some(ts);
        self
    }

    /// Insert a business data field, preserving insertion order.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Consume the builder and produce a root [`Token`].
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::MissingField`] if `version`, `not_after`, or
    /// `workflow_start_time` was never set.
    pub fn build(self) -> Result<Token, BuilderError> {
        Ok(Token {
            token_id: self.token_id,
            version: self.version.ok_or(BuilderError::MissingField("version"))?,
            not_after: self.not_after.ok_or(BuilderError::MissingField("not_after"))?,
            current_place: self.current_place,
            workflow_start_time: self
                .workflow_start_time
                .ok_or(BuilderError::MissingField("workflow_start_time"))?,
            data: self.data,
            parent_token_id: None,
            branch_number: 0,
            fork_count: None,
        })
    }
}

/// Derive the `N` fork children of `parent`, one per branch `1..=n`.
///
/// Each child inherits `parent`'s data verbatim plus `parentTokenId`,
/// `branchNumber`, and `forkCount`.
///
/// # Errors
///
/// Returns [`BuilderError::DirtyParentId`] if `parent.token_id` is not a
/// multiple of 100, or [`BuilderError::ForkOverflow`] if `n > 99`.
pub fn fork_children(parent: &Token, n: u32, target_place: &str) -> Result<Vec<Token>, BuilderError> {
    if n > MAX_BRANCH {
        return Err(BuilderError::ForkOverflow { requested: n });
    }
    if parent.token_id % 100 != 0 {
        return Err(BuilderError::DirtyParentId {
            parent_id: parent.token_id,
        });
    }

    Ok((MIN_BRANCH..=n)
        .map(|branch| Token {
            token_id: parent.token_id + TokenId::from(branch),
            version: parent.version.clone(),
            not_after: parent.not_after,
            current_place: target_place.to_string(),
            workflow_start_time: parent.workflow_start_time,
            data: parent.data.clone(),
            parent_token_id: Some(parent.token_id),
            branch_number: branch,
            fork_count: Some(n),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_children_get_distinct_branches() {
        let parent = TokenBuilder::new(1_000_000, "P1")
            .version("v001")
            .not_after(999)
            .workflow_start_time(1)
            .build()
            .unwrap();
        let children = fork_children(&parent, 3, "P2").unwrap();
        assert_eq!(children.len(), 3);
        let branches: Vec<u32> = children.iter().map(|c| c.branch_number).collect();
        assert_eq!(branches, vec![1, 2, 3]);
        assert!(children.iter().all(|c| c.parent_token_id == Some(1_000_000)));
    }

    #[test]
    fn dirty_parent_id_is_rejected() {
        let mut parent = TokenBuilder::new(1_000_001, "P1")
            .version("v001")
            .not_after(999)
            .workflow_start_time(1)
            .build()
            .unwrap();
        parent.token_id = 1_000_001;
        let err = fork_children(&parent, 2, "P2").unwrap_err();
        assert!(matches!(err, BuilderError::DirtyParentId { .. }));
    }

    #[test]
    fn fan_out_above_99_overflows() {
        let parent = TokenBuilder::new(1_000_000, "P1")
            .version("v001")
            .not_after(999)
            .workflow_start_time(1)
            .build()
            .unwrap();
        let err = fork_children(&parent, 100, "P2").unwrap_err();
        assert!(matches!(err, BuilderError::ForkOverflow { requested: 100 }));
    }
}
