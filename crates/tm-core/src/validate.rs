// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Token and place-config validation.

use std::fmt;

use crate::{PlaceConfig, Token, MAX_BRANCH, MIN_BRANCH};

/// An individual validation failure found in a [`Token`] or [`PlaceConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },
    /// `version` does not match `v[0-9]{3}`.
    InvalidVersion {
        /// The offending version string.
        version: String,
    },
    /// A fork child's `branch_number` is outside `[1..=99]`.
    BranchOutOfRange {
        /// The offending branch number.
        branch: u32,
    },
    /// `token_id` implies a branch but `parent_token_id` is unset, or vice versa.
    InconsistentLineage {
        /// Description of the inconsistency.
        reason: String,
    },
    /// `max_queue` is zero, which would reject every arrival.
    ZeroCapacity,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing required field: {field}"),
            Self::InvalidVersion { version } => {
                write!(f, "version does not match v[0-9]{{3}}: {version}")
            }
            Self::BranchOutOfRange { branch } => {
                write!(f, "branch number {branch} outside [1..=99]")
            }
            Self::InconsistentLineage { reason } => write!(f, "inconsistent lineage: {reason}"),
            Self::ZeroCapacity => write!(f, "max_queue must be greater than zero"),
        }
    }
}

impl std::error::Error for ValidationError {}

fn is_valid_version(version: &str) -> bool {
    let bytes = version.as_bytes();
    bytes.len() == 4 && bytes[0] == b'v' && bytes[1..].iter().all(u8::is_ascii_digit)
}

/// Validate a [`Token`]'s structural invariants.
///
/// Returns `Ok(())` when the token passes all checks, or `Err(errors)` with
/// every problem found (errors are accumulated, not short-circuited).
///
/// # Examples
///
/// ```
/// use indexmap::IndexMap;
/// use tm_core::{Token, validate::validate_token};
///
/// let token = Token {
///     token_id: 1_000_000,
///     version: "v001".into(),
///     not_after: i64::MAX,
///     current_place: "P1".into(),
///     workflow_start_time: 0,
///     data: IndexMap::new(),
///     parent_token_id: None,
///     branch_number: 0,
///     fork_count: None,
/// };
/// assert!(validate_token(&token).is_ok());
/// ```
///
/// # Errors
///
/// Returns a `Vec<ValidationError>` listing every problem found in the token.
pub fn validate_token(token: &Token) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if token.current_place.is_empty() {
        errors.push(ValidationError::MissingField {
            field: "current_place",
        });
    }

    if !is_valid_version(&token.version) {
        errors.push(ValidationError::InvalidVersion {
            version: token.version.clone(),
        });
    }

    if token.branch_number != 0 && !(MIN_BRANCH..=MAX_BRANCH).contains(&token.branch_number) {
        errors.push(ValidationError::BranchOutOfRange {
            branch: token.branch_number,
        });
    }

    match (token.branch_number, token.parent_token_id) {
        (0, Some(_)) => errors.push(ValidationError::InconsistentLineage {
            reason: "branch_number is 0 but parent_token_id is set".into(),
        }),
        (b, None) if b != 0 => errors.push(ValidationError::InconsistentLineage {
            reason: "branch_number is nonzero but parent_token_id is unset".into(),
        }),
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a [`PlaceConfig`] for completeness and consistency.
///
/// # Errors
///
/// Returns a `Vec<ValidationError>` listing every problem found.
pub fn validate_place_config(config: &PlaceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service_name.is_empty() {
        errors.push(ValidationError::MissingField {
            field: "service_name",
        });
    }
    if config.operations.is_empty() {
        errors.push(ValidationError::MissingField { field: "operations" });
    }
    if PlaceConfig::channel_number(&config.channel_id).is_none() {
        errors.push(ValidationError::MissingField { field: "channel_id" });
    }
    if config.max_queue == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn base_token() -> Token {
        Token {
            token_id: 1_000_000,
            version: "v001".into(),
            not_after: i64::MAX,
            current_place: "P1".into(),
            workflow_start_time: 0,
            data: IndexMap::new(),
            parent_token_id: None,
            branch_number: 0,
            fork_count: None,
        }
    }

    #[test]
    fn valid_root_token_passes() {
        assert!(validate_token(&base_token()).is_ok());
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut t = base_token();
        t.version = "1.0".into();
        let errs = validate_token(&t).unwrap_err();
        assert!(matches!(errs[0], ValidationError::InvalidVersion { .. }));
    }

    #[test]
    fn branch_without_parent_is_inconsistent() {
        let mut t = base_token();
        t.branch_number = 3;
        let errs = validate_token(&t).unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, ValidationError::InconsistentLineage { .. })));
    }

    #[test]
    fn branch_out_of_range_is_rejected() {
        let mut t = base_token();
        t.branch_number = 100;
        t.parent_token_id = Some(1_000_000);
        let errs = validate_token(&t).unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, ValidationError::BranchOutOfRange { .. })));
    }

    #[test]
    fn zero_capacity_place_is_rejected() {
        let cfg = PlaceConfig {
            service_name: "svc".into(),
            operations: vec!["op".into()],
            channel_id: "ip0".into(),
            base_port: 100,
            max_queue: 0,
        };
        let errs = validate_place_config(&cfg).unwrap_err();
        assert!(errs.contains(&ValidationError::ZeroCapacity));
    }
}
