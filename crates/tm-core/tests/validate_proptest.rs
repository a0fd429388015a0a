use indexmap::IndexMap;
use proptest::prelude::*;
use tm_core::validate::validate_token;
use tm_core::{Token, MAX_BRANCH, MIN_BRANCH};

fn token_with(branch_number: u32, parent_token_id: Option<u64>) -> Token {
    Token {
        token_id: 1_000_000 + u64::from(branch_number),
        version: "v001".into(),
        not_after: i64::MAX,
        current_place: "P1".into(),
        workflow_start_time: 0,
        data: IndexMap::new(),
        parent_token_id,
        branch_number,
        fork_count: None,
    }
}

proptest! {
    #[test]
    fn any_in_range_branch_with_parent_is_valid(branch in MIN_BRANCH..=MAX_BRANCH) {
        let token = token_with(branch, Some(1_000_000));
        prop_assert!(validate_token(&token).is_ok());
    }

    #[test]
    fn out_of_range_branch_is_always_rejected(branch in (MAX_BRANCH + 1)..10_000u32) {
        let token = token_with(branch, Some(1_000_000));
        prop_assert!(validate_token(&token).is_err());
    }

    #[test]
    fn version_strings_must_be_v_plus_three_digits(suffix in "[a-zA-Z0-9]{0,6}") {
        let mut token = token_with(0, None);
        token.version = format!("v{suffix}");
        let valid_shape = suffix.len() == 3 && suffix.bytes().all(|b| b.is_ascii_digit());
        prop_assert_eq!(validate_token(&token).is_ok(), valid_shape);
    }
}
