use super::*;

// =============================================================================
// env_parse
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__STACKED_TEST_MISSING__", 17);
    assert_eq!(val, 17);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__STACKED_TEST_VALID__", "250") };
    let val: u64 = env_parse("__STACKED_TEST_VALID__", 0);
    assert_eq!(val, 250);
    unsafe { std::env::remove_var("__STACKED_TEST_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__STACKED_TEST_INVALID__", "two seconds") };
    let val: u64 = env_parse("__STACKED_TEST_INVALID__", 9);
    assert_eq!(val, 9);
    unsafe { std::env::remove_var("__STACKED_TEST_INVALID__") };
}

// =============================================================================
// env_string
// =============================================================================

#[test]
fn env_string_missing_is_none() {
    assert!(env_string("__STACKED_TEST_NO_STRING__").is_none());
}

#[test]
fn env_string_empty_is_none() {
    unsafe { std::env::set_var("__STACKED_TEST_EMPTY__", "") };
    assert!(env_string("__STACKED_TEST_EMPTY__").is_none());
    unsafe { std::env::remove_var("__STACKED_TEST_EMPTY__") };
}
