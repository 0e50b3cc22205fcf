use crate::{BuildMessage, BuildStateBuilder, ModelError};

/// **VALUE**: Verifies that diagnostics keep the order the compiler reported them in.
///
/// **WHY THIS MATTERS**: The overlay lists errors top to bottom; the first error is
/// usually the root cause. Reordering would send developers after the wrong problem.
///
/// **BUG THIS CATCHES**: Would catch if the builder stores diagnostics in a set or
/// sorts them.
#[test]
fn given_several_errors_when_building_then_preserves_order() {
    // GIVEN: Builder with three errors added one at a time
    let builder = BuildStateBuilder::default()
        .with_hash("abc123")
        .with_error("first")
        .with_error("second")
        .with_errors(["third"]);

    // WHEN: Building
    let state = builder.build().expect("valid state");

    // THEN: Errors keep insertion order
    let messages: Vec<&str> = state.errors().iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["first", "second", "third"]);
    assert!(!state.has_warnings());
}

/// **VALUE**: Verifies that a missing hash becomes the empty hash instead of an error.
///
/// **WHY THIS MATTERS**: A compiler that fails before emitting output has no hash, yet
/// the hub must still forward its errors.
#[test]
fn given_no_hash_when_building_then_uses_empty_hash() {
    // GIVEN: Builder with an error but no hash
    let builder = BuildStateBuilder::default().with_error("Module not found");

    // WHEN: Building
    let state = builder.build().expect("valid state");

    // THEN: Hash is empty and the error is kept
    assert_eq!(state.hash(), "");
    assert!(state.has_errors());
    assert!(!state.is_clean());
}

/// **VALUE**: Verifies that hashes containing whitespace are rejected.
///
/// **BUG THIS CATCHES**: Would catch if a compiler adapter passes a raw output line
/// (with trailing newline) as the hash, which clients would then embed in URLs.
#[test]
fn given_hash_with_whitespace_when_building_then_returns_validation_error() {
    // GIVEN: Builder with a hash carrying a trailing newline
    let builder = BuildStateBuilder::default().with_hash("abc123\n");

    // WHEN: Building
    let result = builder.build();

    // THEN: Validation error
    match result {
        Err(ModelError::Validation { message, .. }) => {
            assert!(message.contains("whitespace"));
        }
        other => panic!("Expected validation error, got {other:?}"),
    }
}

#[test]
fn given_empty_warning_message_when_building_then_returns_validation_error() {
    // GIVEN: Builder with an empty warning
    let builder = BuildStateBuilder::default()
        .with_hash("abc123")
        .with_warning(BuildMessage::new(""));

    // WHEN: Building
    let result = builder.build();

    // THEN: Validation error
    assert!(matches!(result, Err(ModelError::Validation { .. })));
}

#[test]
fn given_clean_build_when_building_then_reports_clean() {
    let state = BuildStateBuilder::default()
        .with_hash("abc123")
        .build()
        .expect("valid state");

    assert!(state.is_clean());
    assert_eq!(state.hash(), "abc123");
}
