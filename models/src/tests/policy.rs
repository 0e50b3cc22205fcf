use crate::{OverlayPolicy, ReconnectPolicy};

use serde_json::json;

/// **VALUE**: Verifies the loose JSON forms clients are configured with.
///
/// **WHY THIS MATTERS**: `reconnect: true` means "always", `false` and `0` both mean
/// "never". Mixing these up turns a disabled client into one that hammers the server.
#[test]
fn given_reconnect_json_forms_when_deserialized_then_maps_to_policy() {
    let cases = [
        (json!(true), ReconnectPolicy::Always),
        (json!(false), ReconnectPolicy::Disabled),
        (json!(0), ReconnectPolicy::Disabled),
        (json!(3), ReconnectPolicy::Limited(3)),
    ];

    for (value, expected) in cases {
        let policy: ReconnectPolicy =
            serde_json::from_value(value.clone()).expect("valid reconnect value");
        assert_eq!(policy, expected, "for {value}");
    }
}

#[test]
fn given_reconnect_policy_when_checking_retries_then_respects_limit() {
    assert!(!ReconnectPolicy::Disabled.allows_retry(0));
    assert!(ReconnectPolicy::Limited(2).allows_retry(1));
    assert!(!ReconnectPolicy::Limited(2).allows_retry(2));
    assert!(ReconnectPolicy::Always.allows_retry(u32::MAX));
}

#[test]
fn given_overlay_object_with_missing_keys_when_deserialized_then_defaults_to_shown() {
    let policy: OverlayPolicy =
        serde_json::from_value(json!({ "warnings": false })).expect("valid overlay value");

    assert_eq!(
        policy,
        OverlayPolicy::Custom {
            errors: true,
            warnings: false
        }
    );
    assert!(policy.shows_errors());
    assert!(!policy.shows_warnings());
}

#[test]
fn given_disabled_overlay_when_queried_then_shows_nothing() {
    let policy: OverlayPolicy = serde_json::from_value(json!(false)).expect("valid");

    assert!(!policy.is_enabled());
    assert_eq!(serde_json::to_value(policy).expect("serializable"), json!(false));
}
