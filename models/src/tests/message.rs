use crate::{BuildMessage, ModelError, OverlayPolicy, ReconnectPolicy, ServerMessage};

use serde_json::{Value, json};

fn to_value(message: &ServerMessage) -> Value {
    let text = message.to_json().expect("serializable");
    serde_json::from_str(&text).expect("valid JSON")
}

/// **VALUE**: Verifies the exact wire shape of payload-less messages.
///
/// **WHY THIS MATTERS**: Browser clients switch on `type` and treat any extra keys as
/// payload. `invalid` must serialize as `{"type":"invalid"}` with no `data` or `params`.
///
/// **BUG THIS CATCHES**: Would catch if `skip_serializing_if` is dropped and `null`
/// fields start appearing on the wire.
#[test]
fn given_invalid_message_when_serialized_then_has_only_type() {
    // GIVEN: An invalid message
    let message = ServerMessage::Invalid;

    // WHEN: Serializing
    let value = to_value(&message);

    // THEN: Only the type key is present
    assert_eq!(value, json!({ "type": "invalid" }));
}

#[test]
fn given_still_ok_message_when_serialized_then_uses_hyphenated_type() {
    assert_eq!(to_value(&ServerMessage::StillOk), json!({ "type": "still-ok" }));
}

/// **VALUE**: Verifies that `preventReloading` travels in `params`, not in `data`.
///
/// **WHY THIS MATTERS**: Clients read the flag from `params.preventReloading` to decide
/// whether a warnings message may trigger a reload. If it moves, builds with errors
/// would reload the page and wipe the error overlay.
#[test]
fn given_warnings_with_errors_when_serialized_then_sets_prevent_reloading_param() {
    // GIVEN: Warnings that accompany errors
    let message = ServerMessage::Warnings {
        warnings: vec![BuildMessage::new("unused variable").with_file("src/app.js")],
        prevent_reloading: true,
    };

    // WHEN: Serializing
    let value = to_value(&message);

    // THEN: The flag is in params and the diagnostics in data
    assert_eq!(
        value,
        json!({
            "type": "warnings",
            "data": [{ "message": "unused variable", "file": "src/app.js" }],
            "params": { "preventReloading": true }
        })
    );
}

#[test]
fn given_warnings_without_errors_when_serialized_then_omits_params() {
    let message = ServerMessage::Warnings {
        warnings: vec![BuildMessage::new("deprecated API")],
        prevent_reloading: false,
    };

    let value = to_value(&message);

    assert!(value.get("params").is_none(), "params should be omitted");
}

/// **VALUE**: Verifies that every variant decodes back to itself.
///
/// **WHY THIS MATTERS**: The reconnecting client parses exactly what the hub emits.
/// A variant that does not survive the trip would be dropped by every client.
#[test]
fn given_every_variant_when_round_tripped_then_decodes_to_same_message() {
    // GIVEN: One message of each type
    let messages = vec![
        ServerMessage::Invalid,
        ServerMessage::Hash(String::from("f00dcafe")),
        ServerMessage::Ok,
        ServerMessage::StillOk,
        ServerMessage::Warnings {
            warnings: vec![BuildMessage::new("w").with_module_name("./src/a.js")],
            prevent_reloading: true,
        },
        ServerMessage::Errors(vec![BuildMessage::new("e")]),
        ServerMessage::StaticChanged(String::from("public/index.html")),
        ServerMessage::Hot(true),
        ServerMessage::LiveReload(false),
        ServerMessage::Reconnect(ReconnectPolicy::Limited(5)),
        ServerMessage::Overlay(OverlayPolicy::Custom {
            errors: true,
            warnings: false,
        }),
    ];

    for message in messages {
        // WHEN: Serializing and parsing again
        let text = message.to_json().expect("serializable");
        let decoded = ServerMessage::from_json(&text).expect("decodable");

        // THEN: Same message
        assert_eq!(decoded, message, "round trip of {}", message.kind());
    }
}

#[test]
fn given_unknown_type_when_decoded_then_returns_decode_error() {
    let result = ServerMessage::from_json(r#"{"type":"progress-update","data":{}}"#);

    match result {
        Err(ModelError::Decode { message, .. }) => {
            assert!(message.contains("progress-update"));
        }
        other => panic!("Expected decode error, got {other:?}"),
    }
}

#[test]
fn given_hash_without_data_when_decoded_then_returns_decode_error() {
    let result = ServerMessage::from_json(r#"{"type":"hash"}"#);

    assert!(matches!(result, Err(ModelError::Decode { .. })));
}
