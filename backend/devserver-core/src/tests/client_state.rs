use crate::client::{BuildStatus, ClientAction, ClientOptions, ClientState};

use models::{BuildMessage, OverlayPolicy, ServerMessage};

fn hash(value: &str) -> ServerMessage {
    ServerMessage::Hash(value.to_string())
}

/// Client that already loaded build `h1`.
fn loaded(options: ClientOptions) -> ClientState {
    let mut state = ClientState::new(options);
    state.handle(hash("h1"));
    state.handle(ServerMessage::Ok);
    state
}

/// **VALUE**: The first `ok` a client sees never reloads the page.
///
/// **WHY THIS MATTERS**: Every connection receives the current status on
/// connect. Reloading on it would loop forever.
///
/// **BUG THIS CATCHES**: Would catch a reload decision that treats "no
/// previous hash" as "hash changed".
#[test]
fn given_fresh_client_when_first_ok_then_no_reload() {
    // GIVEN: A client with no build seen yet
    let mut state = ClientState::new(ClientOptions::default());

    // WHEN: The initial build arrives
    assert!(state.handle(hash("h1")).is_empty());
    let actions = state.handle(ServerMessage::Ok);

    // THEN: Nothing is reloaded
    assert!(actions.is_empty());
    assert_eq!(state.status(), BuildStatus::Ok);
    assert_eq!(state.current_hash(), Some("h1"));
}

#[test]
fn given_hot_enabled_when_new_hash_ok_then_applies_hot_update() {
    let mut state = loaded(ClientOptions::default());

    state.handle(hash("h2"));
    let actions = state.handle(ServerMessage::Ok);

    assert_eq!(actions, vec![ClientAction::ApplyHotUpdate("h2".to_string())]);
}

#[test]
fn given_only_live_reload_when_new_hash_ok_then_reloads() {
    let mut state = loaded(ClientOptions {
        hot: false,
        ..ClientOptions::default()
    });

    state.handle(hash("h2"));
    let actions = state.handle(ServerMessage::Ok);

    assert_eq!(actions, vec![ClientAction::Reload]);
}

#[test]
fn given_reloading_disabled_when_new_hash_ok_then_nothing_happens() {
    let mut state = loaded(ClientOptions {
        hot: false,
        live_reload: false,
        ..ClientOptions::default()
    });

    state.handle(hash("h2"));

    assert!(state.handle(ServerMessage::Ok).is_empty());
}

#[test]
fn given_rebuild_when_invalid_then_marks_stale() {
    let mut state = loaded(ClientOptions::default());

    let actions = state.handle(ServerMessage::Invalid);

    assert_eq!(actions, vec![ClientAction::MarkStale]);
    assert_eq!(state.status(), BuildStatus::Building);
}

#[test]
fn given_rebuild_when_still_ok_then_no_action_and_status_restored() {
    let mut state = loaded(ClientOptions::default());
    state.handle(ServerMessage::Invalid);

    let actions = state.handle(ServerMessage::StillOk);

    assert!(actions.is_empty());
    assert_eq!(state.status(), BuildStatus::Ok);
}

/// **VALUE**: Warnings that precede errors neither reload nor steal the
/// overlay from the errors.
///
/// **BUG THIS CATCHES**: Would catch `preventReloading` being ignored, which
/// reloads the page into a broken build.
#[test]
fn given_warnings_with_prevent_reloading_when_handled_then_no_reload() {
    // GIVEN: A loaded client and a new build with warnings and errors
    let mut state = loaded(ClientOptions::default());
    state.handle(hash("h2"));

    // WHEN: The warnings announce that errors follow
    let warnings = state.handle(ServerMessage::Warnings {
        warnings: vec![BuildMessage::new("W1")],
        prevent_reloading: true,
    });
    let errors = state.handle(ServerMessage::Errors(vec![BuildMessage::new("E1")]));

    // THEN: No reload, and the overlay shows the errors
    assert!(warnings.is_empty());
    assert_eq!(
        errors,
        vec![ClientAction::ShowErrors(vec![BuildMessage::new("E1")])]
    );
    assert_eq!(state.status(), BuildStatus::Errors);
    assert!(state.overlay_visible());
}

#[test]
fn given_warnings_only_when_handled_then_overlay_and_hot_update() {
    let mut state = loaded(ClientOptions::default());
    state.handle(hash("h2"));

    let actions = state.handle(ServerMessage::Warnings {
        warnings: vec![BuildMessage::new("W1")],
        prevent_reloading: false,
    });

    assert_eq!(
        actions,
        vec![
            ClientAction::ShowWarnings(vec![BuildMessage::new("W1")]),
            ClientAction::ApplyHotUpdate("h2".to_string()),
        ]
    );
}

#[test]
fn given_overlay_for_errors_only_when_warnings_then_overlay_stays_hidden() {
    let mut state = loaded(ClientOptions {
        overlay: OverlayPolicy::Custom {
            errors: true,
            warnings: false,
        },
        ..ClientOptions::default()
    });
    state.handle(hash("h2"));

    let actions = state.handle(ServerMessage::Warnings {
        warnings: vec![BuildMessage::new("W1")],
        prevent_reloading: false,
    });

    assert_eq!(actions, vec![ClientAction::ApplyHotUpdate("h2".to_string())]);
    assert!(!state.overlay_visible());
}

#[test]
fn given_errors_shown_when_fixed_build_ok_then_hides_overlay_and_updates() {
    // GIVEN: A client showing errors for h2
    let mut state = loaded(ClientOptions::default());
    state.handle(hash("h2"));
    state.handle(ServerMessage::Errors(vec![BuildMessage::new("E1")]));

    // WHEN: A fixed build h3 arrives
    state.handle(hash("h3"));
    let actions = state.handle(ServerMessage::Ok);

    // THEN: Overlay hidden, then the update is applied
    assert_eq!(
        actions,
        vec![
            ClientAction::HideOverlay,
            ClientAction::ApplyHotUpdate("h3".to_string()),
        ]
    );
}

#[test]
fn given_overlay_disabled_when_errors_then_no_overlay() {
    let mut state = loaded(ClientOptions {
        overlay: OverlayPolicy::Disabled,
        ..ClientOptions::default()
    });

    let actions = state.handle(ServerMessage::Errors(vec![BuildMessage::new("E1")]));

    assert!(actions.is_empty());
}

#[test]
fn given_live_reload_when_static_changed_then_reloads() {
    let mut state = ClientState::new(ClientOptions::default());

    let actions = state.handle(ServerMessage::StaticChanged("public/app.css".to_string()));

    assert_eq!(actions, vec![ClientAction::Reload]);
}

#[test]
fn given_live_reload_disabled_by_handshake_when_static_changed_then_ignored() {
    // GIVEN: The hub announced liveReload = false
    let mut state = ClientState::new(ClientOptions::default());
    state.handle(ServerMessage::LiveReload(false));

    // WHEN: A static file changes
    let actions = state.handle(ServerMessage::StaticChanged("public/app.css".to_string()));

    // THEN: Nothing happens
    assert!(actions.is_empty());
    assert!(!state.options().live_reload);
}

#[test]
fn given_same_hash_again_when_ok_then_no_reload() {
    let mut state = loaded(ClientOptions::default());

    state.handle(hash("h1"));

    assert!(state.handle(ServerMessage::Ok).is_empty());
}
