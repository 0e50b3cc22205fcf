use crate::helpers::{Script, ScriptedConnector, WAIT, drain, wait_until};

use devserver_core::client::{ClientEvent, ClientOptions, ReconnectingClient};

use models::{ReconnectPolicy, ServerMessage};

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

const RETRY_DELAY: Duration = Duration::from_millis(10);

fn options(reconnect: ReconnectPolicy) -> ClientOptions {
    ClientOptions {
        reconnect,
        ..ClientOptions::default()
    }
}

/// **VALUE**: With reconnecting disabled, the first close is final.
///
/// **WHY THIS MATTERS**: Some setups want the page to stop trying once the
/// dev server is gone.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one where "zero retries" still
/// makes one more attempt, or a missing terminal event.
#[tokio::test]
async fn given_reconnect_disabled_when_connection_closes_then_disconnected_without_retry() {
    // GIVEN: A connector that opens and immediately closes
    let (connector, attempts) = ScriptedConnector::new(Script::Deliver(Vec::new()));
    let client = ReconnectingClient::new(connector, options(ReconnectPolicy::Disabled))
        .with_retry_delay(RETRY_DELAY);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_cancel, cancel_rx) = watch::channel(false);

    // WHEN: Running the client to completion
    tokio::time::timeout(WAIT, client.run(events_tx, cancel_rx))
        .await
        .expect("client should finish");

    // THEN: One attempt, then Disconnected
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        drain(&mut events),
        vec![ClientEvent::Connected, ClientEvent::Disconnected]
    );
}

#[tokio::test]
async fn given_limited_retries_when_server_is_down_then_gives_up_after_limit() {
    // GIVEN: A server that never answers and two retries allowed
    let (connector, attempts) = ScriptedConnector::new(Script::Refuse);
    let client = ReconnectingClient::new(connector, options(ReconnectPolicy::Limited(2)))
        .with_retry_delay(RETRY_DELAY);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_cancel, cancel_rx) = watch::channel(false);

    // WHEN: Running the client to completion
    tokio::time::timeout(WAIT, client.run(events_tx, cancel_rx))
        .await
        .expect("client should finish");

    // THEN: The first attempt plus two retries, then Disconnected
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(
        drain(&mut events),
        vec![
            ClientEvent::Reconnecting {
                attempt: 1,
                delay: RETRY_DELAY
            },
            ClientEvent::Reconnecting {
                attempt: 2,
                delay: RETRY_DELAY
            },
            ClientEvent::Disconnected,
        ]
    );
}

/// **VALUE**: An unlimited client keeps retrying until cancelled, and stops
/// promptly when it is.
///
/// **BUG THIS CATCHES**: Would catch cancellation being checked only between
/// attempts, or an unlimited policy quietly capped.
#[tokio::test]
async fn given_unlimited_retries_when_cancelled_then_stops_without_disconnected_event() {
    // GIVEN: A client that retries forever against a dead server
    let (connector, attempts) = ScriptedConnector::new(Script::Refuse);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = ReconnectingClient::new(connector, options(ReconnectPolicy::Always))
        .with_retry_delay(RETRY_DELAY)
        .spawn(events_tx);

    // WHEN: It has retried a few times and is then cancelled
    assert!(wait_until(|| attempts.load(Ordering::SeqCst) >= 5).await);
    handle.cancel();

    // THEN: It finishes, and never reported exhaustion
    let state = tokio::time::timeout(WAIT, handle.join())
        .await
        .expect("client should stop after cancel");
    assert!(state.is_some());
    assert!(!drain(&mut events).contains(&ClientEvent::Disconnected));

    let settled = attempts.load(Ordering::SeqCst);
    tokio::time::sleep(RETRY_DELAY * 5).await;
    assert_eq!(attempts.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn given_successful_opens_when_each_closes_then_retry_budget_resets() {
    // GIVEN: One retry allowed, but every attempt opens successfully
    let (connector, attempts) = ScriptedConnector::new(Script::Deliver(Vec::new()));
    let (events_tx, _events) = mpsc::unbounded_channel();
    let handle = ReconnectingClient::new(connector, options(ReconnectPolicy::Limited(1)))
        .with_retry_delay(RETRY_DELAY)
        .spawn(events_tx);

    // WHEN: Several open/close cycles pass
    let kept_going = wait_until(|| attempts.load(Ordering::SeqCst) >= 4).await;
    handle.cancel();
    let _ = handle.join().await;

    // THEN: It kept reconnecting past the single retry
    assert!(kept_going);
}

#[tokio::test]
async fn given_server_announces_no_reconnect_when_connection_closes_then_stops() {
    // GIVEN: A server whose handshake disables reconnecting
    let handshake = ServerMessage::Reconnect(ReconnectPolicy::Disabled)
        .to_json()
        .unwrap();
    let (connector, attempts) = ScriptedConnector::new(Script::Deliver(vec![handshake]));
    let client = ReconnectingClient::new(connector, options(ReconnectPolicy::Always))
        .with_retry_delay(RETRY_DELAY);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_cancel, cancel_rx) = watch::channel(false);

    // WHEN: The connection closes
    let state = tokio::time::timeout(WAIT, client.run(events_tx, cancel_rx))
        .await
        .expect("client should finish");

    // THEN: The announced policy wins
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(state.options().reconnect, ReconnectPolicy::Disabled);
    assert_eq!(drain(&mut events).last(), Some(&ClientEvent::Disconnected));
}

#[tokio::test]
async fn given_undecodable_message_when_received_then_it_is_skipped() {
    let messages = vec![
        "{\"type\":\"bogus\"}".to_string(),
        "not json".to_string(),
        ServerMessage::Invalid.to_json().unwrap(),
    ];
    let (connector, _) = ScriptedConnector::new(Script::Deliver(messages));
    let client = ReconnectingClient::new(connector, options(ReconnectPolicy::Disabled));
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_cancel, cancel_rx) = watch::channel(false);

    tokio::time::timeout(WAIT, client.run(events_tx, cancel_rx))
        .await
        .expect("client should finish");

    assert_eq!(
        drain(&mut events),
        vec![
            ClientEvent::Connected,
            ClientEvent::Action(devserver_core::client::ClientAction::MarkStale),
            ClientEvent::Disconnected,
        ]
    );
}
