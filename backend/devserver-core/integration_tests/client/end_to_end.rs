use crate::helpers::{WAIT, start_test_long_poll_server, start_test_ws_server, wait_until};

use devserver_core::client::{
    ClientAction, ClientEvent, ClientOptions, LongPollConnector, ReconnectingClient, WsConnector,
};
use devserver_core::hub::{HubOptions, NotificationHub};
use devserver_core::transport::LongPollOptions;

use models::{BuildMessage, BuildState, ReconnectPolicy};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

/// Test helper: Wait for the next event matching `wanted`, skipping others.
async fn expect_event(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    wanted: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("client stopped");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for client event")
}

/// **VALUE**: A Rust client over WebSocket turns a rebuild into a hot update.
///
/// **WHY THIS MATTERS**: Proves the wire protocol, the hub and the client
/// reducer agree end to end.
///
/// **BUG THIS CATCHES**: Would catch the client reloading on the status replay
/// it receives on connect, or missing the update after a real rebuild.
#[tokio::test]
async fn given_ws_client_when_build_changes_then_hot_update_is_requested() {
    // GIVEN: A hub with build h1 and a connected client
    let hub = Arc::new(NotificationHub::default());
    hub.on_done(BuildState::clean("h1"), false);
    let handle = start_test_ws_server(&hub).await;
    let connector = WsConnector::new(format!("ws://{}", handle.local_addr()));
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let client = ReconnectingClient::new(connector, ClientOptions::default()).spawn(events_tx);
    expect_event(&mut events, |event| *event == ClientEvent::Connected).await;
    assert!(wait_until(|| hub.client_count() == 1).await);

    // WHEN: A new build settles
    hub.on_invalid();
    hub.on_done(BuildState::clean("h2"), false);

    // THEN: The client marks the page stale, then asks for the hot update
    expect_event(&mut events, |event| {
        *event == ClientEvent::Action(ClientAction::MarkStale)
    })
    .await;
    let update = expect_event(&mut events, |event| {
        matches!(event, ClientEvent::Action(ClientAction::ApplyHotUpdate(_)))
    })
    .await;
    assert_eq!(
        update,
        ClientEvent::Action(ClientAction::ApplyHotUpdate("h2".to_string()))
    );

    client.cancel();
    let _ = client.join().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn given_ws_client_when_build_fails_then_errors_overlay_is_shown() {
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let connector = WsConnector::new(format!("ws://{}", handle.local_addr()));
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let client = ReconnectingClient::new(connector, ClientOptions::default()).spawn(events_tx);
    expect_event(&mut events, |event| *event == ClientEvent::Connected).await;
    assert!(wait_until(|| hub.client_count() == 1).await);

    hub.on_done(
        BuildState::new("h1", vec![BuildMessage::new("E1")], Vec::new()),
        false,
    );

    let shown = expect_event(&mut events, |event| {
        matches!(event, ClientEvent::Action(ClientAction::ShowErrors(_)))
    })
    .await;
    assert_eq!(
        shown,
        ClientEvent::Action(ClientAction::ShowErrors(vec![BuildMessage::new("E1")]))
    );

    client.cancel();
    let _ = client.join().await;
    handle.shutdown().await;
}

/// **VALUE**: When the server goes away for good, a limited client reports
/// `Disconnected` after its retries.
///
/// **BUG THIS CATCHES**: Would catch the announced reconnect policy being
/// ignored, or a connect failure ending the client without the terminal event.
#[tokio::test]
async fn given_ws_client_when_server_shuts_down_then_retries_then_disconnects() {
    // GIVEN: A server announcing two retries and a connected client
    let hub = Arc::new(NotificationHub::new(HubOptions {
        reconnect: ReconnectPolicy::Limited(2),
        ..HubOptions::default()
    }));
    let handle = start_test_ws_server(&hub).await;
    let connector = WsConnector::new(format!("ws://{}", handle.local_addr()));
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let client = ReconnectingClient::new(connector, ClientOptions::default())
        .with_retry_delay(Duration::from_millis(20))
        .spawn(events_tx);
    expect_event(&mut events, |event| *event == ClientEvent::Connected).await;
    assert!(wait_until(|| hub.client_count() == 1).await);

    // WHEN: The server shuts down
    handle.shutdown().await;

    // THEN: Two reconnect attempts, then Disconnected
    let mut reconnects = 0;
    loop {
        match expect_event(&mut events, |_| true).await {
            ClientEvent::Reconnecting { .. } => reconnects += 1,
            ClientEvent::Disconnected => break,
            _ => {}
        }
    }
    assert_eq!(reconnects, 2);
    assert!(client.join().await.is_some());
}

#[tokio::test]
async fn given_long_poll_client_when_build_changes_then_hot_update_is_requested() {
    // GIVEN: A long-poll transport with build h1 and a connected client
    let hub = Arc::new(NotificationHub::default());
    hub.on_done(BuildState::clean("h1"), false);
    let options = LongPollOptions {
        poll_timeout: Duration::from_millis(500),
        idle_timeout: Duration::from_secs(30),
    };
    let handle = start_test_long_poll_server(&hub, options).await;
    let connector =
        LongPollConnector::new(format!("http://{}", handle.local_addr()), options.poll_timeout);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let client = ReconnectingClient::new(connector, ClientOptions::default()).spawn(events_tx);
    expect_event(&mut events, |event| *event == ClientEvent::Connected).await;

    // WHEN: A new build settles
    hub.on_done(BuildState::clean("h2"), false);

    // THEN: The update arrives through polling
    let update = expect_event(&mut events, |event| {
        matches!(event, ClientEvent::Action(ClientAction::ApplyHotUpdate(_)))
    })
    .await;
    assert_eq!(
        update,
        ClientEvent::Action(ClientAction::ApplyHotUpdate("h2".to_string()))
    );

    client.cancel();
    let _ = client.join().await;
    handle.shutdown().await;
}
