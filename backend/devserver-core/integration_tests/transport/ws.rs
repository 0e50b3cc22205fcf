use crate::helpers::{
    HANDSHAKE_LEN, connect_registered, connect_to_server, is_connection_closed, next_message,
    start_test_ws_server, wait_until,
};

use devserver_core::hub::{HubOptions, NotificationHub};

use models::{BuildState, OverlayPolicy, ReconnectPolicy, ServerMessage};

use std::sync::Arc;

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

/// **VALUE**: A WebSocket client receives the configured handshake first.
///
/// **BUG THIS CATCHES**: Would catch the transport reporting the connection
/// before its writer task exists, which loses the handshake.
#[tokio::test]
async fn given_hub_options_when_client_connects_then_handshake_arrives_in_order() {
    // GIVEN: A hub with hot reloading off
    let hub = Arc::new(NotificationHub::new(HubOptions {
        hot: false,
        live_reload: true,
        reconnect: ReconnectPolicy::Always,
        overlay: OverlayPolicy::Enabled,
    }));
    let handle = start_test_ws_server(&hub).await;

    // WHEN: A client connects
    let mut ws = connect_to_server(&handle).await;

    // THEN: hot, liveReload, reconnect, overlay
    let mut handshake = Vec::new();
    for _ in 0..HANDSHAKE_LEN {
        handshake.push(next_message(&mut ws).await);
    }
    assert_eq!(
        handshake,
        vec![
            ServerMessage::Hot(false),
            ServerMessage::LiveReload(true),
            ServerMessage::Reconnect(ReconnectPolicy::Always),
            ServerMessage::Overlay(OverlayPolicy::Enabled),
        ]
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn given_settled_build_when_client_connects_then_status_follows_handshake() {
    let hub = Arc::new(NotificationHub::default());
    hub.on_done(BuildState::clean("h1"), false);
    let handle = start_test_ws_server(&hub).await;

    let mut ws = connect_registered(&handle).await;

    assert_eq!(
        next_message(&mut ws).await,
        ServerMessage::Hash("h1".to_string())
    );
    assert_eq!(next_message(&mut ws).await, ServerMessage::Ok);

    handle.shutdown().await;
}

/// **VALUE**: Closing one of three sockets leaves the other two served.
///
/// **WHY THIS MATTERS**: Tabs come and go constantly during development.
///
/// **BUG THIS CATCHES**: Would catch a closed socket's send error aborting the
/// broadcast, or a closed connection staying registered.
#[tokio::test]
async fn given_three_clients_when_second_disconnects_then_others_keep_receiving() {
    // GIVEN: Three registered clients
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let mut first = connect_registered(&handle).await;
    let mut second = connect_registered(&handle).await;
    let mut third = connect_registered(&handle).await;
    assert_eq!(hub.client_count(), 3);

    // WHEN: The second closes, then a message is broadcast
    second.send(Message::Close(None)).await.unwrap();
    assert!(wait_until(|| hub.client_count() == 2).await);
    hub.on_invalid();

    // THEN: First and third receive it
    assert_eq!(next_message(&mut first).await, ServerMessage::Invalid);
    assert_eq!(next_message(&mut third).await, ServerMessage::Invalid);

    handle.shutdown().await;
}

#[tokio::test]
async fn given_client_drops_socket_when_observed_then_hub_forgets_it() {
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let ws = connect_registered(&handle).await;
    assert_eq!(hub.client_count(), 1);

    drop(ws);

    assert!(wait_until(|| hub.client_count() == 0).await);
    handle.shutdown().await;
}

#[tokio::test]
async fn given_client_frames_when_received_then_they_are_ignored() {
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let mut ws = connect_registered(&handle).await;

    ws.send(Message::text("{\"type\":\"ok\"}")).await.unwrap();
    hub.on_invalid();

    assert_eq!(next_message(&mut ws).await, ServerMessage::Invalid);
    assert_eq!(hub.client_count(), 1);

    handle.shutdown().await;
}

/// **VALUE**: Shutting the server down closes every live socket.
///
/// **BUG THIS CATCHES**: Would catch shutdown stopping only the accept loop
/// while existing connections linger and keep the process busy.
#[tokio::test]
async fn given_live_client_when_server_shuts_down_then_socket_is_closed() {
    // GIVEN: A registered client
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let mut ws = connect_registered(&handle).await;

    // WHEN: The server shuts down
    handle.shutdown().await;

    // THEN: The client sees the connection end and the hub is empty
    assert!(is_connection_closed(&mut ws).await);
    assert_eq!(hub.client_count(), 0);
}
