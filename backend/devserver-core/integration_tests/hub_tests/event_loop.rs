use crate::helpers::{connect_registered, is_silent, next_message, start_test_ws_server};

use devserver_core::hub::{CompilerEvent, NotificationHub, spawn_event_loop};

use models::{BuildMessage, BuildState, ServerMessage};

use std::sync::Arc;

use tokio::sync::mpsc;

/// **VALUE**: Compiler events flow through the event loop and the WebSocket
/// transport to a real client, in order.
///
/// **WHY THIS MATTERS**: This is the whole server path a browser depends on:
/// channel, hub, serializer, writer task, socket.
///
/// **BUG THIS CATCHES**: Would catch events being reordered or dropped between
/// the channel and the socket, or the writer task not starting.
#[tokio::test]
async fn given_connected_client_when_build_cycle_runs_then_receives_hash_then_ok() {
    // GIVEN: A hub behind the event loop and a registered client
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let (events, rx) = mpsc::channel(16);
    let _event_loop = spawn_event_loop(hub.clone(), rx);
    let mut ws = connect_registered(&handle).await;

    // WHEN: The compiler reports a rebuild that succeeds
    events.send(CompilerEvent::Invalid).await.unwrap();
    events
        .send(CompilerEvent::Done(BuildState::clean("h1")))
        .await
        .unwrap();

    // THEN: invalid, hash, ok
    assert_eq!(next_message(&mut ws).await, ServerMessage::Invalid);
    assert_eq!(
        next_message(&mut ws).await,
        ServerMessage::Hash("h1".to_string())
    );
    assert_eq!(next_message(&mut ws).await, ServerMessage::Ok);

    handle.shutdown().await;
}

#[tokio::test]
async fn given_identical_rebuild_when_done_then_client_receives_still_ok_only() {
    // GIVEN: A client that saw build h1
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let (events, rx) = mpsc::channel(16);
    let _event_loop = spawn_event_loop(hub.clone(), rx);
    let mut ws = connect_registered(&handle).await;
    events
        .send(CompilerEvent::Done(BuildState::clean("h1")))
        .await
        .unwrap();
    next_message(&mut ws).await;
    next_message(&mut ws).await;

    // WHEN: The same build settles again
    events
        .send(CompilerEvent::Done(BuildState::clean("h1")))
        .await
        .unwrap();

    // THEN: still-ok and nothing else
    assert_eq!(next_message(&mut ws).await, ServerMessage::StillOk);
    assert!(is_silent(&mut ws).await);

    handle.shutdown().await;
}

#[tokio::test]
async fn given_failed_build_when_done_then_warnings_carry_prevent_reloading() {
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let (events, rx) = mpsc::channel(16);
    let _event_loop = spawn_event_loop(hub.clone(), rx);
    let mut ws = connect_registered(&handle).await;

    let state = BuildState::new(
        "h2",
        vec![BuildMessage::new("E1").with_file("src/main.js")],
        vec![BuildMessage::new("W1")],
    );
    events.send(CompilerEvent::Done(state)).await.unwrap();

    assert_eq!(
        next_message(&mut ws).await,
        ServerMessage::Hash("h2".to_string())
    );
    assert_eq!(
        next_message(&mut ws).await,
        ServerMessage::Warnings {
            warnings: vec![BuildMessage::new("W1")],
            prevent_reloading: true,
        }
    );
    assert_eq!(
        next_message(&mut ws).await,
        ServerMessage::Errors(vec![BuildMessage::new("E1").with_file("src/main.js")])
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn given_static_change_when_reported_then_client_is_told_the_path() {
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_ws_server(&hub).await;
    let (events, rx) = mpsc::channel(16);
    let _event_loop = spawn_event_loop(hub.clone(), rx);
    let mut ws = connect_registered(&handle).await;

    events
        .send(CompilerEvent::StaticChanged("public/index.html".to_string()))
        .await
        .unwrap();

    assert_eq!(
        next_message(&mut ws).await,
        ServerMessage::StaticChanged("public/index.html".to_string())
    );
    assert!(hub.current_hash().is_none());

    handle.shutdown().await;
}

#[tokio::test]
async fn given_senders_dropped_when_event_loop_runs_then_it_exits() {
    let hub = Arc::new(NotificationHub::default());
    let (events, rx) = mpsc::channel::<CompilerEvent>(1);
    let event_loop = spawn_event_loop(hub, rx);

    drop(events);

    tokio::time::timeout(crate::helpers::WAIT, event_loop)
        .await
        .expect("event loop should stop")
        .unwrap();
}
