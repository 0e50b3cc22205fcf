use crate::helpers::{HANDSHAKE_LEN, start_test_long_poll_server, wait_until};

use devserver_core::LONG_POLL_PATH;
use devserver_core::hub::NotificationHub;
use devserver_core::transport::ServerHandle;
use devserver_core::transport::long_poll::{LongPollOptions, SessionOpened};

use models::{BuildState, ServerMessage};

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

fn quick_options() -> LongPollOptions {
    LongPollOptions {
        poll_timeout: Duration::from_millis(500),
        idle_timeout: Duration::from_secs(30),
    }
}

fn base_url(handle: &ServerHandle) -> String {
    format!("http://{}{LONG_POLL_PATH}", handle.local_addr())
}

async fn open_session(http: &reqwest::Client, handle: &ServerHandle) -> String {
    http.post(base_url(handle))
        .send()
        .await
        .expect("POST failed")
        .json::<SessionOpened>()
        .await
        .expect("Invalid session body")
        .id
}

async fn poll(http: &reqwest::Client, handle: &ServerHandle, id: &str) -> (StatusCode, Vec<ServerMessage>) {
    let response = http
        .get(format!("{}/{id}", base_url(handle)))
        .send()
        .await
        .expect("GET failed");
    let status = response.status();
    if status != StatusCode::OK {
        return (status, Vec::new());
    }

    let batch: Vec<Value> = response.json().await.expect("Invalid batch");
    let messages = batch
        .into_iter()
        .map(|value| ServerMessage::from_json(&value.to_string()).expect("Invalid message"))
        .collect();
    (status, messages)
}

/// **VALUE**: A long-poll session gets the same handshake and status a
/// WebSocket client gets.
///
/// **WHY THIS MATTERS**: The fallback transport must be indistinguishable to
/// the client logic.
///
/// **BUG THIS CATCHES**: Would catch the session being registered with the
/// hub before it is open, which silently drops the handshake.
#[tokio::test]
async fn given_new_session_when_first_polled_then_handshake_and_status_arrive() {
    // GIVEN: A hub with a settled build
    let hub = Arc::new(NotificationHub::default());
    hub.on_done(BuildState::clean("h1"), false);
    let handle = start_test_long_poll_server(&hub, quick_options()).await;
    let http = reqwest::Client::new();

    // WHEN: A session is opened and polled once
    let id = open_session(&http, &handle).await;
    let (status, messages) = poll(&http, &handle, &id).await;

    // THEN: Handshake plus hash/ok in one batch
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages.len(), HANDSHAKE_LEN + 2);
    assert_eq!(messages[HANDSHAKE_LEN], ServerMessage::Hash("h1".to_string()));
    assert_eq!(messages[HANDSHAKE_LEN + 1], ServerMessage::Ok);
    assert_eq!(hub.client_count(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn given_waiting_poll_when_broadcast_then_poll_returns_message() {
    // GIVEN: A session whose handshake was already collected
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_long_poll_server(&hub, quick_options()).await;
    let http = reqwest::Client::new();
    let id = open_session(&http, &handle).await;
    poll(&http, &handle, &id).await;

    // WHEN: A poll is waiting and the hub broadcasts
    let broadcaster = {
        let hub = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            hub.on_invalid();
        })
    };
    let (status, messages) = poll(&http, &handle, &id).await;
    broadcaster.await.unwrap();

    // THEN: The waiting poll delivers it
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages, vec![ServerMessage::Invalid]);

    handle.shutdown().await;
}

#[tokio::test]
async fn given_nothing_queued_when_polled_then_empty_batch_after_timeout() {
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_long_poll_server(&hub, quick_options()).await;
    let http = reqwest::Client::new();
    let id = open_session(&http, &handle).await;
    poll(&http, &handle, &id).await;

    let (status, messages) = poll(&http, &handle, &id).await;

    assert_eq!(status, StatusCode::OK);
    assert!(messages.is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn given_unknown_session_when_polled_then_not_found() {
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_long_poll_server(&hub, quick_options()).await;
    let http = reqwest::Client::new();

    let (unknown, _) = poll(&http, &handle, "00000000-0000-0000-0000-000000000000").await;
    let (garbage, _) = poll(&http, &handle, "not-a-session").await;

    assert_eq!(unknown, StatusCode::NOT_FOUND);
    assert_eq!(garbage, StatusCode::NOT_FOUND);

    handle.shutdown().await;
}

/// **VALUE**: Deleting a session deregisters it from the hub.
///
/// **BUG THIS CATCHES**: Would catch sessions that keep accumulating queued
/// messages after the client has left.
#[tokio::test]
async fn given_open_session_when_deleted_then_hub_forgets_it() {
    // GIVEN: An open session
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_long_poll_server(&hub, quick_options()).await;
    let http = reqwest::Client::new();
    let id = open_session(&http, &handle).await;
    assert_eq!(hub.client_count(), 1);

    // WHEN: The client deletes it
    let deleted = http
        .delete(format!("{}/{id}", base_url(&handle)))
        .send()
        .await
        .unwrap();

    // THEN: Gone from the hub and from the transport
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert_eq!(hub.client_count(), 0);
    let (status, _) = poll(&http, &handle, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    handle.shutdown().await;
}

/// **VALUE**: A poll parked on an empty queue ends as soon as its session is
/// deleted, not when the poll timeout runs out.
///
/// **BUG THIS CATCHES**: Would catch the close wakeup firing between the
/// open-state check and the wait, leaving the request hanging for the full
/// timeout on a session that no longer exists.
#[tokio::test]
async fn given_parked_poll_when_session_deleted_then_poll_ends_with_not_found() {
    // GIVEN: A session whose handshake was already taken, and a long timeout
    let hub = Arc::new(NotificationHub::default());
    let options = LongPollOptions {
        poll_timeout: Duration::from_secs(10),
        idle_timeout: Duration::from_secs(30),
    };
    let handle = start_test_long_poll_server(&hub, options).await;
    let http = reqwest::Client::new();
    let id = open_session(&http, &handle).await;
    let (status, _) = poll(&http, &handle, &id).await;
    assert_eq!(status, StatusCode::OK);

    let session_url = format!("{}/{id}", base_url(&handle));
    let parked = tokio::spawn({
        let http = http.clone();
        let url = session_url.clone();
        async move { http.get(url).send().await.map(|response| response.status()) }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // WHEN: The session is deleted while the poll waits
    let deleted = http.delete(&session_url).send().await.unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    // THEN: The parked poll returns promptly with 404
    let status = tokio::time::timeout(Duration::from_secs(2), parked)
        .await
        .expect("parked poll should end well before the poll timeout")
        .unwrap()
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);

    handle.shutdown().await;
}

#[tokio::test]
async fn given_idle_session_when_reaper_runs_then_session_is_closed() {
    // GIVEN: Very short idle timeout
    let hub = Arc::new(NotificationHub::default());
    let options = LongPollOptions {
        poll_timeout: Duration::from_millis(50),
        idle_timeout: Duration::from_millis(200),
    };
    let handle = start_test_long_poll_server(&hub, options).await;
    let http = reqwest::Client::new();

    // WHEN: A session is opened and never polled
    open_session(&http, &handle).await;
    assert_eq!(hub.client_count(), 1);

    // THEN: The reaper removes it
    assert!(wait_until(|| hub.client_count() == 0).await);

    handle.shutdown().await;
}

#[tokio::test]
async fn given_open_sessions_when_server_shuts_down_then_all_are_closed() {
    let hub = Arc::new(NotificationHub::default());
    let handle = start_test_long_poll_server(&hub, quick_options()).await;
    let http = reqwest::Client::new();
    open_session(&http, &handle).await;
    open_session(&http, &handle).await;
    assert_eq!(hub.client_count(), 2);

    handle.shutdown().await;

    assert_eq!(hub.client_count(), 0);
}
