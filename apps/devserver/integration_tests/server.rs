use crate::helpers::{WAIT, connect, next_message, test_project, wait_for_message, write};

use devserver::build_runner::hash_output_dir;
use devserver::server::DevServer;

use devserver_core::config::DevServerConfig;

use models::ServerMessage;

use std::time::Duration;

use futures_util::StreamExt;
use serial_test::serial;

fn quick_config() -> DevServerConfig {
    let mut config = DevServerConfig::default();
    config.watch.debounce_ms = 20;
    config.long_poll.poll_timeout_ms = 500;
    config.long_poll.idle_timeout_ms = 5_000;
    config
}

/// **VALUE**: A browser connecting to a fresh devserver learns the status of
/// the initial build.
///
/// **WHY THIS MATTERS**: This is the whole wiring in one path: ports,
/// transports, build runner, event loop, hub.
///
/// **BUG THIS CATCHES**: Would catch the build runner never starting, or the
/// transports being bound to a hub that the event loop does not feed.
#[tokio::test]
#[serial]
async fn given_started_server_when_client_connects_then_initial_build_is_reported() {
    // GIVEN: A project with built output
    let project = test_project();
    let expected = hash_output_dir(&project.path().join("dist")).unwrap();

    // WHEN: Starting the devserver and connecting
    let server = DevServer::start(project.path(), quick_config())
        .await
        .expect("devserver should start");
    let mut ws = connect(server.ws_addr()).await;

    // THEN: Handshake first, then the initial build's hash and ok
    assert_eq!(next_message(&mut ws).await, ServerMessage::Hot(true));
    let hash = wait_for_message(&mut ws, |m| matches!(m, ServerMessage::Hash(_))).await;
    assert_eq!(hash, ServerMessage::Hash(expected));
    assert_eq!(next_message(&mut ws).await, ServerMessage::Ok);
    assert!(server.long_poll_addr().is_some());
    assert_ne!(server.long_poll_addr(), Some(server.ws_addr()));

    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn given_long_poll_disabled_when_started_then_only_websocket_runs() {
    let project = test_project();
    let mut config = quick_config();
    config.long_poll.enabled = false;

    let server = DevServer::start(project.path(), config).await.unwrap();

    assert!(server.long_poll_addr().is_none());
    server.shutdown().await;
}

/// **VALUE**: Editing files reaches connected clients.
///
/// **WHY THIS MATTERS**: Static files reload the page without a build,
/// sources rebuild and announce the new hash.
///
/// **BUG THIS CATCHES**: Would catch static edits triggering a rebuild, or
/// source edits never reaching the build runner.
#[tokio::test]
#[serial]
async fn given_running_server_when_files_change_then_clients_are_notified() {
    // GIVEN: A connected client that has seen the initial build
    let project = test_project();
    let server = DevServer::start(project.path(), quick_config()).await.unwrap();
    let mut ws = connect(server.ws_addr()).await;
    let ServerMessage::Hash(first) =
        wait_for_message(&mut ws, |m| matches!(m, ServerMessage::Hash(_))).await
    else {
        unreachable!();
    };
    // Lets the platform watcher settle before the first edit.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // WHEN: A static file is added
    write(project.path(), "public/logo.svg", "<svg/>");

    // THEN: static-changed with the project-relative path
    let changed = wait_for_message(&mut ws, |m| {
        matches!(m, ServerMessage::StaticChanged(_))
    })
    .await;
    assert_eq!(
        changed,
        ServerMessage::StaticChanged("public/logo.svg".to_string())
    );

    // WHEN: Output changes and a source file is edited
    write(project.path(), "dist/index.html", "<script>v2</script>");
    write(project.path(), "src/main.js", "console.log('v2')");

    // THEN: invalid, then the new hash
    wait_for_message(&mut ws, |m| *m == ServerMessage::Invalid).await;
    let rebuilt = wait_for_message(&mut ws, |m| matches!(m, ServerMessage::Hash(_))).await;
    assert_ne!(rebuilt, ServerMessage::Hash(first));

    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn given_connected_client_when_server_shuts_down_then_socket_closes() {
    let project = test_project();
    let server = DevServer::start(project.path(), quick_config()).await.unwrap();
    let mut ws = connect(server.ws_addr()).await;
    next_message(&mut ws).await;

    server.shutdown().await;

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) => return,
                Some(Ok(frame)) if frame.is_close() => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket should close on shutdown");
}
