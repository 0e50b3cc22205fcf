//! Test helpers for devserver app integration tests.

use devserver_core::hub::CompilerEvent;

use models::ServerMessage;

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use tempfile::{TempDir, tempdir};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(10);

/// Test helper: Project with `src/`, `public/` and a built `dist/index.html`.
pub fn test_project() -> TempDir {
    let dir = tempdir().expect("Failed to create temp project");
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("public")).unwrap();
    fs::create_dir_all(dir.path().join("dist")).unwrap();
    write(dir.path(), "src/main.js", "console.log('v1')");
    write(dir.path(), "dist/index.html", "<script>v1</script>");
    dir
}

pub fn write(project: &Path, relative: &str, contents: &str) {
    fs::write(project.join(relative), contents).expect("Failed to write project file");
}

/// Test helper: Connect a raw WebSocket client on loopback.
pub async fn connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://127.0.0.1:{}", addr.port());
    let (ws, _) = connect_async(&url)
        .await
        .expect("Failed to connect to devserver");
    ws
}

/// Test helper: Next hub message on a raw WebSocket client.
pub async fn next_message(ws: &mut WsClient) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("Timed out waiting for a message")
            .expect("Connection ended")
            .expect("Error receiving message");

        if let Message::Text(text) = frame {
            return ServerMessage::from_json(text.as_str()).expect("Invalid hub message");
        }
    }
}

/// Test helper: Skip messages until one satisfies `wanted`.
pub async fn wait_for_message(
    ws: &mut WsClient,
    wanted: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    loop {
        let message = next_message(ws).await;
        if wanted(&message) {
            return message;
        }
    }
}

/// Test helper: Next compiler event, or panic after [`WAIT`].
pub async fn next_event(events: &mut mpsc::Receiver<CompilerEvent>) -> CompilerEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("Timed out waiting for a compiler event")
        .expect("Event channel closed")
}
