//! Test helpers for devserver integration tests.
//!
//! This module provides utilities for:
//! - Starting transports on OS-assigned ports
//! - Reading hub messages from a raw WebSocket client
//! - Polling for asynchronous conditions
//! - A scripted connector for reconnect tests

use devserver_core::client::Connector;
use devserver_core::error::client::ClientError;
use devserver_core::hub::NotificationHub;
use devserver_core::transport::{LongPollOptions, ServerHandle, start_long_poll_server, start_ws_server};

use common::ErrorLocation;
use models::ServerMessage;

use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Number of handshake messages a hub sends to every new connection.
pub const HANDSHAKE_LEN: usize = 4;

/// Test helper: WebSocket transport for `hub` on a free loopback port.
pub async fn start_test_ws_server(hub: &Arc<NotificationHub>) -> ServerHandle {
    start_ws_server("127.0.0.1:0".parse().unwrap(), hub.clone())
        .await
        .expect("Failed to start WebSocket server")
}

/// Test helper: long-poll transport for `hub` on a free loopback port.
pub async fn start_test_long_poll_server(
    hub: &Arc<NotificationHub>,
    options: LongPollOptions,
) -> ServerHandle {
    start_long_poll_server("127.0.0.1:0".parse().unwrap(), hub.clone(), options)
        .await
        .expect("Failed to start long-poll server")
}

/// Test helper: Connect a raw WebSocket client to a running server.
pub async fn connect_to_server(handle: &ServerHandle) -> WsClient {
    let url = format!("ws://{}", handle.local_addr());
    let (ws_stream, _) = connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket server");
    ws_stream
}

/// Test helper: Connect and consume the handshake, so the hub has registered
/// the connection when this returns.
pub async fn connect_registered(handle: &ServerHandle) -> WsClient {
    let mut ws = connect_to_server(handle).await;
    for _ in 0..HANDSHAKE_LEN {
        next_message(&mut ws).await;
    }
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

/// Test helper: Check that nothing arrives within a short window.
pub async fn is_silent(ws: &mut WsClient) -> bool {
    tokio::time::timeout(Duration::from_millis(200), ws.next())
        .await
        .is_err()
}

/// Test helper: Check if WebSocket connection is closed.
pub async fn is_connection_closed(ws: &mut WsClient) -> bool {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await {
            Err(_) => return false,
            Ok(None) => return true,
            Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(_))) => return true,
        }
    }
}

/// Test helper: Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// What each [`ScriptedConnector::connect`] call does.
#[derive(Clone)]
pub enum Script {
    /// Fail like a server that is down.
    Refuse,
    /// Open, deliver these raw messages, then close.
    Deliver(Vec<String>),
}

/// Connector that follows a fixed script and counts attempts.
pub struct ScriptedConnector {
    script: Script,
    attempts: Arc<AtomicU32>,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> (Self, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = Self {
            script,
            attempts: attempts.clone(),
        };
        (connector, attempts)
    }
}

impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<mpsc::Receiver<String>, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        match &self.script {
            Script::Refuse => Err(ClientError::Connect {
                message: "scripted refusal".to_string(),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(IoError::from(ErrorKind::ConnectionRefused)),
            }),
            Script::Deliver(messages) => {
                let (tx, rx) = mpsc::channel(messages.len().max(1));
                for message in messages {
                    tx.try_send(message.clone()).expect("script exceeds channel");
                }
                Ok(rx)
            }
        }
    }
}

/// Test helper: Drain every event currently queued.
pub fn drain<T>(events: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
