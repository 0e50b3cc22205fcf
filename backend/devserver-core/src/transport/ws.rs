//! WebSocket transport.
//!
//! Every accepted socket becomes a [`WsConnection`]. Outgoing frames go
//! through an unbounded channel drained by a per-connection writer task, so
//! the hub can enqueue without waiting on the network. Frames from clients
//! carry no meaning and are ignored; a `Close` frame or a read error ends
//! the connection.

use crate::error::transport::TransportError;
use crate::hub::{ClientConnection, ConnectionId, ConnectionObserver};
use crate::transport::AtomicReadyState;
use crate::transport::handle::ServerHandle;

use common::ErrorLocation;
use models::ReadyState;

use std::net::SocketAddr;
use std::panic::Location;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Server side of one WebSocket client.
pub struct WsConnection {
    id: ConnectionId,
    state: AtomicReadyState,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl WsConnection {
    fn new(outgoing: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: ConnectionId::new(),
            state: AtomicReadyState::new(ReadyState::Connecting),
            outgoing,
        }
    }
}

impl ClientConnection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn ready_state(&self) -> ReadyState {
        self.state.load()
    }

    #[track_caller]
    fn send(&self, payload: &str) -> Result<(), TransportError> {
        if !self.ready_state().is_open() {
            return Err(TransportError::Closed {
                message: format!("Connection {} is not open", self.id),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.outgoing
            .send(Message::text(payload))
            .map_err(|e| TransportError::Send {
                message: format!("Writer for connection {} is gone: {e}", self.id),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}

/// Starts the WebSocket transport on `addr`.
///
/// Binds the listener, then spawns a background task that accepts clients and
/// reports each one to `observer` once its handshake completes.
///
/// # Arguments
///
/// * `addr` - Address to bind; port `0` lets the OS pick
/// * `observer` - Receives `on_connect` / `on_close` for every client
///
/// # Errors
///
/// Returns [`TransportError::Bind`] if the address cannot be bound.
///
/// # Security
///
/// When bound to a loopback address, connections from non-loopback peers are
/// dropped before the handshake.
pub async fn start_ws_server(
    addr: SocketAddr,
    observer: Arc<dyn ConnectionObserver>,
) -> Result<ServerHandle, TransportError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TransportError::Bind {
            message: format!("Failed to bind WebSocket server on {addr}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
    let local_addr = listener.local_addr()?;

    info!("WebSocket server listening on {local_addr}");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = TokioSpawn(accept_loop(listener, local_addr, observer, shutdown_rx));

    Ok(ServerHandle::new(local_addr, shutdown_tx, task))
}

async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    observer: Arc<dyn ConnectionObserver>,
    mut shutdown: watch::Receiver<bool>,
) {
    let loopback_only = local_addr.ip().is_loopback();
    let mut connections = Vec::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if loopback_only && !peer.ip().is_loopback() {
                        warn!("Rejected non-loopback connection from {peer}");
                        continue;
                    }
                    debug!("Client connecting from {peer}");
                    connections.push(TokioSpawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&observer),
                        shutdown.clone(),
                    )));
                    connections.retain(|task| !task.is_finished());
                }
                Err(e) => warn!("Failed to accept WebSocket client: {e}"),
            },
            _ = shutdown.changed() => break,
        }
    }

    drop(listener);
    for task in connections {
        let _ = task.await;
    }
    info!("WebSocket server on {local_addr} stopped");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    observer: Arc<dyn ConnectionObserver>,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            let error = TransportError::Handshake {
                message: format!("WebSocket handshake with {peer} failed: {e}"),
                location: ErrorLocation::from(Location::caller()),
            };
            error!("{error}");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

    let writer = TokioSpawn(async move {
        while let Some(message) = outgoing_rx.recv().await {
            if let Err(e) = write.send(message).await {
                debug!("Write to {peer} failed: {e}");
                return;
            }
        }
        let _ = write.close().await;
    });

    let connection = Arc::new(WsConnection::new(outgoing_tx));
    let id = connection.id();
    connection.state.store(ReadyState::Open);
    observer.on_connect(Arc::clone(&connection) as Arc<dyn ClientConnection>);

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read from {peer} failed: {e}");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    connection.state.store(ReadyState::Closing);
    observer.on_close(id);
    connection.state.store(ReadyState::Closed);

    // Last strong reference: dropping it closes the outgoing channel, which lets
    // the writer flush what is queued and send the close frame.
    drop(connection);
    let _ = writer.await;
    debug!("Client {id} ({peer}) closed");
}
