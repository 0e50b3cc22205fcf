//! Ways for a [`ReconnectingClient`](crate::client::ReconnectingClient) to
//! reach the hub.
//!
//! A connector opens one connection and returns a channel of raw wire
//! messages. The channel closing means the connection is gone.

use crate::error::client::ClientError;
use crate::transport::long_poll::SessionOpened;
use crate::{LONG_POLL_PATH, MESSAGE_BUFFER};

use common::ErrorLocation;

use std::future::Future;
use std::panic::Location;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const POLL_GRACE: Duration = Duration::from_secs(5);

pub trait Connector: Send + Sync + 'static {
    /// Open a connection. Resolves once it is usable.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<mpsc::Receiver<String>, ClientError>> + Send;
}

/// Connects over a WebSocket, e.g. `ws://127.0.0.1:8080`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WsConnector {
    async fn connect(&self) -> Result<mpsc::Receiver<String>, ClientError> {
        let (ws_stream, _) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| ClientError::Connect {
                    message: format!("Failed to connect to {}", self.url),
                    location: ErrorLocation::from(Location::caller()),
                    source: Box::new(e),
                })?;

        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let (mut write, mut read) = ws_stream.split();
        let url = self.url.clone();

        TokioSpawn(async move {
            loop {
                tokio::select! {
                    incoming = read.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(text.as_str().to_owned()).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("Read from {url} failed: {e}");
                            break;
                        }
                    },
                    // The client stopped listening.
                    _ = tx.closed() => break,
                }
            }
            let _ = write.close().await;
        });

        Ok(rx)
    }
}

/// Connects through the long-polling endpoints, e.g. `http://127.0.0.1:8081`.
#[derive(Debug, Clone)]
pub struct LongPollConnector {
    base_url: String,
    poll_timeout: Duration,
    http: reqwest::Client,
}

impl LongPollConnector {
    /// `poll_timeout` must be at least the server's, or idle polls time out
    /// client-side and end the connection.
    pub fn new(base_url: impl Into<String>, poll_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_timeout,
            http: reqwest::Client::new(),
        }
    }

    fn session_url(&self, id: &str) -> String {
        format!("{}{LONG_POLL_PATH}/{id}", self.base_url)
    }
}

impl Connector for LongPollConnector {
    async fn connect(&self) -> Result<mpsc::Receiver<String>, ClientError> {
        let open_url = format!("{}{LONG_POLL_PATH}", self.base_url);

        let opened = self
            .http
            .post(&open_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ClientError::Connect {
                message: format!("Failed to open long-poll session at {open_url}"),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(e),
            })?
            .json::<SessionOpened>()
            .await
            .map_err(|e| ClientError::Decode {
                message: format!("Invalid session response from {open_url}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let url = self.session_url(&opened.id);
        let http = self.http.clone();
        let timeout = self.poll_timeout + POLL_GRACE;

        TokioSpawn(async move {
            loop {
                let response = tokio::select! {
                    response = http.get(&url).timeout(timeout).send() => response,
                    _ = tx.closed() => break,
                };

                let batch = match response {
                    Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                        debug!("Long-poll session {url} is gone");
                        return;
                    }
                    Ok(response) => match response.json::<Vec<Value>>().await {
                        Ok(batch) => batch,
                        Err(e) => {
                            warn!("Unreadable long-poll batch from {url}: {e}");
                            return;
                        }
                    },
                    Err(e) => {
                        debug!("Long-poll request to {url} failed: {e}");
                        return;
                    }
                };

                for message in batch {
                    if tx.send(message.to_string()).await.is_err() {
                        break;
                    }
                }
            }

            // Receiver dropped: tell the server we are leaving.
            let _ = http.delete(&url).send().await;
        });

        Ok(rx)
    }
}
