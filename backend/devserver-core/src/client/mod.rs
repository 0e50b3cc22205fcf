//! Reconnecting peer of the notification hub.
//!
//! [`ReconnectingClient`] keeps a connection open through a [`Connector`],
//! feeds every message into its [`ClientState`], and reports the resulting
//! actions as [`ClientEvent`]s. When the connection drops it waits a fixed
//! delay and tries again, as often as the current [`ReconnectPolicy`] allows.
//! The policy comes from the hub's handshake, so the server decides how
//! persistent its clients are.
//!
//! [`ReconnectPolicy`]: models::ReconnectPolicy

pub mod connector;
pub mod state;

pub use connector::{Connector, LongPollConnector, WsConnector};
pub use state::{BuildStatus, ClientAction, ClientOptions, ClientState};

use crate::error::client::ClientError;

use common::ErrorLocation;
use models::ServerMessage;

use std::panic::Location;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use log::{debug, info, warn};
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What the client reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Action(ClientAction),
    /// Waiting `delay` before attempt number `attempt` (1-based).
    Reconnecting { attempt: u32, delay: Duration },
    /// Retries are exhausted. No further events follow.
    Disconnected,
}

pub struct ReconnectingClient<C: Connector> {
    connector: C,
    state: ClientState,
    retry_delay: Duration,
}

impl<C: Connector> ReconnectingClient<C> {
    pub fn new(connector: C, options: ClientOptions) -> Self {
        Self {
            connector,
            state: ClientState::new(options),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Run on a background task; events go to `events`.
    pub fn spawn(self, events: mpsc::UnboundedSender<ClientEvent>) -> ClientHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = TokioSpawn(self.run(events, cancel_rx));
        ClientHandle {
            cancel: cancel_tx,
            task,
        }
    }

    /// Connect, dispatch, and reconnect until retries run out or `cancel`
    /// flips to `true` (or its sender is dropped). Returns the final state.
    pub async fn run(
        mut self,
        events: mpsc::UnboundedSender<ClientEvent>,
        mut cancel: watch::Receiver<bool>,
    ) -> ClientState {
        let mut backoff = Constant::new(self.retry_delay);
        let mut retries: u32 = 0;

        loop {
            let attempt = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return self.state,
                attempt = self.connector.connect() => attempt,
            };

            match attempt {
                Ok(mut incoming) => {
                    info!("Connected to dev server");
                    retries = 0;
                    backoff.reset();
                    let _ = events.send(ClientEvent::Connected);

                    loop {
                        tokio::select! {
                            biased;
                            _ = cancelled(&mut cancel) => return self.state,
                            message = incoming.recv() => match message {
                                Some(text) => self.dispatch(&text, &events),
                                None => break,
                            },
                        }
                    }
                    info!("Disconnected from dev server");
                }
                Err(e) => warn!("{e}"),
            }

            if !self.state.options().reconnect.allows_retry(retries) {
                info!("Giving up after {retries} retry attempt(s)");
                let _ = events.send(ClientEvent::Disconnected);
                return self.state;
            }

            retries += 1;
            let delay = backoff.next_backoff().unwrap_or(self.retry_delay);
            debug!("Reconnect attempt {retries} in {delay:?}");
            let _ = events.send(ClientEvent::Reconnecting {
                attempt: retries,
                delay,
            });

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return self.state,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn dispatch(&mut self, text: &str, events: &mpsc::UnboundedSender<ClientEvent>) {
        let message = match decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("{e}");
                return;
            }
        };

        for action in self.state.handle(message) {
            let _ = events.send(ClientEvent::Action(action));
        }
    }
}

#[track_caller]
fn decode(text: &str) -> Result<ServerMessage, ClientError> {
    ServerMessage::from_json(text).map_err(|e| ClientError::Decode {
        message: format!("Ignoring undecodable message: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Resolves once cancellation is requested or the handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Owner's side of a spawned [`ReconnectingClient`].
pub struct ClientHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<ClientState>,
}

impl ClientHandle {
    /// Stop retrying and abort any connection attempt in flight.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the client to stop and take its final state.
    pub async fn join(self) -> Option<ClientState> {
        self.task.await.ok()
    }
}
