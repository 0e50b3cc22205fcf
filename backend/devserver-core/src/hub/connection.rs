use crate::error::transport::TransportError;

use models::ReadyState;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::str::FromStr;
use std::sync::Arc;

use uuid::Uuid;

/// Identity of one client connection, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConnectionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// A live client channel owned by a transport.
///
/// `send` must never block: implementations enqueue and return.
pub trait ClientConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn ready_state(&self) -> ReadyState;

    fn send(&self, payload: &str) -> Result<(), TransportError>;
}

/// Receives connection lifecycle notifications from a transport.
pub trait ConnectionObserver: Send + Sync {
    fn on_connect(&self, connection: Arc<dyn ClientConnection>);

    fn on_close(&self, id: ConnectionId);
}
