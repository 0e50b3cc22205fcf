use crate::error::transport::TransportError;
use crate::hub::{ClientConnection, ConnectionId};

use common::ErrorLocation;
use models::{ReadyState, ServerMessage};

use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::Mutex;

/// In-memory connection that records every payload it is sent.
pub struct RecordingConnection {
    id: ConnectionId,
    state: AtomicU8,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl RecordingConnection {
    pub fn open() -> Self {
        Self {
            id: ConnectionId::new(),
            state: AtomicU8::new(ReadyState::Open as u8),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .iter()
            .map(|payload| ServerMessage::from_json(payload).expect("hub sent invalid JSON"))
            .collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages().iter().map(ServerMessage::kind).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl ClientConnection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst)).unwrap_or(ReadyState::Closed)
    }

    fn send(&self, payload: &str) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                message: "simulated send failure".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.sent.lock().push(payload.to_string());
        Ok(())
    }
}
