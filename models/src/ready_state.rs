//! Connection lifecycle as seen by the hub.

/// Mirrors the four WebSocket `readyState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn is_open(self) -> bool {
        self == ReadyState::Open
    }

    /// Inverse of `state as u8`, for connections that keep their state in an atomic.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReadyState::Connecting),
            1 => Some(ReadyState::Open),
            2 => Some(ReadyState::Closing),
            3 => Some(ReadyState::Closed),
            _ => None,
        }
    }
}
