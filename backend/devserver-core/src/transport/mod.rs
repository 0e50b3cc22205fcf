//! Client transports for the notification hub.
//!
//! - [`start_ws_server`]: raw WebSocket, one text frame per wire message
//! - [`start_long_poll_server`]: HTTP long-polling fallback for clients that
//!   cannot hold a socket open
//!
//! Both report connections to a [`ConnectionObserver`](crate::hub::ConnectionObserver)
//! and hand it connections whose `send` only enqueues.

mod handle;
pub mod long_poll;
pub mod ws;

pub use handle::ServerHandle;
pub use long_poll::{LongPollOptions, start_long_poll_server};
pub use ws::start_ws_server;

use models::ReadyState;

use std::sync::atomic::{AtomicU8, Ordering};

/// A [`ReadyState`] shared between a connection's owner and the hub.
#[derive(Debug)]
pub(crate) struct AtomicReadyState(AtomicU8);

impl AtomicReadyState {
    pub(crate) fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire)).unwrap_or(ReadyState::Closed)
    }

    pub(crate) fn store(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
