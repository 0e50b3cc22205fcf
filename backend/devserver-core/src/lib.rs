//! Core of the devserver: free-port resolution, build-notification fan-out,
//! client transports, and a reconnecting client.
//!
//! ## Architecture
//!
//! - [`port`]: finds a port that is free on every local interface
//! - [`hub`]: turns compiler events into notifications for every client
//! - [`transport`]: WebSocket and long-polling servers feeding the hub
//! - [`client`]: the browser-side contract, runnable from Rust
//! - [`config`]: `devserver.json`

pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod port;
pub mod transport;

#[cfg(test)]
mod tests;

pub const DEFAULT_BASE_PORT: u16 = 8080;
pub const MIN_PORT: u16 = 1024;
pub const MAX_PORT: u16 = 65535;
pub const DEFAULT_PORT_RETRY: u32 = 3;

pub const BASE_PORT_ENV: &str = "DEVSERVER_BASE_PORT";
pub const PORT_RETRY_ENV: &str = "DEVSERVER_PORT_RETRY";

pub const LONG_POLL_PATH: &str = "/__devserver/poll";
pub const LONG_POLL_SESSION_PATH: &str = const_format::concatcp!(LONG_POLL_PATH, "/{id}");

/// Messages a client connection buffers before the reader waits.
pub const MESSAGE_BUFFER: usize = 64;
