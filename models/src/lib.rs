//! Domain models for the devserver.
//!
//! Pure data passed between the compiler, the notification hub, the
//! transports, and the reconnecting client. Nothing in here performs I/O.
//!
//! ## Architecture
//!
//! - **models** (this crate): build snapshots, wire messages, client policies
//! - **devserver-core**: port resolution, notification hub, transports, client
//! - **devserver**: application wiring (watcher, build runner, logging)

pub mod build_state;
pub mod error;
pub mod message;
pub mod policy;
pub mod ready_state;

#[cfg(test)]
mod tests;

pub use build_state::builder::BuildStateBuilder;
pub use build_state::{BuildMessage, BuildState};
pub use common::ErrorLocation;
pub use error::model_error::ModelError;
pub use message::{MessageParams, ServerMessage, WireMessage};
pub use policy::{OverlayPolicy, ReconnectPolicy};
pub use ready_state::ReadyState;
