//! Shared building blocks for the devserver crates.
//!
//! Every error type in the workspace carries an [`ErrorLocation`] so a log line
//! points straight at the call site that produced it.

pub mod error;

pub use error::error_location::ErrorLocation;

#[cfg(test)]
mod tests;
