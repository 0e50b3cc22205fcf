use common::ErrorLocation;

use std::error::Error as StdError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PortError {
    #[error("No Available Port Error: {message} {location}")]
    NoAvailablePort {
        message: String,
        location: ErrorLocation,
    },

    #[error("Port Resolution Error: {message} {location}")]
    PortResolutionFailed {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Invalid Port Error: {message} {location}")]
    InvalidPort {
        message: String,
        location: ErrorLocation,
    },

    #[error("Host Resolution Error: {message} {location}")]
    HostResolution {
        message: String,
        location: ErrorLocation,
    },
}

impl PortError {
    /// Only probe failures are worth another attempt; range exhaustion and bad
    /// input fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::PortResolutionFailed { .. })
    }
}
