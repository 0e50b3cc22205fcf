use common::ErrorLocation;

use devserver_core::error::CoreError;
use devserver_core::error::config::ConfigError;
use devserver_core::error::port::PortError;
use devserver_core::error::transport::TransportError;

use std::panic::Location;

use thiserror::Error;

/// Errors raised while wiring up and running the devserver binary.
#[derive(Debug, Error)]
pub enum DevServerError {
    /// Error from this App
    #[error("DevServer Error: {message} {location}")]
    DevServer {
        message: String,
        location: ErrorLocation,
    },

    /// Error from devserver-core (ports, transports, config)
    #[error("Core Error: {source} {location}")]
    Core {
        source: CoreError,
        location: ErrorLocation,
    },

    /// The build command could not be run or its output not hashed
    #[error("Build Error: {message} {location}")]
    Build {
        message: String,
        location: ErrorLocation,
    },

    /// The file watcher could not be started
    #[error("Watch Error: {message} {location}")]
    Watch {
        message: String,
        location: ErrorLocation,
    },
}

impl From<CoreError> for DevServerError {
    #[track_caller]
    fn from(source: CoreError) -> Self {
        DevServerError::Core {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<PortError> for DevServerError {
    #[track_caller]
    fn from(error: PortError) -> Self {
        DevServerError::from(CoreError::from(error))
    }
}

impl From<TransportError> for DevServerError {
    #[track_caller]
    fn from(error: TransportError) -> Self {
        DevServerError::from(CoreError::from(error))
    }
}

impl From<ConfigError> for DevServerError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        DevServerError::from(CoreError::from(error))
    }
}
