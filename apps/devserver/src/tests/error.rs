// Unit tests for error module
// Tests conversion from core errors and display formatting

use crate::error::DevServerError;

use common::ErrorLocation;
use devserver_core::error::CoreError;
use devserver_core::error::config::ConfigError;
use devserver_core::error::port::PortError;

use std::panic::Location;

/// **VALUE**: Core errors keep their own message when surfaced by the app.
///
/// **WHY THIS MATTERS**: The binary prints the top-level error and exits; if
/// the core message were lost the user would only see "Core Error".
///
/// **BUG THIS CATCHES**: Would catch a `From` impl that drops the source or
/// maps every core error to a generic app message.
#[test]
fn given_port_error_when_converted_then_core_variant_keeps_message() {
    // GIVEN: A port exhaustion error
    let port_error = PortError::NoAvailablePort {
        message: String::from("No free port between 65000 and 65535"),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN: Converting to the app error
    let err = DevServerError::from(port_error);

    // THEN: It is a Core error wrapping the port error
    assert!(matches!(
        err,
        DevServerError::Core {
            source: CoreError::Port(PortError::NoAvailablePort { .. }),
            ..
        }
    ));
    assert!(err.to_string().contains("No free port between 65000 and 65535"));
}

#[test]
fn given_config_error_when_converted_then_reason_is_displayed() {
    let config_error = ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: String::from("long_poll.poll_timeout_ms must be positive"),
    };

    let err: DevServerError = config_error.into();

    assert!(err.to_string().starts_with("Core Error:"));
    assert!(err.to_string().contains("poll_timeout_ms must be positive"));
}

#[test]
fn given_build_error_when_displayed_then_includes_location() {
    let location = ErrorLocation::from(Location::caller());
    let err = DevServerError::Build {
        message: String::from("Failed to run build command 'make'"),
        location,
    };

    let text = err.to_string();

    assert!(text.starts_with("Build Error: Failed to run build command 'make'"));
    assert!(text.contains(&location.to_string()));
}
