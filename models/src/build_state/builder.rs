use crate::error::model_error::ModelError;
use crate::{BuildMessage, BuildState, ErrorLocation};

use std::panic::Location;

/// Builder for creating validated BuildState snapshots.
///
/// Compiler adapters collect diagnostics one at a time; the builder keeps
/// their order and checks the snapshot before it reaches the hub.
#[derive(Debug, Default)]
pub struct BuildStateBuilder {
    hash: Option<String>,
    errors: Vec<BuildMessage>,
    warnings: Vec<BuildMessage>,
}

impl BuildStateBuilder {
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<BuildMessage>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn with_errors<I, M>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<BuildMessage>,
    {
        self.errors.extend(errors.into_iter().map(Into::into));
        self
    }

    pub fn with_warning(mut self, warning: impl Into<BuildMessage>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings<I, M>(mut self, warnings: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<BuildMessage>,
    {
        self.warnings.extend(warnings.into_iter().map(Into::into));
        self
    }

    /// Build the BuildState with validation.
    ///
    /// An absent hash is allowed and becomes the empty hash. A present hash
    /// must not contain whitespace: clients embed it in hot-update file names.
    #[track_caller]
    pub fn build(self) -> Result<BuildState, ModelError> {
        let hash = self.hash.unwrap_or_default();

        if hash.chars().any(char::is_whitespace) {
            return Err(ModelError::Validation {
                message: format!("Build hash must not contain whitespace: {hash:?}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.errors.iter().any(|e| e.message.is_empty()) {
            return Err(ModelError::Validation {
                message: String::from("Error messages cannot be empty"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.warnings.iter().any(|w| w.message.is_empty()) {
            return Err(ModelError::Validation {
                message: String::from("Warning messages cannot be empty"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(BuildState::new(hash, self.errors, self.warnings))
    }
}
