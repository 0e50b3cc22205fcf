//! Immutable snapshot of one finished compilation.

pub mod builder;

use serde::{Deserialize, Serialize};

/// A single compiler diagnostic (warning or error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl BuildMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            module_name: None,
            file: None,
        }
    }

    pub fn with_module_name(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = Some(module_name.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl From<&str> for BuildMessage {
    fn from(message: &str) -> Self {
        BuildMessage::new(message)
    }
}

impl From<String> for BuildMessage {
    fn from(message: String) -> Self {
        BuildMessage::new(message)
    }
}

/// Result of a compiler `done` event.
///
/// The hub replaces its current snapshot wholesale on every non-suppressed
/// `done`; nothing mutates a snapshot after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildState {
    hash: String,
    errors: Vec<BuildMessage>,
    warnings: Vec<BuildMessage>,
}

impl BuildState {
    pub fn new(
        hash: impl Into<String>,
        errors: Vec<BuildMessage>,
        warnings: Vec<BuildMessage>,
    ) -> Self {
        Self {
            hash: hash.into(),
            errors,
            warnings,
        }
    }

    /// Snapshot of a clean build with the given hash.
    pub fn clean(hash: impl Into<String>) -> Self {
        Self::new(hash, Vec::new(), Vec::new())
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn errors(&self) -> &[BuildMessage] {
        &self.errors
    }

    pub fn warnings(&self) -> &[BuildMessage] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// No errors and no warnings.
    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}
