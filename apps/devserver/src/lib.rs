// Library exports for testing
// The binary (main.rs) imports these as well

pub mod build_runner;
pub mod error;
pub mod logger;
pub mod server;
pub mod watcher;

#[cfg(test)]
mod tests;

/// Directory under the project root holding the devserver's log file.
pub const LOG_DIR_NAME: &str = ".devserver";
