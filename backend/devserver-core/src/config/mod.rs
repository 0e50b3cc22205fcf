use crate::error::config::ConfigError;
use crate::hub::HubOptions;
use crate::port::PortRequest;
use crate::transport::LongPollOptions;

use common::ErrorLocation;
use models::{OverlayPolicy, ReconnectPolicy};

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "devserver.json";
const CONFIG_VERSION: u32 = 1;
const MAX_DEBOUNCE_MS: u64 = 10_000;

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket port: a number, a numeric string, or `"auto"`.
    #[serde(default)]
    pub port: PortRequest,
    /// Bind host. Also accepts `local-ip`, `local-ipv4` and `local-ipv6`.
    #[serde(default)]
    pub host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: PortRequest::Auto,
            host: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongPollConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub port: PortRequest,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: PortRequest::Auto,
            poll_timeout_ms: default_poll_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

/// Settings announced to browser clients on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_true")]
    pub hot: bool,
    #[serde(default = "default_true")]
    pub live_reload: bool,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub overlay: OverlayPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hot: true,
            live_reload: true,
            reconnect: ReconnectPolicy::default(),
            overlay: OverlayPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Changes here trigger a rebuild.
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<PathBuf>,
    /// Changes here are announced as `static-changed` without a rebuild.
    #[serde(default = "default_static_dirs")]
    pub static_dirs: Vec<PathBuf>,
    /// Path components that are never watched.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            source_dirs: default_source_dirs(),
            static_dirs: default_static_dirs(),
            ignore: default_ignore(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Program and arguments. Empty means no build step: only the output
    /// directory is hashed.
    #[serde(default)]
    pub command: Vec<String>,
    /// Directory whose contents make up the build hash.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevServerConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub long_poll: LongPollConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerConfig::default(),
            long_poll: LongPollConfig::default(),
            client: ClientConfig::default(),
            watch: WatchConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_true() -> bool {
    true
}
fn default_poll_timeout_ms() -> u64 {
    25_000
}
fn default_idle_timeout_ms() -> u64 {
    60_000
}
fn default_source_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("src")]
}
fn default_static_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("public")]
}
fn default_ignore() -> Vec<String> {
    vec![
        ".git".to_string(),
        "node_modules".to_string(),
        "target".to_string(),
    ]
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

// ============================================
// IMPLEMENTATION
// ============================================

impl DevServerConfig {
    /// Load config from {config_dir}/devserver.json.
    ///
    /// # Returns
    ///
    /// Returns `Ok(DevServerConfig)` if loaded successfully or defaults if the
    /// file is missing.
    /// Returns `Err(ConfigError)` if the file exists but is unreadable or invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {e}");
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config = Self::parse(&contents).map_err(|e| match e {
            ConfigError::ParseError {
                location, reason, ..
            } => ConfigError::ParseError {
                location,
                path: config_path.clone(),
                reason,
            },
            other => other,
        })?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: DevServerConfig = serde_json::from_str(contents).map_err(|e| {
            warn!("Failed to parse config JSON: {e}");
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: PathBuf::from(CONFIG_FILE_NAME),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{CONFIG_VERSION})",
                    self.version
                ),
            });
        }

        if let Some(ref host) = self.server.host
            && host.trim().is_empty()
        {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "server.host cannot be an empty string".to_string(),
            });
        }

        if self.long_poll.poll_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "long_poll.poll_timeout_ms must be positive".to_string(),
            });
        }

        if self.long_poll.idle_timeout_ms <= self.long_poll.poll_timeout_ms {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "long_poll.idle_timeout_ms ({}) must exceed poll_timeout_ms ({})",
                    self.long_poll.idle_timeout_ms, self.long_poll.poll_timeout_ms
                ),
            });
        }

        if self.watch.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid debounce: {} (must be 0-{MAX_DEBOUNCE_MS})",
                    self.watch.debounce_ms
                ),
            });
        }

        if self.build.command.first().is_some_and(|program| program.trim().is_empty()) {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "build.command program cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn hub_options(&self) -> HubOptions {
        HubOptions {
            hot: self.client.hot,
            live_reload: self.client.live_reload,
            reconnect: self.client.reconnect,
            overlay: self.client.overlay,
        }
    }

    pub fn long_poll_options(&self) -> LongPollOptions {
        LongPollOptions {
            poll_timeout: Duration::from_millis(self.long_poll.poll_timeout_ms),
            idle_timeout: Duration::from_millis(self.long_poll.idle_timeout_ms),
        }
    }
}
