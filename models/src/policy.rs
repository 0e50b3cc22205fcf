//! Client-side policies announced by the hub when a connection opens.
//!
//! Both policies accept the loose JSON shapes browser clients are configured
//! with (`true`, `false`, a number, or an object) and serialize back to the
//! same shapes.

use serde::{Deserialize, Serialize};

const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;

/// How often a client retries after its connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ReconnectRepr", into = "ReconnectRepr")]
pub enum ReconnectPolicy {
    /// Never retry; the first close is terminal.
    Disabled,
    /// Retry at most this many times in a row.
    Limited(u32),
    /// Retry until the owning session cancels the client.
    Always,
}

impl ReconnectPolicy {
    /// Whether another attempt is allowed after `retries` consecutive failures.
    pub fn allows_retry(self, retries: u32) -> bool {
        match self {
            ReconnectPolicy::Disabled => false,
            ReconnectPolicy::Limited(max) => retries < max,
            ReconnectPolicy::Always => true,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Limited(DEFAULT_RECONNECT_ATTEMPTS)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ReconnectRepr {
    Flag(bool),
    Count(u32),
}

impl From<ReconnectRepr> for ReconnectPolicy {
    fn from(repr: ReconnectRepr) -> Self {
        match repr {
            ReconnectRepr::Flag(true) => ReconnectPolicy::Always,
            ReconnectRepr::Flag(false) | ReconnectRepr::Count(0) => ReconnectPolicy::Disabled,
            ReconnectRepr::Count(n) => ReconnectPolicy::Limited(n),
        }
    }
}

impl From<ReconnectPolicy> for ReconnectRepr {
    fn from(policy: ReconnectPolicy) -> Self {
        match policy {
            ReconnectPolicy::Disabled => ReconnectRepr::Flag(false),
            ReconnectPolicy::Limited(n) => ReconnectRepr::Count(n),
            ReconnectPolicy::Always => ReconnectRepr::Flag(true),
        }
    }
}

/// Which diagnostics the client shows in its overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OverlayRepr", into = "OverlayRepr")]
pub enum OverlayPolicy {
    Disabled,
    Enabled,
    Custom { errors: bool, warnings: bool },
}

impl OverlayPolicy {
    pub fn shows_errors(self) -> bool {
        match self {
            OverlayPolicy::Disabled => false,
            OverlayPolicy::Enabled => true,
            OverlayPolicy::Custom { errors, .. } => errors,
        }
    }

    pub fn shows_warnings(self) -> bool {
        match self {
            OverlayPolicy::Disabled => false,
            OverlayPolicy::Enabled => true,
            OverlayPolicy::Custom { warnings, .. } => warnings,
        }
    }

    pub fn is_enabled(self) -> bool {
        self.shows_errors() || self.shows_warnings()
    }
}

impl Default for OverlayPolicy {
    fn default() -> Self {
        OverlayPolicy::Enabled
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OverlayRepr {
    Flag(bool),
    Detailed(OverlayDetail),
}

#[derive(Serialize, Deserialize)]
struct OverlayDetail {
    #[serde(default = "default_true")]
    errors: bool,
    #[serde(default = "default_true")]
    warnings: bool,
}

fn default_true() -> bool {
    true
}

impl From<OverlayRepr> for OverlayPolicy {
    fn from(repr: OverlayRepr) -> Self {
        match repr {
            OverlayRepr::Flag(true) => OverlayPolicy::Enabled,
            OverlayRepr::Flag(false) => OverlayPolicy::Disabled,
            OverlayRepr::Detailed(OverlayDetail { errors, warnings }) => {
                OverlayPolicy::Custom { errors, warnings }
            }
        }
    }
}

impl From<OverlayPolicy> for OverlayRepr {
    fn from(policy: OverlayPolicy) -> Self {
        match policy {
            OverlayPolicy::Disabled => OverlayRepr::Flag(false),
            OverlayPolicy::Enabled => OverlayRepr::Flag(true),
            OverlayPolicy::Custom { errors, warnings } => {
                OverlayRepr::Detailed(OverlayDetail { errors, warnings })
            }
        }
    }
}
