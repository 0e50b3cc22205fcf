//! What a browser client does with each hub message.
//!
//! [`ClientState::handle`] is a pure reducer: it updates the client's view of
//! the build and returns the UI actions to perform, without performing any.

use models::{BuildMessage, OverlayPolicy, ReconnectPolicy, ServerMessage};

use log::{debug, info};

/// Client settings; the hub overwrites them with its handshake on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub hot: bool,
    pub live_reload: bool,
    pub overlay: OverlayPolicy,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            hot: true,
            live_reload: true,
            overlay: OverlayPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Something the page should do in response to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// A rebuild started; the page content is out of date.
    MarkStale,
    ShowErrors(Vec<BuildMessage>),
    ShowWarnings(Vec<BuildMessage>),
    HideOverlay,
    /// Swap in the modules of the build with this hash without a reload.
    ApplyHotUpdate(String),
    /// Full page reload.
    Reload,
}

/// Client's view of the last build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildStatus {
    #[default]
    Unknown,
    Building,
    Ok,
    Warnings,
    Errors,
}

#[derive(Debug, Clone, Default)]
pub struct ClientState {
    options: ClientOptions,
    current_hash: Option<String>,
    previous_hash: Option<String>,
    prevent_reloading: bool,
    status: BuildStatus,
    settled_status: BuildStatus,
    overlay_visible: bool,
}

impl ClientState {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn current_hash(&self) -> Option<&str> {
        self.current_hash.as_deref()
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn handle(&mut self, message: ServerMessage) -> Vec<ClientAction> {
        match message {
            ServerMessage::Invalid => {
                info!("Recompiling...");
                self.status = BuildStatus::Building;
                vec![ClientAction::MarkStale]
            }
            ServerMessage::Hash(hash) => {
                self.previous_hash = self.current_hash.replace(hash);
                self.prevent_reloading = false;
                Vec::new()
            }
            ServerMessage::StillOk => {
                info!("Nothing changed.");
                self.status = self.settled_status;
                Vec::new()
            }
            ServerMessage::Ok => {
                self.settle(BuildStatus::Ok);

                let mut actions = Vec::new();
                if self.overlay_visible {
                    self.overlay_visible = false;
                    actions.push(ClientAction::HideOverlay);
                }
                actions.extend(self.reload_action());
                actions
            }
            ServerMessage::Warnings {
                warnings,
                prevent_reloading,
            } => {
                self.settle(BuildStatus::Warnings);
                self.prevent_reloading = prevent_reloading;

                let mut actions = Vec::new();
                // Errors follow when reloading is prevented and take the overlay.
                if !prevent_reloading && self.options.overlay.shows_warnings() {
                    self.overlay_visible = true;
                    actions.push(ClientAction::ShowWarnings(warnings));
                }
                actions.extend(self.reload_action());
                actions
            }
            ServerMessage::Errors(errors) => {
                self.settle(BuildStatus::Errors);
                // A page with errors must stay put until a good build arrives.
                self.prevent_reloading = true;

                if self.options.overlay.shows_errors() {
                    self.overlay_visible = true;
                    vec![ClientAction::ShowErrors(errors)]
                } else {
                    Vec::new()
                }
            }
            ServerMessage::StaticChanged(path) => {
                if self.options.live_reload {
                    info!("{path} changed, reloading");
                    vec![ClientAction::Reload]
                } else {
                    Vec::new()
                }
            }
            ServerMessage::Hot(enabled) => {
                self.options.hot = enabled;
                Vec::new()
            }
            ServerMessage::LiveReload(enabled) => {
                self.options.live_reload = enabled;
                Vec::new()
            }
            ServerMessage::Reconnect(policy) => {
                self.options.reconnect = policy;
                Vec::new()
            }
            ServerMessage::Overlay(policy) => {
                self.options.overlay = policy;
                if !policy.is_enabled() && self.overlay_visible {
                    self.overlay_visible = false;
                    return vec![ClientAction::HideOverlay];
                }
                Vec::new()
            }
        }
    }

    fn settle(&mut self, status: BuildStatus) {
        self.status = status;
        self.settled_status = status;
    }

    /// Reload only when a previously seen build was replaced by a different one.
    fn reload_action(&self) -> Option<ClientAction> {
        if self.prevent_reloading {
            debug!("Reload suppressed by build errors");
            return None;
        }

        let current = self.current_hash.as_ref()?;
        let previous = self.previous_hash.as_ref()?;
        if current == previous {
            return None;
        }

        if self.options.hot {
            Some(ClientAction::ApplyHotUpdate(current.clone()))
        } else if self.options.live_reload {
            Some(ClientAction::Reload)
        } else {
            None
        }
    }
}
