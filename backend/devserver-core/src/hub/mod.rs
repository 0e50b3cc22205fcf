//! Build-notification fan-out.
//!
//! The hub holds the current build snapshot and a weak registry of client
//! connections. Compiler events come in through [`NotificationHub::on_invalid`],
//! [`NotificationHub::on_done`] and [`NotificationHub::on_static_file_changed`];
//! transports report connections through [`ConnectionObserver`].
//!
//! Every outgoing message is serialized once and enqueued on each open
//! connection. A broken connection never fails a broadcast.

pub mod connection;
pub mod events;

pub use connection::{ClientConnection, ConnectionId, ConnectionObserver};
pub use events::{CompilerEvent, spawn_event_loop};

use models::{BuildState, OverlayPolicy, ReconnectPolicy, ServerMessage};

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};

/// Where the hub is in the compile cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildPhase {
    /// No compiler event seen yet.
    #[default]
    Idle,
    /// A rebuild is in progress.
    Invalidated,
    /// The last rebuild finished.
    Settled,
}

/// Client settings announced to every connection when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubOptions {
    pub hot: bool,
    pub live_reload: bool,
    pub reconnect: ReconnectPolicy,
    pub overlay: OverlayPolicy,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            hot: true,
            live_reload: true,
            reconnect: ReconnectPolicy::default(),
            overlay: OverlayPolicy::default(),
        }
    }
}

impl HubOptions {
    fn handshake(&self) -> [ServerMessage; 4] {
        [
            ServerMessage::Hot(self.hot),
            ServerMessage::LiveReload(self.live_reload),
            ServerMessage::Reconnect(self.reconnect),
            ServerMessage::Overlay(self.overlay),
        ]
    }
}

pub struct NotificationHub {
    options: HubOptions,
    connections: RwLock<HashMap<ConnectionId, Weak<dyn ClientConnection>>>,
    current: RwLock<Option<BuildState>>,
    phase: RwLock<BuildPhase>,
    // Held for the whole of every emission so messages from concurrent callers
    // never interleave on a connection.
    emit_lock: Mutex<()>,
}

impl NotificationHub {
    pub fn new(options: HubOptions) -> Self {
        Self {
            options,
            connections: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            phase: RwLock::new(BuildPhase::Idle),
            emit_lock: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &HubOptions {
        &self.options
    }

    pub fn phase(&self) -> BuildPhase {
        *self.phase.read()
    }

    /// Hash of the last adopted build, if any build has settled.
    pub fn current_hash(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|state| state.hash().to_string())
    }

    /// Connections that are still alive, open or not.
    pub fn client_count(&self) -> usize {
        self.connections
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// The compiler started rebuilding.
    pub fn on_invalid(&self) {
        let _guard = self.emit_lock.lock();
        *self.phase.write() = BuildPhase::Invalidated;
        debug!("Build invalidated");
        self.deliver_all(&ServerMessage::Invalid);
    }

    /// The compiler finished; announce the new state unless nothing changed.
    ///
    /// `force` always announces the full status, even for an identical clean
    /// build.
    pub fn on_done(&self, new_state: BuildState, force: bool) {
        let _guard = self.emit_lock.lock();
        *self.phase.write() = BuildPhase::Settled;

        let unchanged = !force
            && new_state.is_clean()
            && self
                .current
                .read()
                .as_ref()
                .is_some_and(|current| current.hash() == new_state.hash());

        if unchanged {
            trace!("Build {} unchanged", new_state.hash());
            self.deliver_all(&ServerMessage::StillOk);
            return;
        }

        info!(
            "Build {} settled: {} error(s), {} warning(s)",
            new_state.hash(),
            new_state.errors().len(),
            new_state.warnings().len()
        );

        let messages = status_messages(&new_state);
        *self.current.write() = Some(new_state);

        for message in &messages {
            self.deliver_all(message);
        }
    }

    /// A static asset changed outside the compile cycle.
    pub fn on_static_file_changed(&self, path: &str) {
        let _guard = self.emit_lock.lock();
        debug!("Static file changed: {path}");
        self.deliver_all(&ServerMessage::StaticChanged(path.to_string()));
    }

    /// Send one message to every open connection.
    pub fn broadcast(&self, message: &ServerMessage) {
        let _guard = self.emit_lock.lock();
        self.deliver_all(message);
    }

    fn deliver_all(&self, message: &ServerMessage) {
        let targets = self.live_connections();
        deliver(&targets, message);
    }

    /// Snapshot of connections whose weak handle still upgrades. The registry
    /// lock is released before anything is sent.
    fn live_connections(&self) -> Vec<Arc<dyn ClientConnection>> {
        self.connections
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(HubOptions::default())
    }
}

impl ConnectionObserver for NotificationHub {
    fn on_connect(&self, connection: Arc<dyn ClientConnection>) {
        let _guard = self.emit_lock.lock();
        let id = connection.id();

        self.connections
            .write()
            .insert(id, Arc::downgrade(&connection));
        info!("Client {id} connected ({} total)", self.client_count());

        let target = [connection];
        for message in &self.options.handshake() {
            deliver(&target, message);
        }

        let replay = self.current.read().as_ref().map(status_messages);
        if let Some(messages) = replay {
            for message in &messages {
                deliver(&target, message);
            }
        }
    }

    fn on_close(&self, id: ConnectionId) {
        if self.connections.write().remove(&id).is_some() {
            info!("Client {id} disconnected ({} remaining)", self.client_count());
        }
    }
}

/// Full status announcement for a settled build: `hash`, then `warnings`
/// and/or `errors`, or `ok` when there are neither.
pub fn status_messages(state: &BuildState) -> Vec<ServerMessage> {
    let mut messages = vec![ServerMessage::Hash(state.hash().to_string())];

    if state.has_warnings() {
        messages.push(ServerMessage::Warnings {
            warnings: state.warnings().to_vec(),
            prevent_reloading: state.has_errors(),
        });
    }

    if state.has_errors() {
        messages.push(ServerMessage::Errors(state.errors().to_vec()));
    }

    if state.is_clean() {
        messages.push(ServerMessage::Ok);
    }

    messages
}

fn deliver(targets: &[Arc<dyn ClientConnection>], message: &ServerMessage) {
    let payload = match message.to_json() {
        Ok(payload) => payload,
        Err(e) => {
            error!("Dropping '{}' message: {e}", message.kind());
            return;
        }
    };

    for connection in targets {
        if !connection.ready_state().is_open() {
            trace!(
                "Skipping client {} in state {:?}",
                connection.id(),
                connection.ready_state()
            );
            continue;
        }

        if let Err(e) = connection.send(&payload) {
            warn!("Failed to notify client {}: {e}", connection.id());
        }
    }
}

