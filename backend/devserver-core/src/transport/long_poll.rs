//! HTTP long-polling transport.
//!
//! A client opens a session with `POST /__devserver/poll`, then repeatedly
//! `GET`s `/__devserver/poll/{id}`. Each `GET` returns every message queued
//! since the previous one as a JSON array, waiting up to `poll_timeout` for
//! the first to arrive. `DELETE` ends the session; sessions that stop polling
//! are reaped after `idle_timeout`.

use crate::error::transport::TransportError;
use crate::hub::{ClientConnection, ConnectionId, ConnectionObserver};
use crate::transport::AtomicReadyState;
use crate::transport::handle::ServerHandle;
use crate::{LONG_POLL_PATH, LONG_POLL_SESSION_PATH};

use common::ErrorLocation;
use models::ReadyState;

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::panic::Location;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::spawn as TokioSpawn;
use tokio::sync::{Notify, watch};

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(25);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const MIN_REAP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongPollOptions {
    /// Longest a `GET` waits for a message before answering `[]`.
    pub poll_timeout: Duration,
    /// Sessions not polled for this long are closed.
    pub idle_timeout: Duration,
}

impl Default for LongPollOptions {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Body of the session-open response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub id: String,
}

/// Server side of one long-poll session.
pub struct PollConnection {
    id: ConnectionId,
    state: AtomicReadyState,
    queue: Mutex<VecDeque<String>>,
    ready: Notify,
    last_seen: Mutex<Instant>,
}

impl PollConnection {
    fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            state: AtomicReadyState::new(ReadyState::Open),
            queue: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    fn drain(&self) -> Vec<String> {
        self.queue.lock().drain(..).collect()
    }

    fn close(&self) {
        self.state.store(ReadyState::Closed);
        self.ready.notify_waiters();
    }
}

impl ClientConnection for PollConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn ready_state(&self) -> ReadyState {
        self.state.load()
    }

    #[track_caller]
    fn send(&self, payload: &str) -> Result<(), TransportError> {
        if !self.ready_state().is_open() {
            return Err(TransportError::Closed {
                message: format!("Session {} is closed", self.id),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.queue.lock().push_back(payload.to_string());
        self.ready.notify_one();
        Ok(())
    }
}

struct LongPollState {
    observer: Arc<dyn ConnectionObserver>,
    sessions: RwLock<HashMap<ConnectionId, Arc<PollConnection>>>,
    options: LongPollOptions,
}

impl LongPollState {
    fn session(&self, id: &str) -> Option<Arc<PollConnection>> {
        let id = id.parse::<ConnectionId>().ok()?;
        self.sessions.read().get(&id).cloned()
    }

    fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.write().remove(&id);
        match removed {
            Some(session) => {
                session.close();
                self.observer.on_close(id);
                true
            }
            None => false,
        }
    }

    fn reap_idle(&self) {
        let stale: Vec<ConnectionId> = self
            .sessions
            .read()
            .values()
            .filter(|session| session.idle_for() >= self.options.idle_timeout)
            .map(|session| session.id)
            .collect();

        for id in stale {
            debug!("Reaping idle long-poll session {id}");
            self.remove(id);
        }
    }

    fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.sessions.read().keys().copied().collect();
        for id in ids {
            self.remove(id);
        }
    }
}

/// Starts the long-polling transport on `addr`.
///
/// # Arguments
///
/// * `addr` - Address to bind; port `0` lets the OS pick
/// * `observer` - Receives `on_connect` / `on_close` for every session
/// * `options` - Poll and idle timeouts
///
/// # Errors
///
/// Returns [`TransportError::Bind`] if the address cannot be bound.
pub async fn start_long_poll_server(
    addr: SocketAddr,
    observer: Arc<dyn ConnectionObserver>,
    options: LongPollOptions,
) -> Result<ServerHandle, TransportError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TransportError::Bind {
            message: format!("Failed to bind long-poll server on {addr}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
    let local_addr = listener.local_addr()?;

    let state = Arc::new(LongPollState {
        observer,
        sessions: RwLock::new(HashMap::new()),
        options,
    });

    let app = Router::new()
        .route(LONG_POLL_PATH, post(open_session))
        .route(LONG_POLL_SESSION_PATH, get(poll_session).delete(close_session))
        .with_state(Arc::clone(&state));

    info!("Long-poll server listening on {local_addr}{LONG_POLL_PATH}");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let reaper_state = Arc::clone(&state);
    let reaper = TokioSpawn(async move {
        let period = (reaper_state.options.idle_timeout / 2).max(MIN_REAP_INTERVAL);
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            reaper_state.reap_idle();
        }
    });

    let shutdown_state = Arc::clone(&state);
    let signal = async move {
        let _ = shutdown_rx.changed().await;
        // Wakes any pending GETs so graceful shutdown does not wait them out.
        shutdown_state.close_all();
    };

    let task = TokioSpawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
        {
            error!("Long-poll server on {local_addr} failed: {e}");
        }
        reaper.abort();
        state.close_all();
        info!("Long-poll server on {local_addr} stopped");
    });

    Ok(ServerHandle::new(local_addr, shutdown_tx, task))
}

async fn open_session(State(state): State<Arc<LongPollState>>) -> Json<SessionOpened> {
    let session = Arc::new(PollConnection::new());
    let id = session.id;

    state.sessions.write().insert(id, Arc::clone(&session));
    debug!("Opened long-poll session {id}");
    state
        .observer
        .on_connect(session as Arc<dyn ClientConnection>);

    Json(SessionOpened { id: id.to_string() })
}

async fn poll_session(
    State(state): State<Arc<LongPollState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(session) = state.session(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    session.touch();

    let deadline = tokio::time::Instant::now() + state.options.poll_timeout;
    let messages = loop {
        // Registered before the checks below, so a close or push landing in
        // between still wakes this poll.
        let notified = session.ready.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let messages = session.drain();
        if !messages.is_empty() {
            break messages;
        }
        if !session.ready_state().is_open() {
            return StatusCode::NOT_FOUND.into_response();
        }
        // A wakeup may be left over from messages an earlier poll already
        // took, so an empty queue after waking means wait again.
        if tokio::time::timeout_at(deadline, notified).await.is_err() {
            break Vec::new();
        }
    };
    session.touch();

    // Queued payloads are already serialized wire messages.
    let body = format!("[{}]", messages.join(","));
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn close_session(
    State(state): State<Arc<LongPollState>>,
    Path(id): Path<String>,
) -> StatusCode {
    match id.parse::<ConnectionId>() {
        Ok(id) if state.remove(id) => StatusCode::NO_CONTENT,
        _ => StatusCode::NOT_FOUND,
    }
}
