use crate::build_runner::BuildRunner;
use crate::error::DevServerError;
use crate::watcher::{ProjectWatcher, WatchRoots, spawn_change_router};

use common::ErrorLocation;
use devserver_core::config::DevServerConfig;
use devserver_core::hub::{CompilerEvent, NotificationHub, spawn_event_loop};
use devserver_core::port::{PortOptions, resolve_host, resolve_port_with_retry};
use devserver_core::transport::{ServerHandle, start_long_poll_server, start_ws_server};
use devserver_core::{LONG_POLL_PATH, MESSAGE_BUFFER};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::lookup_host;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything the devserver runs, started in dependency order.
pub struct DevServer {
    hub: Arc<NotificationHub>,
    ws: ServerHandle,
    long_poll: Option<ServerHandle>,
    watcher: Option<ProjectWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl DevServer {
    /// Resolve ports, start both transports, then the build pipeline.
    ///
    /// The first build starts immediately; clients connecting before it
    /// settles receive its status as soon as it does.
    ///
    /// # Errors
    ///
    /// Fails if the host cannot be resolved, no port is free, a transport
    /// cannot bind, or the watcher cannot start.
    pub async fn start(project_dir: &Path, config: DevServerConfig) -> Result<Self, DevServerError> {
        let host = config.server.host.as_deref().map(resolve_host).transpose()?;
        let port_options = PortOptions::from_env();

        let ws_port =
            resolve_port_with_retry(config.server.port, host.as_deref(), &port_options).await?;
        let hub = Arc::new(NotificationHub::new(config.hub_options()));
        let ws = start_ws_server(bind_addr(host.as_deref(), ws_port).await?, hub.clone()).await?;
        info!("WebSocket clients connect to ws://{}", ws.local_addr());

        let long_poll = if config.long_poll.enabled {
            let options = PortOptions {
                base_port: ws.port().saturating_add(1),
                ..port_options
            };
            let port =
                resolve_port_with_retry(config.long_poll.port, host.as_deref(), &options).await?;
            let handle = start_long_poll_server(
                bind_addr(host.as_deref(), port).await?,
                hub.clone(),
                config.long_poll_options(),
            )
            .await?;
            info!(
                "Long-poll clients connect to http://{}{LONG_POLL_PATH}",
                handle.local_addr()
            );
            Some(handle)
        } else {
            None
        };

        let (events_tx, events_rx) = mpsc::channel::<CompilerEvent>(MESSAGE_BUFFER);
        let mut tasks = vec![spawn_event_loop(hub.clone(), events_rx)];

        let debounce = Duration::from_millis(config.watch.debounce_ms);
        let (rebuild_tx, rebuild_rx) = mpsc::channel(1);
        let runner = BuildRunner::new(project_dir, &config.build, debounce, events_tx.clone());
        tasks.push(runner.spawn(rebuild_rx));

        let roots = WatchRoots::new(project_dir, &config.watch);
        let watcher = if roots.is_empty() {
            warn!("No watch directories exist; rebuilds will not be triggered");
            None
        } else {
            let (watcher, changes) = ProjectWatcher::new(roots, debounce)?;
            tasks.push(spawn_change_router(changes, rebuild_tx, events_tx));
            Some(watcher)
        };

        Ok(Self {
            hub,
            ws,
            long_poll,
            watcher,
            tasks,
        })
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn ws_addr(&self) -> SocketAddr {
        self.ws.local_addr()
    }

    pub fn long_poll_addr(&self) -> Option<SocketAddr> {
        self.long_poll.as_ref().map(ServerHandle::local_addr)
    }

    /// Stop the build pipeline, then close every client connection.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        drop(self.watcher);

        self.ws.shutdown().await;
        if let Some(long_poll) = self.long_poll {
            long_poll.shutdown().await;
        }
        info!("Devserver stopped");
    }
}

/// Socket address for a resolved host, or every IPv4 interface when unset.
pub(crate) async fn bind_addr(host: Option<&str>, port: u16) -> Result<SocketAddr, DevServerError> {
    let Some(host) = host else {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    };
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    lookup_host((host, port))
        .await
        .map_err(|e| DevServerError::DevServer {
            message: format!("Failed to resolve host '{host}': {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?
        .next()
        .ok_or_else(|| DevServerError::DevServer {
            message: format!("Host '{host}' has no addresses"),
            location: ErrorLocation::from(Location::caller()),
        })
}
