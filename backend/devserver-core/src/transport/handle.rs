//! Transport server handle type.

use std::net::SocketAddr;

use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a running transport server.
///
/// Returned by [`start_ws_server`](crate::transport::start_ws_server) and
/// [`start_long_poll_server`](crate::transport::start_long_poll_server).
///
/// # Lifecycle
///
/// Keep the handle alive for as long as the server should run. Calling
/// [`ServerHandle::shutdown`] (or dropping the handle) stops accepting new
/// clients and closes every live connection, which in turn reports each one
/// closed to the observer.
///
/// # Examples
///
/// ```no_run
/// use devserver_core::hub::NotificationHub;
/// use devserver_core::transport::start_ws_server;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let hub = Arc::new(NotificationHub::default());
///     let handle = start_ws_server("127.0.0.1:0".parse()?, hub).await?;
///     println!("listening on {}", handle.local_addr());
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            local_addr,
            shutdown,
            task,
        }
    }

    /// Address the server actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop the server and wait for its accept loop to finish.
    pub async fn shutdown(self) {
        debug!("Shutting down transport on {}", self.local_addr);
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
