//! Free-port resolution across every local interface.
//!
//! A candidate port is only handed out when it can be bound on each address a
//! bare `listen(port)` might end up using, so the server never races another
//! process that holds the same port on a different interface.

pub mod interfaces;
pub mod probe;

pub use interfaces::{LocalInterfaceSet, ProbeHost, resolve_host};

use crate::error::port::PortError;
use crate::{
    BASE_PORT_ENV, DEFAULT_BASE_PORT, DEFAULT_PORT_RETRY, MAX_PORT, MIN_PORT, PORT_RETRY_ENV,
};

use common::ErrorLocation;
use probe::{ProbeOutcome, probe};

use std::env;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::future::Future;
use std::net::IpAddr;
use std::panic::Location;
use std::str::FromStr;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

const AUTO: &str = "auto";
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Which port the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "PortRepr", into = "PortRepr")]
pub enum PortRequest {
    /// Use exactly this port; nothing is probed.
    Fixed(u16),
    /// Search upward from the configured base port.
    #[default]
    Auto,
}

impl PortRequest {
    #[track_caller]
    pub fn fixed(port: u16) -> Result<Self, PortError> {
        if port < MIN_PORT {
            return Err(PortError::InvalidPort {
                message: format!("Port {port} is outside {MIN_PORT}..={MAX_PORT}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(PortRequest::Fixed(port))
    }
}

impl Display for PortRequest {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        match self {
            PortRequest::Fixed(port) => write!(formatter, "{port}"),
            PortRequest::Auto => write!(formatter, "{AUTO}"),
        }
    }
}

impl FromStr for PortRequest {
    type Err = PortError;

    #[track_caller]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case(AUTO) {
            return Ok(PortRequest::Auto);
        }

        let port = value.parse::<u16>().map_err(|e| PortError::InvalidPort {
            message: format!("'{value}' is neither a port number nor '{AUTO}': {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        PortRequest::fixed(port)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<PortRepr> for PortRequest {
    type Error = PortError;

    fn try_from(repr: PortRepr) -> Result<Self, Self::Error> {
        match repr {
            PortRepr::Number(number) => {
                let port = u16::try_from(number).map_err(|_| PortError::InvalidPort {
                    message: format!("Port {number} is outside {MIN_PORT}..={MAX_PORT}"),
                    location: ErrorLocation::from(Location::caller()),
                })?;
                PortRequest::fixed(port)
            }
            PortRepr::Text(text) => text.parse(),
        }
    }
}

impl From<PortRequest> for PortRepr {
    fn from(request: PortRequest) -> Self {
        match request {
            PortRequest::Fixed(port) => PortRepr::Number(u64::from(port)),
            PortRequest::Auto => PortRepr::Text(AUTO.to_string()),
        }
    }
}

/// Search and retry tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOptions {
    pub base_port: u16,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            retries: DEFAULT_PORT_RETRY,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl PortOptions {
    /// Defaults overridden by `DEVSERVER_BASE_PORT` / `DEVSERVER_PORT_RETRY`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(raw) = env::var(BASE_PORT_ENV) {
            match raw.trim().parse::<u16>() {
                Ok(port) if port >= MIN_PORT => options.base_port = port,
                _ => warn!(
                    "Ignoring {BASE_PORT_ENV}='{raw}': expected a port in {MIN_PORT}..={MAX_PORT}"
                ),
            }
        }

        if let Ok(raw) = env::var(PORT_RETRY_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(retries) => options.retries = retries,
                Err(e) => warn!("Ignoring {PORT_RETRY_ENV}='{raw}': {e}"),
            }
        }

        options
    }
}

/// A port together with the hosts it must be free on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    port: u16,
    hosts: Vec<ProbeHost>,
}

impl PortCandidate {
    #[track_caller]
    pub fn new(port: u16, hosts: Vec<ProbeHost>) -> Result<Self, PortError> {
        if port < MIN_PORT {
            return Err(PortError::InvalidPort {
                message: format!("Candidate port {port} is below {MIN_PORT}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(Self { port, hosts })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn hosts(&self) -> &[ProbeHost] {
        &self.hosts
    }

    /// The same hosts at `port + 1`, or `None` past the top of the range.
    pub fn next(self) -> Option<Self> {
        let port = self.port.checked_add(1)?;
        Some(Self {
            port,
            hosts: self.hosts,
        })
    }

    /// `Ok(true)` when no host refused the port.
    async fn is_free(&self) -> Result<bool, PortError> {
        for host in &self.hosts {
            match probe(*host, self.port).await {
                Ok(ProbeOutcome::Available) => {}
                Ok(ProbeOutcome::Skipped) => {
                    debug!("Skipping unbindable host {host} for port {}", self.port);
                }
                Ok(ProbeOutcome::Occupied) => return Ok(false),
                Err(e) => {
                    return Err(PortError::PortResolutionFailed {
                        message: format!("Probing {host}:{} failed: {e}", self.port),
                        location: ErrorLocation::from(Location::caller()),
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(true)
    }
}

/// Find a usable listening port.
///
/// `Fixed` requests come back untouched. `Auto` walks upward from
/// `options.base_port` until some port binds on every selected host.
pub async fn resolve_port(
    requested: PortRequest,
    host: Option<&str>,
    options: &PortOptions,
) -> Result<u16, PortError> {
    let base_port = match requested {
        PortRequest::Fixed(port) => return Ok(port),
        PortRequest::Auto => options.base_port,
    };

    let interfaces = LocalInterfaceSet::discover();
    let hosts = select_hosts(host, &interfaces).await?;
    debug!(
        "Searching for a free port from {base_port} across {} host(s)",
        hosts.len()
    );

    let mut candidate = Some(PortCandidate::new(base_port, hosts)?);
    while let Some(current) = candidate {
        if current.is_free().await? {
            info!("Resolved free port {}", current.port());
            return Ok(current.port());
        }
        candidate = current.next();
    }

    Err(PortError::NoAvailablePort {
        message: format!("No free port between {base_port} and {MAX_PORT}"),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// [`resolve_port`] with a bounded number of retries on probe failures.
pub async fn resolve_port_with_retry(
    requested: PortRequest,
    host: Option<&str>,
    options: &PortOptions,
) -> Result<u16, PortError> {
    let budget = RetryBudget::new(options.retries, options.retry_delay);
    retry_with_budget(budget, || resolve_port(requested, host, options)).await
}

/// Run `attempt` until it succeeds, fails for good, or `budget` runs out.
///
/// Only [`PortError::is_retryable`] failures are retried; the last failure is
/// returned once the budget is spent.
pub(crate) async fn retry_with_budget<F, Fut>(
    mut budget: RetryBudget,
    mut attempt: F,
) -> Result<u16, PortError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u16, PortError>>,
{
    loop {
        match attempt().await {
            Ok(port) => return Ok(port),
            Err(e) if e.is_retryable() => match budget.next_backoff() {
                Some(delay) => {
                    warn!("Port resolution failed, retrying in {delay:?}: {e}");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

/// Decide which hosts a candidate must be free on.
///
/// No host, a wildcard literal, or a literal address of one of our interfaces
/// means every local interface. A host name is looked up and only its own
/// addresses are probed, so `localhost` checks loopback alone.
pub(crate) async fn select_hosts(
    host: Option<&str>,
    interfaces: &LocalInterfaceSet,
) -> Result<Vec<ProbeHost>, PortError> {
    let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) else {
        return Ok(interfaces.hosts().to_vec());
    };

    if let Some(addr) = parse_literal(host) {
        if interfaces::is_wildcard(&addr) || interfaces.contains(&ProbeHost::Addr(addr)) {
            return Ok(interfaces.hosts().to_vec());
        }
        return Ok(vec![ProbeHost::Addr(addr)]);
    }

    Ok(lookup(host).await?.into_iter().map(ProbeHost::Addr).collect())
}

/// `127.0.0.1`, `::1` or `[::1]` as an address; `None` for host names.
fn parse_literal(host: &str) -> Option<IpAddr> {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok()
}

async fn lookup(host: &str) -> Result<Vec<IpAddr>, PortError> {
    let location = ErrorLocation::from(Location::caller());

    let resolved = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| PortError::HostResolution {
            message: format!("Failed to resolve host '{host}': {e}"),
            location,
        })?;

    let mut addrs: Vec<IpAddr> = Vec::new();
    for socket_addr in resolved {
        if !addrs.contains(&socket_addr.ip()) {
            addrs.push(socket_addr.ip());
        }
    }

    if addrs.is_empty() {
        return Err(PortError::HostResolution {
            message: format!("Host '{host}' resolved to no addresses"),
            location,
        });
    }

    Ok(addrs)
}

/// A constant delay that gives up after `retries` attempts.
pub(crate) struct RetryBudget {
    delay: Constant,
    remaining: u32,
}

impl RetryBudget {
    pub(crate) fn new(retries: u32, delay: Duration) -> Self {
        Self {
            delay: Constant::new(delay),
            remaining: retries,
        }
    }
}

impl Backoff for RetryBudget {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.delay.next_backoff()
    }

    fn reset(&mut self) {
        self.delay.reset();
    }
}
