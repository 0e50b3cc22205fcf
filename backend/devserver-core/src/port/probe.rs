use crate::port::interfaces::ProbeHost;

use std::io::{Error as IoError, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::{debug, trace};
use tokio::net::TcpListener;

/// How a single bind failure affects the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The address cannot be bound at all (stale interface); ignore this host.
    SkipHost,
    /// Something already owns the port, or we may not have it.
    Occupied,
    /// Unexpected failure; resolution cannot continue.
    Fatal,
}

/// Result of one successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Available,
    Skipped,
    Occupied,
}

pub fn classify(error: &IoError) -> ProbeVerdict {
    match error.kind() {
        ErrorKind::AddrNotAvailable | ErrorKind::InvalidInput => ProbeVerdict::SkipHost,
        ErrorKind::AddrInUse | ErrorKind::PermissionDenied => ProbeVerdict::Occupied,
        _ => ProbeVerdict::Fatal,
    }
}

/// `EAFNOSUPPORT`: the platform has no IPv6 socket support.
#[cfg(target_os = "linux")]
const ADDR_FAMILY_UNSUPPORTED: Option<i32> = Some(97);
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const ADDR_FAMILY_UNSUPPORTED: Option<i32> = Some(47);
#[cfg(windows)]
const ADDR_FAMILY_UNSUPPORTED: Option<i32> = Some(10047);
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    windows
)))]
const ADDR_FAMILY_UNSUPPORTED: Option<i32> = None;

/// Whether a failed `[::]` bind only means this machine cannot do IPv6.
pub(crate) fn is_ipv6_unavailable(error: &IoError) -> bool {
    error.kind() == ErrorKind::Unsupported
        || ADDR_FAMILY_UNSUPPORTED.is_some_and(|code| error.raw_os_error() == Some(code))
}

/// Bind `host:port` and release it immediately.
///
/// [`ProbeHost::Default`] tries the dual-stack `[::]` first and drops to
/// `0.0.0.0` only when IPv6 is unusable. Other `[::]` failures are returned.
pub(crate) async fn probe(host: ProbeHost, port: u16) -> Result<ProbeOutcome, IoError> {
    match host {
        ProbeHost::Addr(addr) => probe_addr(addr, port).await,
        ProbeHost::Default => match probe_addr(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port).await {
            Ok(ProbeOutcome::Skipped) => {
                debug!("IPv6 wildcard not bindable for port {port}; trying IPv4");
                probe_addr(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).await
            }
            Err(error) if is_ipv6_unavailable(&error) => {
                debug!("IPv6 unavailable for port {port} ({error}); trying IPv4");
                probe_addr(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).await
            }
            outcome => outcome,
        },
    }
}

async fn probe_addr(addr: IpAddr, port: u16) -> Result<ProbeOutcome, IoError> {
    let socket_addr = SocketAddr::new(addr, port);

    match TcpListener::bind(socket_addr).await {
        Ok(listener) => {
            drop(listener);
            trace!("Probe {socket_addr}: available");
            Ok(ProbeOutcome::Available)
        }
        Err(error) => match classify(&error) {
            ProbeVerdict::SkipHost => {
                trace!("Probe {socket_addr}: skipped ({error})");
                Ok(ProbeOutcome::Skipped)
            }
            ProbeVerdict::Occupied => {
                trace!("Probe {socket_addr}: occupied ({error})");
                Ok(ProbeOutcome::Occupied)
            }
            ProbeVerdict::Fatal => Err(error),
        },
    }
}
