//! Local interface enumeration for port probing.

use crate::error::port::PortError;

use common::ErrorLocation;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::panic::Location;

use log::trace;
use sysinfo::Networks;

const LOCAL_IP: &str = "local-ip";
const LOCAL_IPV4: &str = "local-ipv4";
const LOCAL_IPV6: &str = "local-ipv6";

/// One address a candidate port is probed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeHost {
    /// No explicit address: whatever a bare `listen(port)` would bind.
    Default,
    Addr(IpAddr),
}

impl ProbeHost {
    pub const WILDCARD: ProbeHost = ProbeHost::Addr(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
}

impl Display for ProbeHost {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        match self {
            ProbeHost::Default => write!(formatter, "<default>"),
            ProbeHost::Addr(addr) => write!(formatter, "{addr}"),
        }
    }
}

/// De-duplicated probe targets: the wildcard, every interface address, and
/// the default placeholder, in that order.
///
/// Built fresh for every resolution since interfaces come and go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterfaceSet {
    hosts: Vec<ProbeHost>,
}

impl LocalInterfaceSet {
    /// Enumerate the addresses of all local network interfaces.
    pub fn discover() -> Self {
        Self::from_addrs(interface_addrs())
    }

    pub fn from_addrs<I>(addrs: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let mut set = Self {
            hosts: vec![ProbeHost::WILDCARD],
        };

        for addr in addrs {
            set.insert(ProbeHost::Addr(addr));
        }

        set.insert(ProbeHost::Default);
        set
    }

    fn insert(&mut self, host: ProbeHost) {
        if !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
    }

    pub fn hosts(&self) -> &[ProbeHost] {
        &self.hosts
    }

    pub fn contains(&self, host: &ProbeHost) -> bool {
        self.hosts.contains(host)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

fn interface_addrs() -> Vec<IpAddr> {
    let networks = Networks::new_with_refreshed_list();

    let mut addrs = Vec::new();
    for (name, data) in networks.list() {
        for network in data.ip_networks() {
            trace!("Interface {name}: {}/{}", network.addr, network.prefix);
            addrs.push(network.addr);
        }
    }

    addrs
}

/// Whether `addr` names "every interface" rather than one of them.
pub(crate) fn is_wildcard(addr: &IpAddr) -> bool {
    addr.is_unspecified()
}

fn is_link_local_v6(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Expand the `local-ip`, `local-ipv4` and `local-ipv6` keywords into the first
/// matching non-loopback interface address. Any other host is returned as-is.
#[track_caller]
pub fn resolve_host(host: &str) -> Result<String, PortError> {
    let location = ErrorLocation::from(Location::caller());

    let wanted: fn(&IpAddr) -> bool = match host {
        LOCAL_IP => |_| true,
        LOCAL_IPV4 => IpAddr::is_ipv4,
        LOCAL_IPV6 => IpAddr::is_ipv6,
        _ => return Ok(host.to_string()),
    };

    let mut candidates: Vec<IpAddr> = interface_addrs()
        .into_iter()
        .filter(|addr| !addr.is_loopback() && !is_wildcard(addr) && wanted(addr))
        .filter(|addr| match addr {
            IpAddr::V6(v6) => !is_link_local_v6(v6),
            IpAddr::V4(_) => true,
        })
        .collect();

    // IPv4 first so `local-ip` prefers the address most clients can reach.
    candidates.sort_by_key(|addr| addr.is_ipv6());

    candidates
        .first()
        .map(|addr| addr.to_string())
        .ok_or_else(|| PortError::HostResolution {
            message: format!("No non-loopback interface address matches '{host}'"),
            location,
        })
}
