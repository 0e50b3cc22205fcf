// Unit tests for port module private helpers
// Integration tests for resolve_port are in integration_tests/port/resolve.rs

use crate::error::port::PortError;
use crate::port::probe::{ProbeVerdict, classify, is_ipv6_unavailable};
use crate::port::{
    LocalInterfaceSet, PortCandidate, PortOptions, PortRequest, ProbeHost, RetryBudget,
    retry_with_budget, select_hosts,
};
use crate::{BASE_PORT_ENV, DEFAULT_BASE_PORT, MAX_PORT, PORT_RETRY_ENV};

use common::ErrorLocation;

use std::io::{Error as IoError, ErrorKind};
use std::net::{IpAddr, Ipv4Addr};
use std::panic::Location;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::backoff::Backoff;
use serial_test::serial;

fn loopback() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn bind_failure() -> PortError {
    PortError::PortResolutionFailed {
        message: "bind failed".to_string(),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(IoError::from(ErrorKind::ConnectionReset)),
    }
}

/// **VALUE**: Each bind failure kind maps to the right search decision.
///
/// **WHY THIS MATTERS**: Stale interfaces must be skipped, busy ports
/// advanced past, and anything unexpected reported instead of looping.
///
/// **BUG THIS CATCHES**: Would catch `AddrNotAvailable` being treated as busy,
/// which makes a machine with a dead VPN interface reject every port.
#[test]
fn given_bind_errors_when_classified_then_match_search_policy() {
    let verdict = |kind| classify(&IoError::from(kind));

    assert_eq!(verdict(ErrorKind::AddrNotAvailable), ProbeVerdict::SkipHost);
    assert_eq!(verdict(ErrorKind::InvalidInput), ProbeVerdict::SkipHost);
    assert_eq!(verdict(ErrorKind::AddrInUse), ProbeVerdict::Occupied);
    assert_eq!(verdict(ErrorKind::PermissionDenied), ProbeVerdict::Occupied);
    assert_eq!(verdict(ErrorKind::ConnectionReset), ProbeVerdict::Fatal);
}

#[test]
fn given_missing_ipv6_support_when_checking_bind_error_then_only_that_falls_back() {
    // GIVEN: An unsupported-family error and an unrelated failure
    let unsupported = IoError::from(ErrorKind::Unsupported);
    let unrelated = IoError::from(ErrorKind::ConnectionReset);

    // WHEN / THEN: Only the former means "try IPv4 instead"
    assert!(is_ipv6_unavailable(&unsupported));
    assert!(!is_ipv6_unavailable(&unrelated));
}

#[cfg(target_os = "linux")]
#[test]
fn given_eafnosupport_when_checking_bind_error_then_ipv6_is_unavailable() {
    assert!(is_ipv6_unavailable(&IoError::from_raw_os_error(97)));
    // EMFILE is a real failure, not a missing stack.
    assert!(!is_ipv6_unavailable(&IoError::from_raw_os_error(24)));
}

#[test]
fn given_duplicate_addresses_when_building_set_then_deduplicated_with_wildcard_and_default() {
    // GIVEN: Interface addresses with a duplicate and an explicit wildcard
    let addrs = vec![
        loopback(),
        loopback(),
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    ];

    // WHEN: Building the set
    let set = LocalInterfaceSet::from_addrs(addrs);

    // THEN: Wildcard first, loopback once, default placeholder last
    assert_eq!(
        set.hosts(),
        &[
            ProbeHost::WILDCARD,
            ProbeHost::Addr(loopback()),
            ProbeHost::Default
        ]
    );
}

#[test]
fn given_top_port_when_advancing_candidate_then_range_is_exhausted() {
    let candidate = PortCandidate::new(MAX_PORT, vec![ProbeHost::Default]).unwrap();

    assert!(candidate.next().is_none());
}

#[test]
fn given_port_below_range_when_creating_candidate_then_invalid_port() {
    let result = PortCandidate::new(80, vec![ProbeHost::Default]);

    assert!(matches!(result, Err(PortError::InvalidPort { .. })));
}

#[test]
fn given_candidate_when_advanced_then_hosts_are_kept() {
    let hosts = vec![ProbeHost::WILDCARD, ProbeHost::Default];
    let candidate = PortCandidate::new(9000, hosts.clone()).unwrap();

    let next = candidate.next().unwrap();

    assert_eq!(next.port(), 9001);
    assert_eq!(next.hosts(), hosts.as_slice());
}

#[test]
fn given_port_strings_when_parsed_then_fixed_auto_or_invalid() {
    assert_eq!("8081".parse::<PortRequest>().unwrap(), PortRequest::Fixed(8081));
    assert_eq!(" AUTO ".parse::<PortRequest>().unwrap(), PortRequest::Auto);
    assert!(matches!(
        "eighty".parse::<PortRequest>(),
        Err(PortError::InvalidPort { .. })
    ));
    assert!(matches!(
        "80".parse::<PortRequest>(),
        Err(PortError::InvalidPort { .. })
    ));
}

/// **VALUE**: An explicit host outside the local set is probed alone.
///
/// **BUG THIS CATCHES**: Would catch the resolver probing every interface
/// for a host the server will never bind, rejecting ports that are free there.
#[tokio::test]
async fn given_foreign_host_when_selecting_then_only_that_host_is_probed() {
    // GIVEN: A local set containing only loopback
    let set = LocalInterfaceSet::from_addrs(vec![loopback()]);

    // WHEN: Selecting for an address that is not local
    let hosts = select_hosts(Some("192.0.2.10"), &set).await.unwrap();

    // THEN: Only that address
    assert_eq!(hosts, vec![ProbeHost::Addr("192.0.2.10".parse().unwrap())]);
}

#[tokio::test]
async fn given_local_or_wildcard_host_when_selecting_then_every_local_host_is_probed() {
    let set = LocalInterfaceSet::from_addrs(vec![loopback()]);

    let none = select_hosts(None, &set).await.unwrap();
    let wildcard = select_hosts(Some("0.0.0.0"), &set).await.unwrap();
    let v6_wildcard = select_hosts(Some("::"), &set).await.unwrap();
    let local = select_hosts(Some("127.0.0.1"), &set).await.unwrap();

    for hosts in [none, wildcard, v6_wildcard, local] {
        assert_eq!(hosts.as_slice(), set.hosts());
    }
}

/// **VALUE**: A host name is looked up and only its own addresses are used.
///
/// **BUG THIS CATCHES**: Would catch `localhost` being widened to every
/// interface because it resolves to a local address, which makes a port held
/// on the LAN address block a server that only listens on loopback.
#[tokio::test]
async fn given_localhost_name_when_selecting_then_only_loopback_is_checked() {
    // GIVEN: A local set with loopback plus the wildcard and default entries
    let set = LocalInterfaceSet::from_addrs(vec![loopback()]);

    // WHEN: Selecting by name
    let hosts = select_hosts(Some("localhost"), &set).await.unwrap();

    // THEN: Loopback addresses only, not the whole local set
    assert!(!hosts.is_empty());
    assert_ne!(hosts.as_slice(), set.hosts());
    for host in &hosts {
        assert!(
            matches!(host, ProbeHost::Addr(ip) if ip.is_loopback()),
            "unexpected host {host}"
        );
    }
}

#[tokio::test]
async fn given_bracketed_ipv6_literal_when_selecting_then_brackets_are_ignored() {
    let set = LocalInterfaceSet::from_addrs(vec![loopback()]);

    let wildcard = select_hosts(Some("[::]"), &set).await.unwrap();
    let foreign = select_hosts(Some("[2001:db8::1]"), &set).await.unwrap();

    assert_eq!(wildcard.as_slice(), set.hosts());
    assert_eq!(foreign, vec![ProbeHost::Addr("2001:db8::1".parse().unwrap())]);
}

#[test]
fn given_retry_budget_when_drawing_delays_then_exactly_that_many_are_given() {
    // GIVEN: A budget of three retries
    let delay = Duration::from_millis(25);
    let mut budget = RetryBudget::new(3, delay);

    // WHEN: Drawing delays until it runs dry
    let delays: Vec<_> = std::iter::from_fn(|| budget.next_backoff()).collect();

    // THEN: Three constant delays, then nothing more
    assert_eq!(delays, vec![delay; 3]);
    assert_eq!(budget.next_backoff(), None);
}

#[test]
fn given_zero_retries_when_drawing_delay_then_none() {
    let mut budget = RetryBudget::new(0, Duration::from_millis(25));

    assert_eq!(budget.next_backoff(), None);
}

/// **VALUE**: Transient probe failures are retried, then surfaced.
///
/// **WHY THIS MATTERS**: A flaky bind must not kill startup on the first try,
/// but a persistent one must not loop forever either.
#[tokio::test]
async fn given_persistent_bind_failure_when_retrying_then_error_after_budget() {
    // GIVEN: An attempt that always fails in a retryable way
    let attempts = AtomicU32::new(0);
    let budget = RetryBudget::new(2, Duration::from_millis(1));

    // WHEN: Retrying with a budget of two
    let result = retry_with_budget(budget, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(bind_failure()) }
    })
    .await;

    // THEN: One try plus two retries, then the failure itself
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(matches!(result, Err(PortError::PortResolutionFailed { .. })));
}

#[tokio::test]
async fn given_one_transient_failure_when_retrying_then_port_is_returned() {
    let attempts = AtomicU32::new(0);
    let budget = RetryBudget::new(2, Duration::from_millis(1));

    let result = retry_with_budget(budget, || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(bind_failure())
            } else {
                Ok(9123)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 9123);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn given_exhausted_range_when_retrying_then_no_retry_happens() {
    let attempts = AtomicU32::new(0);
    let budget = RetryBudget::new(5, Duration::from_millis(1));

    let result = retry_with_budget(budget, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async {
            Err(PortError::NoAvailablePort {
                message: "range exhausted".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
        }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(matches!(result, Err(PortError::NoAvailablePort { .. })));
}

#[test]
#[serial]
fn given_env_overrides_when_reading_options_then_they_apply() {
    // GIVEN: Both tunables set
    unsafe {
        std::env::set_var(BASE_PORT_ENV, "9100");
        std::env::set_var(PORT_RETRY_ENV, "7");
    }

    // WHEN: Reading options
    let options = PortOptions::from_env();

    // THEN: Overrides are used
    assert_eq!(options.base_port, 9100);
    assert_eq!(options.retries, 7);

    unsafe {
        std::env::remove_var(BASE_PORT_ENV);
        std::env::remove_var(PORT_RETRY_ENV);
    }
}

#[test]
#[serial]
fn given_garbage_env_when_reading_options_then_defaults_apply() {
    unsafe {
        std::env::set_var(BASE_PORT_ENV, "80");
        std::env::set_var(PORT_RETRY_ENV, "many");
    }

    let options = PortOptions::from_env();

    assert_eq!(options, PortOptions::default());
    assert_eq!(options.base_port, DEFAULT_BASE_PORT);

    unsafe {
        std::env::remove_var(BASE_PORT_ENV);
        std::env::remove_var(PORT_RETRY_ENV);
    }
}
