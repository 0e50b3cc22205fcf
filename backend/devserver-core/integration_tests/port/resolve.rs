use devserver_core::MAX_PORT;
use devserver_core::error::port::PortError;
use devserver_core::port::{
    LocalInterfaceSet, PortOptions, PortRequest, ProbeHost, resolve_port, resolve_port_with_retry,
};

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serial_test::serial;
use tokio::net::TcpListener;

fn options_from(base_port: u16) -> PortOptions {
    PortOptions {
        base_port,
        retries: 1,
        retry_delay: Duration::from_millis(10),
    }
}

/// Test helper: hold a loopback port for the duration of a test.
async fn occupy_any_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind a loopback port");
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Test helper: an IPv4 address of a real, non-loopback interface, if any.
fn lan_ipv4() -> Option<Ipv4Addr> {
    LocalInterfaceSet::discover()
        .hosts()
        .iter()
        .find_map(|host| match host {
            ProbeHost::Addr(IpAddr::V4(ip)) if !ip.is_loopback() && !ip.is_unspecified() => {
                Some(*ip)
            }
            _ => None,
        })
}

/// **VALUE**: An explicitly requested port comes back as-is.
///
/// **WHY THIS MATTERS**: Users who pin a port expect to get exactly that one,
/// and a pinned port must not cost a probe.
///
/// **BUG THIS CATCHES**: Would catch fixed ports being probed and bumped,
/// which silently moves the server somewhere the user is not looking.
#[tokio::test]
#[serial]
async fn given_fixed_port_when_resolving_then_returned_unchanged_without_probing() {
    // GIVEN: A port that is currently occupied
    let (_listener, port) = occupy_any_port().await;

    // WHEN: Requesting it explicitly
    let resolved = resolve_port(PortRequest::Fixed(port), None, &options_from(port)).await;

    // THEN: The same port, even though binding it would fail
    assert_eq!(resolved.unwrap(), port);
}

/// **VALUE**: Auto resolution steps past a port someone else holds.
///
/// **WHY THIS MATTERS**: The base port is frequently taken by another dev
/// server on the same machine.
///
/// **BUG THIS CATCHES**: Would catch the resolver probing only the wildcard
/// or only IPv6, which misses a process listening on loopback alone.
#[tokio::test]
#[serial]
async fn given_occupied_base_port_when_resolving_auto_then_next_free_port_is_returned() {
    // GIVEN: The base port is held on loopback
    let (_listener, base) = occupy_any_port().await;
    if base == MAX_PORT {
        return;
    }

    // WHEN: Resolving automatically from that base
    let resolved = resolve_port(PortRequest::Auto, None, &options_from(base))
        .await
        .expect("Should find a free port");

    // THEN: The next port when it is free, otherwise something further up
    match TcpListener::bind(("127.0.0.1", base + 1)).await {
        Ok(next) => {
            drop(next);
            assert_eq!(resolved, base + 1);
        }
        Err(_) => assert!(
            resolved > base + 1,
            "expected a port above {}, got {resolved}",
            base + 1
        ),
    }
}

#[tokio::test]
#[serial]
async fn given_free_base_port_when_resolving_auto_then_base_is_returned() {
    // GIVEN: A port that was just released
    let (listener, base) = occupy_any_port().await;
    drop(listener);

    // WHEN: Resolving from it
    let resolved = resolve_port(PortRequest::Auto, None, &options_from(base))
        .await
        .expect("Should find a free port");

    // THEN: Usually the base itself; never anything below it
    assert!(resolved >= base);
}

/// **VALUE**: A host that cannot be bound at all does not block resolution.
///
/// **BUG THIS CATCHES**: Would catch `AddrNotAvailable` being reported as a
/// fatal error or as an occupied port.
#[tokio::test]
#[serial]
async fn given_unassigned_host_when_resolving_then_candidate_is_accepted() {
    // GIVEN: A documentation-range address no interface carries
    let (listener, base) = occupy_any_port().await;
    drop(listener);

    // WHEN: Resolving for that host only
    let resolved = resolve_port(PortRequest::Auto, Some("192.0.2.1"), &options_from(base)).await;

    // THEN: The base port, since nothing refused it
    assert_eq!(resolved.unwrap(), base);
}

#[tokio::test]
#[serial]
async fn given_port_held_on_other_address_when_resolving_for_foreign_host_then_not_affected() {
    // GIVEN: A port held on 127.0.0.1 only
    let (_listener, base) = occupy_any_port().await;

    // WHEN: Resolving for a different loopback address outside the local set
    let resolved = resolve_port(PortRequest::Auto, Some("127.0.0.2"), &options_from(base)).await;

    // THEN: The port is free there
    assert_eq!(resolved.unwrap(), base);
}

/// **VALUE**: Naming a host by name only checks that host's addresses.
///
/// **BUG THIS CATCHES**: Would catch `localhost` being treated like the
/// wildcard, so a port another process holds on the LAN address pushes a
/// loopback-only server onto a different port.
#[tokio::test]
#[serial]
async fn given_port_held_on_lan_address_when_resolving_for_localhost_then_base_is_returned() {
    // GIVEN: A port held on a non-loopback interface only
    let Some(lan) = lan_ipv4() else {
        return;
    };
    let Ok(listener) = TcpListener::bind((lan, 0)).await else {
        return;
    };
    let base = listener.local_addr().unwrap().port();
    if base == MAX_PORT {
        return;
    }

    // WHEN: Resolving for localhost, and for every interface
    let for_localhost = resolve_port(PortRequest::Auto, Some("localhost"), &options_from(base))
        .await
        .expect("Should find a free port");
    let for_all = resolve_port(PortRequest::Auto, None, &options_from(base))
        .await
        .expect("Should find a free port");

    // THEN: Loopback is free at the base; the full set is not
    assert_eq!(for_localhost, base);
    assert!(for_all > base, "expected a port above {base}, got {for_all}");
}

/// **VALUE**: The top of the port range ends the search with a typed error.
///
/// **BUG THIS CATCHES**: Would catch a `u16` overflow wrapping the search
/// back to port 0, or an endless loop at 65535.
#[tokio::test]
#[serial]
async fn given_last_port_occupied_when_resolving_then_no_available_port() {
    // GIVEN: 65535 is held (by us, or already by someone else)
    let _guard = TcpListener::bind(("127.0.0.1", MAX_PORT)).await.ok();

    // WHEN: Resolving from the last port
    let result = resolve_port(PortRequest::Auto, None, &options_from(MAX_PORT)).await;

    // THEN: Range exhausted
    assert!(matches!(result, Err(PortError::NoAvailablePort { .. })));
}

#[tokio::test]
#[serial]
async fn given_exhausted_range_when_resolving_with_retry_then_fails_without_retrying() {
    let _guard = TcpListener::bind(("127.0.0.1", MAX_PORT)).await.ok();
    let options = PortOptions {
        base_port: MAX_PORT,
        retries: 3,
        retry_delay: Duration::from_secs(10),
    };

    let started = std::time::Instant::now();
    let result = resolve_port_with_retry(PortRequest::Auto, None, &options).await;

    assert!(matches!(result, Err(PortError::NoAvailablePort { .. })));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "permanent failures must not wait for retries"
    );
}

#[tokio::test]
#[serial]
async fn given_fixed_port_when_resolving_with_retry_then_returned_unchanged() {
    let resolved =
        resolve_port_with_retry(PortRequest::Fixed(4321), None, &PortOptions::default()).await;

    assert_eq!(resolved.unwrap(), 4321);
}
