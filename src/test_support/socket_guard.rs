//! Mock-server start-up for tests that need a loopback socket.
//!
//! Sandboxes without network namespaces cannot bind `127.0.0.1`; such tests
//! are skipped there unless `MFBULK_REQUIRE_SOCKET_TESTS` is set.

use std::future::Future;
use std::net::{Ipv4Addr, TcpListener};
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "MFBULK_REQUIRE_SOCKET_TESTS";

fn skipping_forbidden() -> bool {
    std::env::var(REQUIRE_ENV).is_ok_and(|value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    })
}

fn loopback_available() -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).is_ok()
}

/// Starts a wiremock server, or yields `None` when loopback is unavailable.
///
/// Panics instead of skipping when `MFBULK_REQUIRE_SOCKET_TESTS` is `1`,
/// `true` or `yes`. The reported location is the calling test.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl Future<Output = Option<MockServer>> {
    let caller = Location::caller();
    let available = loopback_available();
    if !available {
        let reason = format!("{caller}: no loopback socket for the mock server");
        assert!(!skipping_forbidden(), "{reason} ({REQUIRE_ENV} is set)");
        eprintln!("skipping {reason}; set {REQUIRE_ENV}=1 to fail instead");
    }
    async move {
        if available {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}
