//! A minimal reachability watcher standing in for the "network became reachable" input
//! collaborator `WebSource`'s refresh protocol assumes (§4.4). A periodic TCP probe against the
//! configured geolocate endpoint's host is enough to drive the reachable-transition refresh and
//! submission gates without pulling in a NetworkManager D-Bus dependency this workspace has no
//! other use for.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const PROBE_INTERVAL: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Pulls `host[:port]` out of a URL, defaulting to port 443 (every configured endpoint is https).
pub fn probe_target(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:443")
    }
}

/// Spawns the probe loop and returns a `watch::Receiver` that flips with each reachability
/// transition; cancelled via `cancel`.
pub fn spawn(probe_host: String, cancel: CancellationToken) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(run(probe_host, tx, cancel));
    rx
}

async fn run(probe_host: String, tx: watch::Sender<bool>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(PROBE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = cancel.cancelled() => return,
        }

        let reachable = tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&probe_host))
            .await
            .map(|connected| connected.is_ok())
            .unwrap_or(false);

        tx.send_if_modified(|current| {
            if *current != reachable {
                *current = reachable;
                true
            } else {
                false
            }
        });
        debug!(reachable, host = probe_host, "network reachability probe");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host_and_default_port_from_a_url() {
        assert_eq!(
            probe_target("https://location.services.mozilla.com/v1/geolocate?key=x"),
            "location.services.mozilla.com:443"
        );
    }

    #[test]
    fn preserves_an_explicit_port() {
        assert_eq!(probe_target("http://us1.unwiredlabs.com:8080/v2"), "us1.unwiredlabs.com:8080");
    }
}
