//! [`Manager`]: the `org.freedesktop.GeoClue2.Manager` interface, one per process (§4, C9, C10).
//! Allocates a [`ClientService`] per peer, tracks how many are currently registered, and drives
//! the idle-shutdown timer (§9: quit after 5s with zero clients, cancelled by a new one).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zbus::fdo::DBusProxy;
use zbus::message::Header;
use zbus::names::OwnedUniqueName;
use zbus::zvariant::OwnedObjectPath;
use zbus::{interface, Connection};

use crate::client::ClientService;
use crate::error::{BusError, Result};
use crate::provider::LocationProvider;

pub const BUS_NAME: &str = "org.freedesktop.GeoClue2";
pub const MANAGER_PATH: &str = "/org/freedesktop/GeoClue2/Manager";
pub const MANAGER_INTERFACE: &str = "org.freedesktop.GeoClue2.Manager";

/// How long the process keeps running after its last client disconnects.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Manager {
    connection: Connection,
    provider: Arc<dyn LocationProvider>,
    /// Keyed by peer rather than object path: §4.10 requires a peer that calls `GetClient()`
    /// more than once to get back the path of its existing `ClientService`, not a new one.
    clients: HashMap<OwnedUniqueName, OwnedObjectPath>,
    next_client_id: u64,
    connected_count_tx: watch::Sender<u32>,
}

impl Manager {
    pub fn new(connection: Connection, provider: Arc<dyn LocationProvider>) -> Self {
        let (connected_count_tx, _rx) = watch::channel(0);
        Self {
            connection,
            provider,
            clients: HashMap::new(),
            next_client_id: 0,
            connected_count_tx,
        }
    }

    fn notify_count_changed(&self) {
        self.connected_count_tx
            .send_replace(self.clients.len() as u32);
    }
}

#[interface(name = "org.freedesktop.GeoClue2.Manager")]
impl Manager {
    #[zbus(property, name = "ConnectedClients")]
    fn connected_clients(&self) -> u32 {
        self.clients.len() as u32
    }

    #[zbus(name = "GetClient")]
    async fn get_client(
        &mut self,
        #[zbus(header)] header: Header<'_>,
    ) -> Result<OwnedObjectPath> {
        let owner: OwnedUniqueName = header
            .sender()
            .ok_or_else(|| BusError::failed("anonymous caller has no unique bus name"))?
            .to_owned()
            .into();

        if let Some(existing) = self.clients.get(&owner) {
            debug!(path = %existing, %owner, "returning existing Client for peer");
            return Ok(existing.clone());
        }

        let id = self.next_client_id;
        self.next_client_id += 1;
        let path = OwnedObjectPath::try_from(format!("{MANAGER_PATH}/Client/{id}"))
            .map_err(|e| BusError::failed(e.to_string()))?;

        let client = ClientService::new(
            path.clone(),
            self.connection.clone(),
            owner.clone(),
            self.provider.clone(),
        );
        self.connection
            .object_server()
            .at(path.clone(), client)
            .await
            .map_err(BusError::ZBus)?;

        self.clients.insert(owner.clone(), path.clone());
        self.notify_count_changed();
        debug!(%path, %owner, "registered new Client");

        spawn_owner_departure_watch(self.connection.clone(), path.clone(), owner);

        Ok(path)
    }
}

/// Watches for the owning peer disappearing from the bus and tears the client down, mirroring
/// real GeoClue2's "client dies with its process" lifecycle.
fn spawn_owner_departure_watch(connection: Connection, path: OwnedObjectPath, owner: OwnedUniqueName) {
    tokio::spawn(async move {
        let Ok(dbus) = DBusProxy::new(&connection).await else {
            return;
        };
        let Ok(mut name_changed) = dbus.receive_name_owner_changed().await else {
            return;
        };

        while let Some(change) = name_changed.next().await {
            let Ok(args) = change.args() else { continue };
            if args.name.as_str() != owner.as_str() {
                continue;
            }
            if args.new_owner.is_none() {
                let _ = connection.object_server().remove::<ClientService, _>(&path).await;
                if let Ok(iface) = connection
                    .object_server()
                    .interface::<_, Manager>(MANAGER_PATH)
                    .await
                {
                    let mut manager = iface.get_mut().await;
                    manager.clients.remove(&owner);
                    manager.notify_count_changed();
                }
                return;
            }
        }
    });
}

/// Runs until `IDLE_TIMEOUT` elapses with zero registered clients, then cancels `quit`.
/// A client connecting before the timeout restarts the wait.
pub async fn run_idle_shutdown(mut connected_count: watch::Receiver<u32>, quit: CancellationToken) {
    loop {
        while *connected_count.borrow() != 0 {
            if connected_count.changed().await.is_err() {
                return;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(IDLE_TIMEOUT) => {
                debug!("idle timeout elapsed with no clients, requesting shutdown");
                quit.cancel();
                return;
            }
            changed = connected_count.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

/// Exposes the manager's connected-client count as a `watch` channel for [`run_idle_shutdown`],
/// since the D-Bus property itself isn't independently observable off-bus.
impl Manager {
    pub fn connected_count_receiver(&self) -> watch::Receiver<u32> {
        self.connected_count_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_fires_with_no_clients() {
        let (tx, rx) = watch::channel(0u32);
        let quit = CancellationToken::new();
        let handle = tokio::spawn(run_idle_shutdown(rx, quit.clone()));

        tokio::time::advance(IDLE_TIMEOUT + Duration::from_millis(100)).await;
        handle.await.unwrap();
        assert!(quit.is_cancelled());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn a_client_connecting_in_time_cancels_the_timeout() {
        let (tx, rx) = watch::channel(0u32);
        let quit = CancellationToken::new();
        let handle = tokio::spawn(run_idle_shutdown(rx, quit.clone()));

        tokio::time::advance(Duration::from_secs(2)).await;
        tx.send(1).unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(!quit.is_cancelled());
        handle.abort();
    }
}
