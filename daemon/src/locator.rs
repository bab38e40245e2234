//! [`Locator`] (§4.8): composes the three source singletons for one requested accuracy cap,
//! applies the merge rule to their fixes, and exposes the result as a [`geoclued_dbus::LocationProvider`]
//! the D-Bus `ClientService` objects subscribe through.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use geoclued_cellular::CellSource;
use geoclued_core::{merge, AccuracyLevel, Location, LocationSource, SourceState};
use geoclued_dbus::LocationProvider;
use geoclued_gps::ModemGpsSource;
use geoclued_wifi::{WifiSource, WifiSourceConfig};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Refcounts the three process-wide source singletons independently of how many `Locator`
/// instances (one per distinct requested cap) currently want them active, since e.g. the same
/// `CellSource` is shared by every cap above `NEIGHBORHOOD`.
struct ChildGate;

type GateRegistry = Mutex<HashMap<usize, u32>>;
static CHILD_REFCOUNTS: OnceLock<GateRegistry> = OnceLock::new();

fn child_key(child: &Arc<dyn LocationSource>) -> usize {
    Arc::as_ptr(child) as *const () as usize
}

impl ChildGate {
    async fn acquire(child: &Arc<dyn LocationSource>) {
        let registry = CHILD_REFCOUNTS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut counts = registry.lock().await;
        let count = counts.entry(child_key(child)).or_insert(0);
        *count += 1;
        if *count == 1 {
            child.start().await;
        }
    }

    async fn release(child: &Arc<dyn LocationSource>) {
        let registry = CHILD_REFCOUNTS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut counts = registry.lock().await;
        let key = child_key(child);
        if let Some(count) = counts.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&key);
                child.stop().await;
            }
        }
    }
}

pub struct Locator {
    cap: AccuracyLevel,
    wifi: Arc<WifiSource>,
    cell: Arc<CellSource>,
    gps: Arc<ModemGpsSource>,
    state: SourceState,
    clients: AtomicU32,
    run: Mutex<Option<(CancellationToken, Vec<JoinHandle<()>>)>>,
}

impl Locator {
    fn new(cap: AccuracyLevel, wifi: Arc<WifiSource>, cell: Arc<CellSource>, gps: Arc<ModemGpsSource>) -> Arc<Self> {
        Arc::new(Self {
            cap,
            wifi,
            cell,
            gps,
            state: SourceState::new(),
            clients: AtomicU32::new(0),
            run: Mutex::new(None),
        })
    }

    /// One `Locator` per distinct requested cap; clients asking for the same cap share it and its
    /// merge state, matching §9's "process-wide registry" singleton guidance. `wifi_config` is
    /// resolved through `geoclued_wifi::instance` here, not passed in pre-built, since the two-bucket
    /// `WifiSource` registry (§4.5) is itself keyed by cap.
    pub async fn instance(
        cap: AccuracyLevel,
        wifi_config: WifiSourceConfig,
        network_reachable: watch::Receiver<bool>,
        cell: Arc<CellSource>,
        gps: Arc<ModemGpsSource>,
    ) -> Arc<Self> {
        let cap = cap.coerce_requested();
        type Registry = Mutex<HashMap<AccuracyLevel, Weak<Locator>>>;
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));

        let mut registry = registry.lock().await;
        if let Some(existing) = registry.get(&cap).and_then(Weak::upgrade) {
            return existing;
        }

        let wifi = geoclued_wifi::instance(cap, wifi_config, network_reachable).await;
        let locator = Locator::new(cap, wifi, cell, gps);
        registry.insert(cap, Arc::downgrade(&locator));
        locator
    }

    pub async fn acquire_client(self: &Arc<Self>) -> watch::Receiver<Option<Location>> {
        if self.clients.fetch_add(1, Ordering::SeqCst) == 0 {
            self.activate().await;
        }
        self.state.location()
    }

    pub async fn release_client(self: &Arc<Self>) {
        if self.clients.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.deactivate().await;
        }
    }

    async fn activate(self: &Arc<Self>) {
        debug!(cap = ?self.cap, "activating Locator");
        let cancel = CancellationToken::new();
        let children: [Arc<dyn LocationSource>; 3] =
            [self.wifi.clone(), self.cell.clone(), self.gps.clone()];
        let mut handles: Vec<JoinHandle<()>> = children
            .into_iter()
            .map(|child| tokio::spawn(self.clone().run_child(child, cancel.clone())))
            .collect();
        handles.push(tokio::spawn(self.clone().run_submit_forward(cancel.clone())));
        *self.run.lock().await = Some((cancel, handles));
    }

    async fn deactivate(&self) {
        debug!(cap = ?self.cap, "deactivating Locator");
        if let Some((cancel, handles)) = self.run.lock().await.take() {
            cancel.cancel();
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    /// Whether this cap wants `child` engaged given its latest reported available accuracy
    /// (§4.8 "for each child with NONE < availableAccuracy <= cap").
    fn wants_engaged(&self, avail: AccuracyLevel) -> bool {
        avail > AccuracyLevel::None && avail <= self.cap
    }

    async fn run_child(self: Arc<Self>, child: Arc<dyn LocationSource>, cancel: CancellationToken) {
        let mut avail_rx = child.available_accuracy_level();
        let mut loc_rx = child.location();
        let mut engaged = false;

        let initial = *avail_rx.borrow();
        if self.wants_engaged(initial) {
            ChildGate::acquire(&child).await;
            engaged = true;
        }

        loop {
            tokio::select! {
                changed = avail_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let avail = *avail_rx.borrow();
                    let should_engage = self.wants_engaged(avail);
                    if should_engage && !engaged {
                        ChildGate::acquire(&child).await;
                        engaged = true;
                    } else if !should_engage && engaged {
                        ChildGate::release(&child).await;
                        engaged = false;
                    }
                }
                changed = loc_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !engaged {
                        continue;
                    }
                    let Some(fix) = loc_rx.borrow_and_update().clone() else { continue };
                    self.merge_and_publish(fix);
                }
                () = cancel.cancelled() => break,
            }
        }

        if engaged {
            ChildGate::release(&child).await;
        }
    }

    fn merge_and_publish(&self, mut candidate: Location) {
        let current = self.state.current_location();
        if !merge::accepts(current.as_ref(), &candidate) {
            debug!(cap = ?self.cap, "rejecting merge candidate inside current confidence circle");
            return;
        }
        candidate.set_speed_from_prev(current.as_ref());
        candidate.set_heading_from_prev(current.as_ref());
        self.state.publish(candidate);
    }

    /// Forwards GPS fixes into the WiFi/cell submission protocol (§4.4, §4.7): GPS is
    /// simultaneously a merge child and the submit source for the other two.
    async fn run_submit_forward(self: Arc<Self>, cancel: CancellationToken) {
        let mut loc_rx = self.gps.location();
        loop {
            tokio::select! {
                changed = loc_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let Some(fix) = loc_rx.borrow_and_update().clone() else { continue };
                    self.wifi.submit(&fix).await;
                    self.cell.submit(&fix).await;
                }
                () = cancel.cancelled() => break,
            }
        }
    }
}

/// Wires [`Locator`]'s per-cap singletons into the [`LocationProvider`] seam `geoclued-dbus`
/// expects, tracking which `Locator` each desktop-id is currently subscribed to so `stop()` and a
/// re-capping `start()` release the right one.
pub struct LocatorProvider {
    wifi_config: WifiSourceConfig,
    network_reachable: watch::Receiver<bool>,
    cell: Arc<CellSource>,
    gps: Arc<ModemGpsSource>,
    clients: Mutex<HashMap<String, Arc<Locator>>>,
}

impl LocatorProvider {
    pub fn new(
        wifi_config: WifiSourceConfig,
        network_reachable: watch::Receiver<bool>,
        cell: Arc<CellSource>,
        gps: Arc<ModemGpsSource>,
    ) -> Self {
        Self {
            wifi_config,
            network_reachable,
            cell,
            gps,
            clients: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LocationProvider for LocatorProvider {
    async fn start(&self, desktop_id: String, cap: AccuracyLevel) -> watch::Receiver<Option<Location>> {
        let mut clients = self.clients.lock().await;
        if let Some(previous) = clients.remove(&desktop_id) {
            previous.release_client().await;
        }

        let locator = Locator::instance(
            cap,
            self.wifi_config.clone(),
            self.network_reachable.clone(),
            self.cell.clone(),
            self.gps.clone(),
        )
        .await;
        let rx = locator.acquire_client().await;
        clients.insert(desktop_id, locator);
        rx
    }

    async fn stop(&self, desktop_id: String) {
        let mut clients = self.clients.lock().await;
        if let Some(locator) = clients.remove(&desktop_id) {
            locator.release_client().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lon: f64, accuracy: f64) -> Location {
        Location::new(lat, lon, Some(accuracy)).unwrap()
    }

    #[test]
    fn merge_acceptance_matches_core_merge_rule() {
        let current = loc(0.0, 0.0, 100.0);
        let rejected = loc(0.0, 0.0005, 200.0);
        let accepted = loc(0.0, 0.0, 50.0);
        assert!(!merge::accepts(Some(&current), &rejected));
        assert!(merge::accepts(Some(&current), &accepted));
    }
}
