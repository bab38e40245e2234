//! [`WifiSource`] (§4.5): supplicant/iw-backed BSS tracking composed with
//! [`geoclued_geocode::WebSource`], plus the two-bucket singleton registry (§4.5 "Singletons").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use geoclued_core::{AccuracyLevel, Location, LocationSource, SourceKind, SourceState};
use geoclued_geocode::WebSource;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::admission::Admission;
use crate::query::WifiQueryBuilder;
use crate::scan::{IwScanner, ScannedBss, WpaSupplicant};

const COALESCE_WINDOW: Duration = Duration::from_secs(1);
const SCAN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The two singleton buckets named in §4.5: a `<= CITY` capped instance never opens the
/// supplicant connection (pure geoip client), a `> CITY` instance does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    LeCity,
    GtCity,
}

impl Bucket {
    pub fn of(cap: AccuracyLevel) -> Self {
        if cap <= AccuracyLevel::City {
            Bucket::LeCity
        } else {
            Bucket::GtCity
        }
    }
}

#[derive(Clone)]
pub struct WifiSourceConfig {
    pub geolocate_url: String,
    pub submit_url: Option<String>,
    pub interface: String,
    pub wpa_ctrl_path: Option<PathBuf>,
    pub filter_macs: bool,
}

pub struct WifiSource {
    state: SourceState,
    cap: AccuracyLevel,
    web: Arc<WebSource<WifiQueryBuilder>>,
    admission: Arc<Mutex<Admission>>,
    config: WifiSourceConfig,
    network_reachable: tokio::sync::watch::Receiver<bool>,
    refresh_notify: Arc<Notify>,
    self_weak: Weak<WifiSource>,
    spawned: AtomicBool,
    run: Mutex<Option<(CancellationToken, Vec<JoinHandle<()>>)>>,
}

impl WifiSource {
    pub fn new(
        cap: AccuracyLevel,
        config: WifiSourceConfig,
        network_reachable: tokio::sync::watch::Receiver<bool>,
    ) -> Arc<Self> {
        let admission = Arc::new(Mutex::new(Admission::new()));
        let web = Arc::new(WebSource::new(WifiQueryBuilder::new(
            config.geolocate_url.clone(),
            config.submit_url.clone(),
            admission.clone(),
        )));

        Arc::new_cyclic(|weak| Self {
            state: SourceState::new(),
            cap,
            web,
            admission,
            config,
            network_reachable,
            refresh_notify: Arc::new(Notify::new()),
            self_weak: weak.clone(),
            spawned: AtomicBool::new(false),
            run: Mutex::new(None),
        })
    }

    fn is_geoip_only(&self) -> bool {
        Bucket::of(self.cap) == Bucket::LeCity
    }

    fn scan_once(&self) -> crate::error::Result<Vec<ScannedBss>> {
        if let Some(wpa_path) = &self.config.wpa_ctrl_path {
            let mut supplicant = WpaSupplicant::new(wpa_path, self.config.filter_macs)?;
            supplicant.scan().map_err(Into::into)
        } else {
            IwScanner::new(&self.config.interface, self.config.filter_macs)
                .scan()
                .map_err(Into::into)
        }
    }

    async fn schedule_refresh(self: &Arc<Self>) {
        self.refresh_notify.notify_one();
    }

    fn update_available_accuracy(&self, has_device: bool, network_reachable: bool) {
        let level = if !has_device {
            if self.cap >= AccuracyLevel::City {
                AccuracyLevel::City
            } else {
                AccuracyLevel::None
            }
        } else if network_reachable {
            AccuracyLevel::Street
        } else {
            AccuracyLevel::None
        };
        self.state.set_available_accuracy_level(level);
    }

    async fn run_coalescing_refresh_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.refresh_notify.notified().await;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(COALESCE_WINDOW) => break,
                    _ = self.refresh_notify.notified() => continue,
                    () = cancel.cancelled() => return,
                }
            }
            let reachable = *self.network_reachable.borrow();
            self.web.refresh(reachable, &self.state).await;
        }
    }

    async fn run_scan_loop(self: Arc<Self>, cancel: CancellationToken) {
        if self.is_geoip_only() {
            // Pure geoip client: no device, refresh once on start and again on every
            // reachable transition handled by the daemon's network-watcher.
            self.update_available_accuracy(false, *self.network_reachable.borrow());
            self.schedule_refresh().await;
            return;
        }

        let mut ticker = tokio::time::interval(SCAN_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = cancel.cancelled() => return,
            }

            let scan_result = {
                let this = self.clone();
                tokio::task::spawn_blocking(move || this.scan_once()).await
            };

            match scan_result {
                Ok(Ok(snapshot)) => {
                    let tracked_changed = {
                        let mut admission = self.admission.lock().await;
                        admission.apply_snapshot(snapshot).tracked_changed
                    };
                    let has_device = self.admission.lock().await.has_any_known_bss();
                    self.update_available_accuracy(has_device, *self.network_reachable.borrow());
                    if tracked_changed {
                        self.schedule_refresh().await;
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "WiFi scan failed"),
                Err(e) => warn!(error = %e, "WiFi scan task panicked"),
            }
        }
    }
}

#[async_trait]
impl LocationSource for WifiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Wifi
    }

    async fn start(&self) -> bool {
        if !self.state.set_active(true) {
            return false;
        }
        debug!(bucket = ?Bucket::of(self.cap), "starting WifiSource");
        if self.spawned.load(Ordering::SeqCst) && self.run.lock().await.is_none() {
            if let Some(this) = self.self_weak.upgrade() {
                this.spawn_tasks().await;
            }
        }
        true
    }

    async fn stop(&self) -> bool {
        if !self.state.set_active(false) {
            return false;
        }
        self.web.stop();
        if let Some((cancel, handles)) = self.run.lock().await.take() {
            cancel.cancel();
            for handle in handles {
                handle.abort();
            }
        }
        true
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn location(&self) -> tokio::sync::watch::Receiver<Option<Location>> {
        self.state.location()
    }

    fn available_accuracy_level(&self) -> tokio::sync::watch::Receiver<AccuracyLevel> {
        self.state.available_accuracy_level()
    }
}

impl WifiSource {
    /// Forwards a submit-source (GPS) fix into the §4.4 submission protocol.
    pub async fn submit(&self, location: &Location) {
        let reachable = *self.network_reachable.borrow();
        self.web.submit(location, reachable).await;
    }
}

impl WifiSource {
    /// Spawns the background scan-loop and refresh-coalescing tasks under a fresh cancellation
    /// token. Called once right after construction and again by `start()` whenever a prior
    /// `stop()` tore the tasks down, since a cancelled `CancellationToken` never un-cancels.
    async fn spawn_tasks(self: &Arc<Self>) {
        self.spawned.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        self.web.reset();
        let refresh_task = tokio::spawn(self.clone().run_coalescing_refresh_loop(cancel.clone()));
        let scan_task = tokio::spawn(self.clone().run_scan_loop(cancel.clone()));
        *self.run.lock().await = Some((cancel, vec![refresh_task, scan_task]));
    }

    pub async fn spawn(self: &Arc<Self>) {
        self.spawn_tasks().await;
    }
}

type Registry = Mutex<HashMap<Bucket, Arc<WifiSource>>>;
static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the existing singleton for `cap`'s bucket if one exists, else builds and spawns a
/// fresh one. At most two `WifiSource`s exist at a time (§4.5 "Singletons"); the registry holds a
/// strong reference for the life of the process rather than letting it expire once unreferenced.
pub async fn instance(
    cap: AccuracyLevel,
    config: WifiSourceConfig,
    network_reachable: tokio::sync::watch::Receiver<bool>,
) -> Arc<WifiSource> {
    let bucket = Bucket::of(cap);
    let mut registry = registry().lock().await;

    if let Some(existing) = registry.get(&bucket) {
        return existing.clone();
    }

    let source = WifiSource::new(cap, config, network_reachable);
    source.spawn().await;
    registry.insert(bucket, source.clone());
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_split_is_at_city() {
        assert_eq!(Bucket::of(AccuracyLevel::Country), Bucket::LeCity);
        assert_eq!(Bucket::of(AccuracyLevel::City), Bucket::LeCity);
        assert_eq!(Bucket::of(AccuracyLevel::Neighborhood), Bucket::GtCity);
        assert_eq!(Bucket::of(AccuracyLevel::Street), Bucket::GtCity);
        assert_eq!(Bucket::of(AccuracyLevel::Exact), Bucket::GtCity);
    }

    fn geoip_only_source() -> Arc<WifiSource> {
        let (_tx, rx) = tokio::sync::watch::channel(true);
        WifiSource::new(
            AccuracyLevel::City,
            WifiSourceConfig {
                geolocate_url: "https://example.invalid/geolocate".into(),
                submit_url: None,
                interface: "wlan0".into(),
                wpa_ctrl_path: None,
                filter_macs: true,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn a_source_stopped_then_started_again_resumes_the_background_loops() {
        let source = geoip_only_source();
        source.spawn().await;

        assert!(source.start().await);
        assert!(source.stop().await);
        // Re-activation must re-spawn fresh, un-cancelled background tasks rather than leaving
        // the loops permanently dead behind the first `CancellationToken`.
        assert!(source.start().await);
        assert!(source.run.lock().await.is_some());
    }
}
