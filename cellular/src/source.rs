//! [`CellSource`] (§4.6): tracks the latest (mcc, mnc, lac, cellId) fix via a polling bridge to the
//! EC25 modem and feeds it through [`geoclued_geocode::WebSource`] against OpenCellID. A process-
//! wide singleton, unlike `WifiSource`'s two-bucket registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use geoclued_core::{AccuracyLevel, Location, LocationSource, SourceKind, SourceState};
use geoclued_geocode::WebSource;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::modem::{CellFix, Ec25Modem};
use crate::query::CellQueryBuilder;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct CellSourceConfig {
    pub serial_device: String,
    pub opencellid_url: String,
    pub opencellid_api_key: String,
}

pub struct CellSource {
    state: SourceState,
    web: WebSource<CellQueryBuilder>,
    config: CellSourceConfig,
    network_reachable: watch::Receiver<bool>,
    has_fix: AtomicBool,
    self_weak: Weak<CellSource>,
    spawned: AtomicBool,
    run: std::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl CellSource {
    pub fn new(config: CellSourceConfig, network_reachable: watch::Receiver<bool>) -> Arc<Self> {
        let web = WebSource::new(CellQueryBuilder::new(
            config.opencellid_url.clone(),
            config.opencellid_api_key.clone(),
        ));

        Arc::new_cyclic(|weak| Self {
            state: SourceState::new(),
            web,
            config,
            network_reachable,
            has_fix: AtomicBool::new(false),
            self_weak: weak.clone(),
            spawned: AtomicBool::new(false),
            run: std::sync::Mutex::new(None),
        })
    }

    fn update_available_accuracy(&self) {
        let reachable = *self.network_reachable.borrow();
        let level = if self.has_fix.load(Ordering::SeqCst) && reachable {
            AccuracyLevel::Neighborhood
        } else {
            AccuracyLevel::None
        };
        self.state.set_available_accuracy_level(level);
    }

    async fn run_poll_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        let mut last: Option<CellFix> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = cancel.cancelled() => return,
            }

            let device = self.config.serial_device.clone();
            let fix = tokio::task::spawn_blocking(move || {
                let mut modem = Ec25Modem::open(&device)?;
                modem.get_cell_fix()
            })
            .await;

            match fix {
                Ok(Ok(Some(fix))) => {
                    self.has_fix.store(true, Ordering::SeqCst);
                    self.update_available_accuracy();
                    if last != Some(fix) {
                        last = Some(fix);
                        self.web.query_builder().set_latest(fix);
                        let reachable = *self.network_reachable.borrow();
                        self.web.refresh(reachable, &self.state).await;
                    }
                }
                Ok(Ok(None)) => {
                    self.update_available_accuracy();
                }
                Ok(Err(e)) => warn!(error = %e, "failed to read serving cell from modem"),
                Err(e) => warn!(error = %e, "modem poll task panicked"),
            }
        }
    }
}

#[async_trait]
impl LocationSource for CellSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Cell
    }

    async fn start(&self) -> bool {
        if !self.state.set_active(true) {
            return false;
        }
        let needs_spawn = self.spawned.load(Ordering::SeqCst) && self.run.lock().unwrap().is_none();
        if needs_spawn {
            if let Some(this) = self.self_weak.upgrade() {
                this.spawn_tasks();
            }
        }
        true
    }

    async fn stop(&self) -> bool {
        if !self.state.set_active(false) {
            return false;
        }
        self.web.stop();
        if let Some((cancel, handle)) = self.run.lock().unwrap().take() {
            cancel.cancel();
            handle.abort();
        }
        true
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn location(&self) -> watch::Receiver<Option<Location>> {
        self.state.location()
    }

    fn available_accuracy_level(&self) -> watch::Receiver<AccuracyLevel> {
        self.state.available_accuracy_level()
    }
}

impl CellSource {
    /// Forwards a submit-source (GPS) fix into the §4.4 submission protocol.
    pub async fn submit(&self, location: &Location) {
        let reachable = *self.network_reachable.borrow();
        self.web.submit(location, reachable).await;
    }
}

impl CellSource {
    /// Spawns the polling task under a fresh cancellation token. Called once right after
    /// construction and again by `start()` whenever a prior `stop()` tore it down, since a
    /// cancelled `CancellationToken` never un-cancels.
    fn spawn_tasks(self: &Arc<Self>) {
        self.spawned.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        self.web.reset();
        let handle = tokio::spawn(self.clone().run_poll_loop(cancel.clone()));
        *self.run.lock().unwrap() = Some((cancel, handle));
    }

    pub fn spawn(self: &Arc<Self>) {
        self.spawn_tasks();
    }
}

static INSTANCE: OnceLock<std::sync::Mutex<Option<Arc<CellSource>>>> = OnceLock::new();

pub fn instance(
    config: CellSourceConfig,
    network_reachable: watch::Receiver<bool>,
) -> Arc<CellSource> {
    let slot = INSTANCE.get_or_init(|| std::sync::Mutex::new(None));
    let mut slot = slot.lock().unwrap();
    if let Some(existing) = slot.as_ref() {
        return existing.clone();
    }

    let source = CellSource::new(config, network_reachable);
    source.spawn();
    *slot = Some(source.clone());
    source
}
