//! [`ModemGpsSource`] (§4.7): the only first-class source in this workspace that publishes fixes
//! directly rather than going through a [`geoclued_geocode::WebSource`] refresh cycle — it *is*
//! the origin the Locator merge rule protects other sources' fixes from, so it calls
//! [`SourceState::publish`] unconditionally on every valid sentence pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use geoclued_core::{AccuracyLevel, Location, LocationSource, SourceKind, SourceState};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::modem::GpsModem;
use crate::nmea::{RmcFix, Sentence};

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ModemGpsSourceConfig {
    pub at_device: String,
    pub nmea_device: String,
}

pub struct ModemGpsSource {
    state: SourceState,
    config: ModemGpsSourceConfig,
    self_weak: Weak<ModemGpsSource>,
    spawned: AtomicBool,
    run: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ModemGpsSource {
    pub fn new(config: ModemGpsSourceConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: SourceState::new(),
            config,
            self_weak: weak.clone(),
            spawned: AtomicBool::new(false),
            run: Mutex::new(None),
        })
    }

    async fn run_read_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let at_device = self.config.at_device.clone();
            let nmea_device = self.config.nmea_device.clone();
            let modem = tokio::task::spawn_blocking(move || {
                GpsModem::arm_and_open(&at_device, &nmea_device)
            })
            .await;

            let mut modem = match modem {
                Ok(Ok(modem)) => modem,
                Ok(Err(e)) => {
                    warn!(error = %e, "failed to arm/open GPS modem, retrying");
                    self.state.set_available_accuracy_level(AccuracyLevel::None);
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_DELAY) => continue,
                        _ = cancel.cancelled() => return,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "GPS modem open task panicked");
                    return;
                }
            };

            let mut last_rmc: Option<RmcFix> = None;

            loop {
                if cancel.is_cancelled() {
                    return;
                }

                let read = tokio::task::spawn_blocking(move || {
                    let fix = modem.next_fix();
                    (modem, fix)
                })
                .await;

                let Ok((returned_modem, fix)) = read else {
                    warn!("GPS read task panicked");
                    return;
                };
                modem = returned_modem;

                match fix {
                    Ok(Some(Sentence::Rmc(rmc))) => last_rmc = Some(rmc),
                    Ok(Some(Sentence::Gga(gga))) => {
                        if gga.fix_quality == 0 {
                            self.state.set_available_accuracy_level(AccuracyLevel::None);
                            continue;
                        }

                        let mut location =
                            match Location::new(gga.latitude, gga.longitude, None) {
                                Ok(location) => location,
                                Err(e) => {
                                    warn!(error = %e, "GPS fix failed validation");
                                    continue;
                                }
                            };
                        location = location.with_altitude(gga.altitude_m);

                        if let Some(rmc) = last_rmc {
                            if rmc.active {
                                location = location
                                    .with_speed(Some(rmc.speed_mps))
                                    .with_heading(Some(rmc.course_deg));
                            }
                        }

                        self.state.set_available_accuracy_level(AccuracyLevel::Exact);
                        self.state.publish(location);
                    }
                    Ok(None) => {
                        warn!("GPS serial stream closed, reopening");
                        break;
                    }
                    Err(e) => warn!(error = %e, "failed to read GPS fix"),
                }
            }

            self.state.set_available_accuracy_level(AccuracyLevel::None);
            tokio::select! {
                _ = tokio::time::sleep(RETRY_DELAY) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[async_trait]
impl LocationSource for ModemGpsSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Gps
    }

    async fn start(&self) -> bool {
        if !self.state.set_active(true) {
            return false;
        }
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
        if let Some((cancel, handle)) = self.run.lock().await.take() {
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

impl ModemGpsSource {
    /// Spawns the background arm/read loop under a fresh cancellation token. Called once right
    /// after construction and again by `start()` whenever a prior `stop()` tore it down, since a
    /// cancelled `CancellationToken` never un-cancels.
    async fn spawn_tasks(self: &Arc<Self>) {
        self.spawned.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_read_loop(cancel.clone()));
        *self.run.lock().await = Some((cancel, handle));
    }

    pub async fn spawn(self: &Arc<Self>) {
        self.spawn_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_inactive_with_no_accuracy() {
        let source = ModemGpsSource::new(ModemGpsSourceConfig {
            at_device: "/dev/ttyUSB2".into(),
            nmea_device: "/dev/ttyUSB1".into(),
        });
        assert!(!source.is_active());
        assert_eq!(*source.available_accuracy_level().borrow(), AccuracyLevel::None);
    }

    #[tokio::test]
    async fn start_and_stop_report_transitions() {
        let source = ModemGpsSource::new(ModemGpsSourceConfig {
            at_device: "/dev/ttyUSB2".into(),
            nmea_device: "/dev/ttyUSB1".into(),
        });
        assert!(source.start().await);
        assert!(!source.start().await);
        assert!(source.stop().await);
        assert!(!source.stop().await);
    }
}
