//! BSS admission bookkeeping (§4.5): two disjoint maps, *tracked* and *ignored*, fed by scan
//! snapshots. Polling the scan backend stands in for the supplicant's native bss-added/removed/
//! signal-notify event stream (`WpaSupplicant` itself is poll-based too, via
//! `scan_wifi_with_count`'s repeated `SCAN`/`SCAN_RESULTS` loop) - a BSS absent from the newest
//! snapshot is treated as removed.

use std::collections::HashMap;

use crate::scan::ScannedBss;

const IGNORE_THRESHOLD_DBM: i32 = -90;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedBss {
    pub bssid: String,
    pub signal_dbm: i32,
    pub frequency_mhz: u32,
}

#[derive(Default)]
pub struct Admission {
    tracked: HashMap<String, TrackedBss>,
    ignored: HashMap<String, TrackedBss>,
}

/// Whether the latest snapshot changed the tracked set enough to warrant a refresh.
pub struct AdmissionResult {
    pub tracked_changed: bool,
}

impl Admission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked(&self) -> impl Iterator<Item = &TrackedBss> {
        self.tracked.values()
    }

    pub fn has_any_known_bss(&self) -> bool {
        !self.tracked.is_empty() || !self.ignored.is_empty()
    }

    pub fn apply_snapshot(&mut self, snapshot: Vec<ScannedBss>) -> AdmissionResult {
        let mut seen = std::collections::HashSet::new();
        let mut tracked_changed = false;

        for bss in snapshot {
            seen.insert(bss.bssid.clone());

            let discard = match &bss.ssid {
                None => true,
                Some(ssid) => ssid.ends_with("_nomap"),
            };
            if discard {
                self.tracked.remove(&bss.bssid);
                self.ignored.remove(&bss.bssid);
                continue;
            }

            let entry = TrackedBss {
                bssid: bss.bssid.clone(),
                signal_dbm: bss.signal_dbm,
                frequency_mhz: bss.frequency_mhz,
            };

            if bss.signal_dbm <= IGNORE_THRESHOLD_DBM {
                if self.tracked.remove(&bss.bssid).is_some() {
                    tracked_changed = true;
                }
                self.ignored.insert(bss.bssid, entry);
            } else {
                let was_ignored = self.ignored.remove(&bss.bssid).is_some();
                let changed = was_ignored
                    || self
                        .tracked
                        .get(&bss.bssid)
                        .is_none_or(|existing| existing.signal_dbm != entry.signal_dbm);
                if changed {
                    tracked_changed = true;
                }
                self.tracked.insert(bss.bssid, entry);
            }
        }

        let removed_tracked: Vec<_> = self
            .tracked
            .keys()
            .filter(|bssid| !seen.contains(*bssid))
            .cloned()
            .collect();
        if !removed_tracked.is_empty() {
            tracked_changed = true;
        }
        for bssid in removed_tracked {
            self.tracked.remove(&bssid);
        }
        self.ignored.retain(|bssid, _| seen.contains(bssid));

        AdmissionResult { tracked_changed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bss(bssid: &str, ssid: Option<&str>, signal: i32) -> ScannedBss {
        ScannedBss {
            bssid: bssid.to_string(),
            ssid: ssid.map(str::to_string),
            signal_dbm: signal,
            frequency_mhz: 2412,
        }
    }

    #[test]
    fn no_ssid_is_discarded() {
        let mut admission = Admission::new();
        let result = admission.apply_snapshot(vec![bss("aa:bb:cc:dd:ee:ff", None, -40)]);
        assert!(!result.tracked_changed);
        assert_eq!(admission.tracked().count(), 0);
    }

    #[test]
    fn nomap_suffix_is_discarded() {
        let mut admission = Admission::new();
        admission.apply_snapshot(vec![bss("aa:bb:cc:dd:ee:ff", Some("guest_nomap"), -40)]);
        assert_eq!(admission.tracked().count(), 0);
    }

    #[test]
    fn weak_signal_is_ignored_not_tracked() {
        let mut admission = Admission::new();
        let result = admission.apply_snapshot(vec![bss("aa:bb:cc:dd:ee:ff", Some("weak"), -95)]);
        assert!(!result.tracked_changed);
        assert_eq!(admission.tracked().count(), 0);
        assert!(admission.has_any_known_bss());
    }

    #[test]
    fn ignored_bss_promotes_to_tracked_on_signal_rise() {
        let mut admission = Admission::new();
        admission.apply_snapshot(vec![bss("aa:bb:cc:dd:ee:ff", Some("net"), -95)]);
        let result = admission.apply_snapshot(vec![bss("aa:bb:cc:dd:ee:ff", Some("net"), -50)]);
        assert!(result.tracked_changed);
        assert_eq!(admission.tracked().count(), 1);
    }

    #[test]
    fn dropped_bss_is_removed_from_tracked() {
        let mut admission = Admission::new();
        admission.apply_snapshot(vec![bss("aa:bb:cc:dd:ee:ff", Some("net"), -50)]);
        let result = admission.apply_snapshot(vec![]);
        assert!(result.tracked_changed);
        assert_eq!(admission.tracked().count(), 0);
    }
}
