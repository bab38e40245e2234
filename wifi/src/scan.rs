//! Blocking scan backends, `WpaSupplicant`/`IwScanner`, trimmed to what a BSS admission pipeline
//! needs (no `flags`/connection-status bookkeeping, since this crate only ever feeds a geolocate
//! query).

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, trace, warn};
use wpactrl::{Client, ClientAttached};

use crate::error::{Error, Result};

const SCAN_TIMEOUT_SECS: u64 = 30;
const SCAN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ScannedBss {
    pub bssid: String,
    pub ssid: Option<String>,
    pub signal_dbm: i32,
    pub frequency_mhz: u32,
}

/// Broadcast addresses, locally-administered MACs, and the IANA-reserved `00:00:5E` range carry no
/// location information and are excluded up front.
pub fn is_valid_mac(mac: &str) -> bool {
    if mac.eq_ignore_ascii_case("FF:FF:FF:FF:FF:FF") {
        trace!(group = "broadcast", "filtered {mac}");
        return false;
    }

    if let Some(first_byte) = mac.split(':').next() {
        if let Ok(byte) = u8::from_str_radix(first_byte, 16) {
            if byte & 0x02 != 0 {
                trace!(group = "u/l", "filtered {mac}");
                return false;
            }
        }
    }

    if mac.to_uppercase().starts_with("00:00:5E") {
        trace!(group = "iana", "filtered {mac}");
        return false;
    }

    true
}

pub fn is_valid_bssid(bssid: &str) -> bool {
    if bssid.is_empty() || bssid.contains("Load:") {
        return false;
    }
    let parts: Vec<&str> = bssid.split(':').collect();
    parts.len() == 6 && parts.iter().all(|p| p.len() == 2 && u8::from_str_radix(p, 16).is_ok())
}

fn parse_scan_result(line: &str, filter_macs: bool) -> Result<ScannedBss> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 5 {
        return Err(Error::InvalidScanLine(line.to_string()));
    }

    let bssid = fields[0].to_string();
    if filter_macs && !is_valid_mac(&bssid) {
        return Err(Error::InvalidScanLine(line.to_string()));
    }

    let ssid = fields[4].to_string();
    Ok(ScannedBss {
        bssid,
        ssid: if ssid.is_empty() { None } else { Some(ssid) },
        signal_dbm: fields[2].parse().unwrap_or(0),
        frequency_mhz: fields[1].parse().unwrap_or(0),
    })
}

pub struct WpaSupplicant {
    ctrl: ClientAttached,
    filter_macs: bool,
}

impl WpaSupplicant {
    pub fn new(ctrl_path: &Path, filter_macs: bool) -> Result<Self> {
        let ctrl = Client::builder()
            .ctrl_path(ctrl_path)
            .open()
            .and_then(|c| c.attach())
            .map_err(|e| Error::SupplicantUnavailable(e.to_string()))?;
        Ok(Self { ctrl, filter_macs })
    }

    pub fn scan(&mut self) -> Result<Vec<ScannedBss>> {
        self.ctrl
            .request("SCAN")
            .map_err(|e| Error::ScanFailed(e.to_string()))?;

        self.wait_for_event("CTRL-EVENT-SCAN-RESULTS", Duration::from_secs(SCAN_TIMEOUT_SECS))?;

        let scan_results = self
            .ctrl
            .request("SCAN_RESULTS")
            .map_err(|e| Error::ScanFailed(e.to_string()))?;

        let mut by_bssid: HashMap<String, ScannedBss> = HashMap::new();
        for line in scan_results.lines().skip(1) {
            match parse_scan_result(line, self.filter_macs) {
                Ok(bss) => {
                    by_bssid
                        .entry(bss.bssid.clone())
                        .and_modify(|existing| {
                            if bss.signal_dbm > existing.signal_dbm {
                                *existing = bss.clone();
                            }
                        })
                        .or_insert(bss);
                }
                Err(_) => trace!(line, "skipping unparseable or filtered scan result"),
            }
        }

        debug!(count = by_bssid.len(), "parsed supplicant scan results");
        Ok(by_bssid.into_values().collect())
    }

    fn wait_for_event(&mut self, event_type: &str, timeout: Duration) -> Result<()> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(msg)) = self.ctrl.recv() {
                if msg.contains(event_type) {
                    return Ok(());
                }
            }
            std::thread::sleep(Duration::from_millis(SCAN_POLL_INTERVAL_MS));
        }
        warn!(event_type, "timed out waiting for supplicant event");
        Ok(())
    }
}

pub struct IwScanner {
    interface: String,
    filter_macs: bool,
}

impl IwScanner {
    pub fn new(interface: &str, filter_macs: bool) -> Self {
        Self {
            interface: interface.to_string(),
            filter_macs,
        }
    }

    pub fn scan(&self) -> Result<Vec<ScannedBss>> {
        let output = Command::new("iw")
            .args(["dev", &self.interface, "scan"])
            .output()
            .map_err(|e| Error::ScanFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(Error::ScanFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        Ok(self.parse_iw_scan(&String::from_utf8_lossy(&output.stdout)))
    }

    fn parse_iw_scan(&self, scan_output: &str) -> Vec<ScannedBss> {
        let mut networks = Vec::new();
        let mut current: Option<ScannedBss> = None;

        let flush = |current: &mut Option<ScannedBss>, networks: &mut Vec<ScannedBss>| {
            if let Some(bss) = current.take() {
                if is_valid_bssid(&bss.bssid) && (!self.filter_macs || is_valid_mac(&bss.bssid)) {
                    networks.push(bss);
                }
            }
        };

        for line in scan_output.lines() {
            let line = line.trim();

            if let Some(rest) = line.strip_prefix("BSS ") {
                flush(&mut current, &mut networks);
                let bssid = rest.split('(').next().unwrap_or(rest).trim().to_string();
                if is_valid_bssid(&bssid) {
                    current = Some(ScannedBss {
                        bssid,
                        ssid: None,
                        signal_dbm: 0,
                        frequency_mhz: 0,
                    });
                }
            } else if let Some(bss) = current.as_mut() {
                if let Some(signal) = line.strip_prefix("signal: ") {
                    if let Some(value) = signal.split_whitespace().next() {
                        if let Ok(value) = f64::from_str(value) {
                            bss.signal_dbm = value as i32;
                        }
                    }
                } else if let Some(ssid) = line.strip_prefix("SSID: ") {
                    bss.ssid = Some(ssid.trim().to_string());
                } else if let Some(freq) = line.strip_prefix("freq: ") {
                    if let Ok(value) = u32::from_str(freq.trim()) {
                        bss.frequency_mhz = value;
                    }
                }
            }
        }

        flush(&mut current, &mut networks);
        networks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_filter_rejects_broadcast_locally_administered_and_iana() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(!is_valid_mac("FF:FF:FF:FF:FF:FF"));
        assert!(!is_valid_mac("02:00:00:00:00:00"));
        assert!(!is_valid_mac("00:00:5E:00:00:00"));
    }

    #[test]
    fn parse_scan_result_valid_line() {
        let bss = parse_scan_result(
            "00:11:22:33:44:55\t2412\t-45\t[WPA2-PSK-CCMP][ESS]\tMyWiFi",
            true,
        )
        .unwrap();
        assert_eq!(bss.bssid, "00:11:22:33:44:55");
        assert_eq!(bss.signal_dbm, -45);
        assert_eq!(bss.ssid.as_deref(), Some("MyWiFi"));
    }

    #[test]
    fn parse_scan_result_rejects_malformed_line() {
        assert!(parse_scan_result("invalid line", true).is_err());
    }

    #[test]
    fn iw_scan_parses_multiple_bss_blocks() {
        let scanner = IwScanner::new("wlan0", true);
        let output = "BSS 00:11:22:33:44:55(on wlan0)\n\tsignal: -40.00 dBm\n\tSSID: Alpha\n\
                       BSS 00:11:22:33:44:66(on wlan0)\n\tsignal: -70.00 dBm\n\tSSID: Beta\n";
        let networks = scanner.parse_iw_scan(output);
        assert_eq!(networks.len(), 2);
        assert_eq!(networks[0].signal_dbm, -40);
        assert_eq!(networks[1].ssid.as_deref(), Some("Beta"));
    }
}
