//! CLI parsing and the [`Config`] it's converted into: `clap` owns argument parsing and
//! environment overrides, `Config` is the plain serde-derived shape the rest of the daemon
//! actually consumes (and that a TOML file can also populate).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(author, version, about = "GeoClue2-compatible geolocation daemon")]
pub struct Cli {
    #[arg(long, help = "Path to a TOML config file; CLI flags override its values")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        default_value = "org.freedesktop.GeoClue2",
        help = "D-Bus well-known name to acquire"
    )]
    pub bus_name: String,

    #[arg(long, help = "Use the system bus instead of the session bus")]
    pub system_bus: bool,

    #[arg(short = 'i', long, default_value = "wlan0", help = "WiFi interface name")]
    pub wifi_interface: String,

    #[arg(long, help = "Path to the wpa_supplicant control socket (omit to scan with iw)")]
    pub wpa_ctrl_path: Option<String>,

    #[arg(long, help = "Disable WiFi MAC address filtering")]
    pub no_mac_filter: bool,

    #[arg(
        long,
        default_value = "https://location.services.mozilla.com/v1/geolocate?key=geoclued",
        help = "Mozilla-compatible WiFi/cell geolocate endpoint"
    )]
    pub wifi_url: String,

    #[arg(long, help = "Observation submission endpoint; omit to disable submission")]
    pub wifi_submit_url: Option<String>,

    #[arg(long, help = "X-Nickname header value attached to submissions")]
    pub wifi_submit_nick: Option<String>,

    #[arg(long, help = "Enable cell modem scanning")]
    pub enable_cell: bool,

    #[arg(long, default_value = "/dev/ttyUSB2", help = "Cell modem AT command device")]
    pub cell_device: String,

    #[arg(
        long,
        default_value = "https://us1.unwiredlabs.com/v2/process.php",
        help = "OpenCellID-compatible query endpoint"
    )]
    pub opencellid_url: String,

    #[arg(long, env = "OPENCELLID_API_KEY", default_value = "", help = "OpenCellID API key")]
    pub opencellid_api_key: String,

    #[arg(long, help = "Enable GPS modem scanning")]
    pub enable_gps: bool,

    #[arg(long, default_value = "/dev/ttyUSB2", help = "GPS modem AT command device")]
    pub gps_at_device: String,

    #[arg(long, default_value = "/dev/ttyUSB1", help = "GPS modem NMEA serial device")]
    pub gps_nmea_device: String,

    #[arg(long, default_value = "5", help = "WiFi scan poll interval in seconds")]
    pub scan_interval: u64,

    #[arg(long, default_value = "json", help = "Log output format: \"json\" or \"pretty\"")]
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bus: BusConfig,
    pub wifi: WifiConfig,
    pub cellular: CellularConfig,
    pub gps: GpsConfig,
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub name: String,
    pub system: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    pub interface: String,
    pub wpa_ctrl_path: Option<PathBuf>,
    pub use_mac_filter: bool,
    pub geolocate_url: String,
    pub submit_url: Option<String>,
    pub submit_nick: Option<String>,
    pub scan_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellularConfig {
    pub enabled: bool,
    pub device: String,
    pub opencellid_url: String,
    pub opencellid_api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsConfig {
    pub enabled: bool,
    pub at_device: String,
    pub nmea_device: String,
}

impl Config {
    /// Loads `path` (if given) as a TOML base, then layers the CLI's explicitly-set flags on top -
    /// an explicit flag always wins over the file.
    pub fn load(cli: &Cli) -> eyre::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| eyre::eyre!("failed to read config file {}: {e}", path.display()))?;
                toml::from_str(&text)
                    .map_err(|e| eyre::eyre!("failed to parse config file {}: {e}", path.display()))?
            }
            None => Self::from_cli_only(cli),
        };

        if cli.config.is_some() {
            config.apply_cli_overrides(cli);
        }

        Ok(config)
    }

    fn from_cli_only(cli: &Cli) -> Self {
        Self {
            bus: BusConfig {
                name: cli.bus_name.clone(),
                system: cli.system_bus,
            },
            wifi: WifiConfig {
                interface: cli.wifi_interface.clone(),
                wpa_ctrl_path: cli.wpa_ctrl_path.clone().map(PathBuf::from),
                use_mac_filter: !cli.no_mac_filter,
                geolocate_url: cli.wifi_url.clone(),
                submit_url: cli.wifi_submit_url.clone(),
                submit_nick: cli.wifi_submit_nick.clone(),
                scan_interval: Duration::from_secs(cli.scan_interval),
            },
            cellular: CellularConfig {
                enabled: cli.enable_cell,
                device: cli.cell_device.clone(),
                opencellid_url: cli.opencellid_url.clone(),
                opencellid_api_key: cli.opencellid_api_key.clone(),
            },
            gps: GpsConfig {
                enabled: cli.enable_gps,
                at_device: cli.gps_at_device.clone(),
                nmea_device: cli.gps_nmea_device.clone(),
            },
            log_format: cli.log_format.clone(),
        }
    }

    /// Only overrides fields the CLI actually sets away from its own defaults; a config file's
    /// values otherwise stand, so an explicit flag always wins over a loaded file.
    fn apply_cli_overrides(&mut self, cli: &Cli) {
        let defaults = Cli::parse_from(["geoclued"]);

        if cli.bus_name != defaults.bus_name {
            self.bus.name = cli.bus_name.clone();
        }
        if cli.system_bus {
            self.bus.system = true;
        }
        if cli.wifi_interface != defaults.wifi_interface {
            self.wifi.interface = cli.wifi_interface.clone();
        }
        if cli.wpa_ctrl_path.is_some() {
            self.wifi.wpa_ctrl_path = cli.wpa_ctrl_path.clone().map(PathBuf::from);
        }
        if cli.no_mac_filter {
            self.wifi.use_mac_filter = false;
        }
        if cli.wifi_url != defaults.wifi_url {
            self.wifi.geolocate_url = cli.wifi_url.clone();
        }
        if cli.wifi_submit_url.is_some() {
            self.wifi.submit_url = cli.wifi_submit_url.clone();
        }
        if cli.wifi_submit_nick.is_some() {
            self.wifi.submit_nick = cli.wifi_submit_nick.clone();
        }
        if cli.enable_cell {
            self.cellular.enabled = true;
        }
        if cli.cell_device != defaults.cell_device {
            self.cellular.device = cli.cell_device.clone();
        }
        if cli.opencellid_url != defaults.opencellid_url {
            self.cellular.opencellid_url = cli.opencellid_url.clone();
        }
        if !cli.opencellid_api_key.is_empty() {
            self.cellular.opencellid_api_key = cli.opencellid_api_key.clone();
        }
        if cli.enable_gps {
            self.gps.enabled = true;
        }
        if cli.gps_at_device != defaults.gps_at_device {
            self.gps.at_device = cli.gps_at_device.clone();
        }
        if cli.gps_nmea_device != defaults.gps_nmea_device {
            self.gps.nmea_device = cli.gps_nmea_device.clone();
        }
        if cli.log_format != defaults.log_format {
            self.log_format = cli.log_format.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_only_config_carries_defaults_through() {
        let cli = Cli::parse_from(["geoclued"]);
        let config = Config::from_cli_only(&cli);
        assert_eq!(config.bus.name, "org.freedesktop.GeoClue2");
        assert!(!config.cellular.enabled);
        assert!(!config.gps.enabled);
        assert_eq!(config.wifi.interface, "wlan0");
    }

    #[test]
    fn explicit_flags_override_a_loaded_config_file() {
        let mut config = Config::from_cli_only(&Cli::parse_from(["geoclued"]));
        config.wifi.interface = "wlan-from-file".into();

        let cli = Cli::parse_from(["geoclued", "--wifi-interface", "wlan-from-cli"]);
        config.apply_cli_overrides(&cli);
        assert_eq!(config.wifi.interface, "wlan-from-cli");
    }
}
