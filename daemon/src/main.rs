//! Binds the three source singletons, the Locator composition, and the D-Bus surface together as
//! a runnable process (§6, §9).

mod config;
mod locator;
mod logging;
mod network;

use std::sync::Arc;

use clap::Parser;
use config::{Cli, Config};
use eyre::WrapErr;
use geoclued_cellular::{CellSourceConfig, CellSource};
use geoclued_gps::{ModemGpsSource, ModemGpsSourceConfig};
use geoclued_wifi::WifiSourceConfig;
use locator::LocatorProvider;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;
use zbus::Connection;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    logging::init(&config.log_format);

    info!(
        bus = config.bus.name,
        system_bus = config.bus.system,
        cellular = config.cellular.enabled,
        gps = config.gps.enabled,
        "starting geoclued"
    );

    let shutdown = CancellationToken::new();
    setup_signal_handling(shutdown.clone());

    let network_reachable = network::spawn(
        network::probe_target(&config.wifi.geolocate_url),
        shutdown.clone(),
    );

    let wifi_config = WifiSourceConfig {
        geolocate_url: config.wifi.geolocate_url.clone(),
        submit_url: config.wifi.submit_url.clone(),
        interface: config.wifi.interface.clone(),
        wpa_ctrl_path: config.wifi.wpa_ctrl_path.clone(),
        filter_macs: config.wifi.use_mac_filter,
    };

    let cell = if config.cellular.enabled {
        geoclued_cellular::instance(
            CellSourceConfig {
                serial_device: config.cellular.device.clone(),
                opencellid_url: config.cellular.opencellid_url.clone(),
                opencellid_api_key: config.cellular.opencellid_api_key.clone(),
            },
            network_reachable.clone(),
        )
    } else {
        CellSource::new(
            CellSourceConfig {
                serial_device: config.cellular.device.clone(),
                opencellid_url: config.cellular.opencellid_url.clone(),
                opencellid_api_key: config.cellular.opencellid_api_key.clone(),
            },
            network_reachable.clone(),
        )
    };

    let gps = ModemGpsSource::new(ModemGpsSourceConfig {
        at_device: config.gps.at_device.clone(),
        nmea_device: config.gps.nmea_device.clone(),
    });
    if config.gps.enabled {
        gps.spawn().await;
    }

    let provider: Arc<dyn geoclued_dbus::LocationProvider> = Arc::new(LocatorProvider::new(
        wifi_config,
        network_reachable.clone(),
        cell,
        gps,
    ));

    let connection = if config.bus.system {
        Connection::system().await
    } else {
        Connection::session().await
    }
    .wrap_err("failed to connect to the D-Bus daemon")?;

    let manager = geoclued_dbus::Manager::new(connection.clone(), provider);
    let connected_count = manager.connected_count_receiver();
    connection
        .object_server()
        .at(geoclued_dbus::MANAGER_PATH, manager)
        .await
        .wrap_err("failed to register the Manager object")?;
    connection
        .request_name(config.bus.name.as_str())
        .await
        .wrap_err("failed to acquire the GeoClue2 well-known name")?;

    info!(name = config.bus.name, "acquired bus name, ready");

    tokio::select! {
        () = geoclued_dbus::run_idle_shutdown(connected_count, shutdown.clone()) => {
            info!("idle timeout elapsed, shutting down");
        }
        () = shutdown.cancelled() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn setup_signal_handling(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }

        shutdown.cancel();
    });
}
