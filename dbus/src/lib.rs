//! The `org.freedesktop.GeoClue2` D-Bus surface: [`manager::Manager`] at a well-known singleton
//! path, one [`client::ClientService`] per peer, one [`location::LocationObject`] per published
//! fix. None of this crate knows where fixes actually come from — it only talks to a
//! [`provider::LocationProvider`], which the daemon implements on top of its source composition.

pub mod client;
pub mod error;
pub mod location;
pub mod manager;
pub mod provider;

pub use client::ClientService;
pub use error::{BusError, Result};
pub use location::LocationObject;
pub use manager::{run_idle_shutdown, Manager, BUS_NAME, MANAGER_INTERFACE, MANAGER_PATH};
pub use provider::LocationProvider;

pub const CLIENT_INTERFACE: &str = "org.freedesktop.GeoClue2.Client";
pub const LOCATION_INTERFACE: &str = "org.freedesktop.GeoClue2.Location";
