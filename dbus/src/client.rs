//! [`ClientService`]: the `org.freedesktop.GeoClue2.Client` interface, one object per peer that
//! called `Manager.GetClient()` (§4, C9). Owns the peer's requested accuracy cap and distance
//! threshold, forwards `Start`/`Stop` to the shared [`LocationProvider`], and publishes a new
//! [`LocationObject`] child per accepted fix.

use std::sync::Arc;

use geoclued_core::{AccuracyLevel, Location};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;
use zbus::message::Header;
use zbus::names::OwnedUniqueName;
use zbus::object_server::SignalContext;
use zbus::zvariant::{ObjectPath, OwnedObjectPath};
use zbus::{interface, Connection};

use crate::error::{BusError, Result};
use crate::location::LocationObject;
use crate::provider::LocationProvider;

fn accuracy_to_dbus(level: AccuracyLevel) -> u32 {
    level as u8 as u32
}

fn accuracy_from_dbus(value: u32) -> Option<AccuracyLevel> {
    match value {
        0 => Some(AccuracyLevel::None),
        1 => Some(AccuracyLevel::Country),
        4 => Some(AccuracyLevel::City),
        5 => Some(AccuracyLevel::Neighborhood),
        6 => Some(AccuracyLevel::Street),
        8 => Some(AccuracyLevel::Exact),
        _ => None,
    }
}

const NO_LOCATION_PATH: &str = "/";

pub struct ClientService {
    path: OwnedObjectPath,
    connection: Connection,
    owner: OwnedUniqueName,
    provider: Arc<dyn LocationProvider>,
    desktop_id: String,
    distance_threshold_m: u32,
    requested_accuracy: AccuracyLevel,
    active: bool,
    current_location_path: Option<OwnedObjectPath>,
    current_location: Option<Location>,
    counter: u64,
    fix_task: Option<JoinHandle<()>>,
}

impl ClientService {
    pub fn new(
        path: OwnedObjectPath,
        connection: Connection,
        owner: OwnedUniqueName,
        provider: Arc<dyn LocationProvider>,
    ) -> Self {
        Self {
            path,
            connection,
            owner,
            provider,
            desktop_id: String::new(),
            distance_threshold_m: 0,
            requested_accuracy: AccuracyLevel::Exact,
            active: false,
            current_location_path: None,
            current_location: None,
            counter: 0,
            fix_task: None,
        }
    }

    fn check_owner(&self, header: &Header<'_>) -> Result<()> {
        let sender = header.sender().map(|s| s.as_str()).unwrap_or_default();
        if sender != self.owner.as_str() {
            return Err(BusError::access_denied(format!(
                "{sender} is not the owner of this Client"
            )));
        }
        Ok(())
    }
}

#[interface(name = "org.freedesktop.GeoClue2.Client")]
impl ClientService {
    #[zbus(property)]
    fn desktop_id(&self, #[zbus(header)] header: Header<'_>) -> Result<String> {
        self.check_owner(&header)?;
        Ok(self.desktop_id.clone())
    }

    #[zbus(property)]
    async fn set_desktop_id(&mut self, #[zbus(header)] header: Header<'_>, value: String) -> Result<()> {
        self.check_owner(&header)?;
        self.desktop_id = value;
        Ok(())
    }

    #[zbus(property, name = "DistanceThreshold")]
    fn distance_threshold(&self, #[zbus(header)] header: Header<'_>) -> Result<u32> {
        self.check_owner(&header)?;
        Ok(self.distance_threshold_m)
    }

    #[zbus(property, name = "DistanceThreshold")]
    async fn set_distance_threshold(
        &mut self,
        #[zbus(header)] header: Header<'_>,
        value: u32,
    ) -> Result<()> {
        self.check_owner(&header)?;
        self.distance_threshold_m = value;
        Ok(())
    }

    #[zbus(property, name = "RequestedAccuracyLevel")]
    fn requested_accuracy_level(&self, #[zbus(header)] header: Header<'_>) -> Result<u32> {
        self.check_owner(&header)?;
        Ok(accuracy_to_dbus(self.requested_accuracy))
    }

    #[zbus(property, name = "RequestedAccuracyLevel")]
    async fn set_requested_accuracy_level(
        &mut self,
        #[zbus(header)] header: Header<'_>,
        value: u32,
    ) -> Result<()> {
        self.check_owner(&header)?;
        self.requested_accuracy = accuracy_from_dbus(value)
            .ok_or_else(|| BusError::failed(format!("unknown accuracy level {value}")))?;
        Ok(())
    }

    #[zbus(property)]
    fn location(&self, #[zbus(header)] header: Header<'_>) -> Result<zbus::zvariant::OwnedObjectPath> {
        self.check_owner(&header)?;
        Ok(self
            .current_location_path
            .clone()
            .unwrap_or_else(|| OwnedObjectPath::try_from(NO_LOCATION_PATH).unwrap()))
    }

    #[zbus(property)]
    fn active(&self, #[zbus(header)] header: Header<'_>) -> Result<bool> {
        self.check_owner(&header)?;
        Ok(self.active)
    }

    #[zbus(name = "Start")]
    async fn start(&mut self, #[zbus(header)] header: Header<'_>) -> Result<()> {
        self.check_owner(&header)?;
        if self.active {
            return Ok(());
        }
        self.active = true;

        let rx = self
            .provider
            .start(self.desktop_id.clone(), self.requested_accuracy)
            .await;
        let connection = self.connection.clone();
        let path = self.path.clone();
        self.fix_task = Some(tokio::spawn(run_fix_loop(connection, path, rx)));
        Ok(())
    }

    #[zbus(name = "Stop")]
    async fn stop(&mut self, #[zbus(header)] header: Header<'_>) -> Result<()> {
        self.check_owner(&header)?;
        if !self.active {
            return Ok(());
        }
        self.active = false;
        if let Some(handle) = self.fix_task.take() {
            handle.abort();
        }
        self.provider.stop(self.desktop_id.clone()).await;
        Ok(())
    }

    #[zbus(signal)]
    async fn location_updated(
        ctxt: &SignalContext<'_>,
        old: ObjectPath<'_>,
        new: ObjectPath<'_>,
    ) -> zbus::Result<()>;
}

/// Whether a new fix is close enough to the client's last accepted location to be treated as an
/// in-place refinement rather than a new published object (§9). A threshold of 0 means "every fix
/// is new", matching real GeoClue2.
fn is_in_place_refinement(current: Option<&Location>, threshold_m: u32, fix: &Location) -> bool {
    if threshold_m == 0 {
        return false;
    }
    let threshold_km = f64::from(threshold_m) / 1000.0;
    current.is_some_and(|prev| prev.distance_to(fix) < threshold_km)
}

/// Follows the provider's fix stream for one active client, applying the §9 threshold-filtering
/// invariant: fixes within the client's distance threshold refine the existing [`LocationObject`]
/// in place (no signal), fixes past it publish a new one and emit `LocationUpdated`. Runs until
/// `Stop()` aborts it or the provider's channel closes.
async fn run_fix_loop(
    connection: Connection,
    path: OwnedObjectPath,
    mut rx: watch::Receiver<Option<Location>>,
) {
    while rx.changed().await.is_ok() {
        let Some(fix) = rx.borrow_and_update().clone() else {
            continue;
        };

        let iface = match connection
            .object_server()
            .interface::<_, ClientService>(&path)
            .await
        {
            Ok(iface) => iface,
            Err(e) => {
                warn!(error = %e, "ClientService object vanished, stopping fix loop");
                return;
            }
        };

        let signal_ctxt = iface.signal_context().clone();
        let mut client = iface.get_mut().await;
        if !client.active {
            continue;
        }

        if is_in_place_refinement(client.current_location.as_ref(), client.distance_threshold_m, &fix) {
            let existing_path = client
                .current_location_path
                .clone()
                .expect("a refinement implies a previously published location");
            client.current_location = Some(fix.clone());
            drop(client);

            match connection
                .object_server()
                .interface::<_, LocationObject>(&existing_path)
                .await
            {
                Ok(location_iface) => location_iface.get_mut().await.set_location(fix),
                Err(e) => warn!(error = %e, "failed to refine Location object in place"),
            }
            continue;
        }

        let n = client.counter;
        client.counter += 1;
        let new_path = match OwnedObjectPath::try_from(format!("{}/Location/{n}", client.path)) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to build Location object path");
                continue;
            }
        };
        let old_path = client
            .current_location_path
            .clone()
            .unwrap_or_else(|| OwnedObjectPath::try_from(NO_LOCATION_PATH).unwrap());

        if let Err(e) = connection
            .object_server()
            .at(new_path.clone(), LocationObject::new(fix.clone()))
            .await
        {
            warn!(error = %e, "failed to publish Location object");
            continue;
        }

        client.current_location = Some(fix);
        client.current_location_path = Some(new_path.clone());
        drop(client);

        if let Err(e) =
            ClientService::location_updated(&signal_ctxt, old_path.as_ref(), new_path.as_ref())
                .await
        {
            warn!(error = %e, "failed to emit LocationUpdated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_level_round_trips_through_the_dbus_values() {
        for level in [
            AccuracyLevel::None,
            AccuracyLevel::Country,
            AccuracyLevel::City,
            AccuracyLevel::Neighborhood,
            AccuracyLevel::Street,
            AccuracyLevel::Exact,
        ] {
            assert_eq!(accuracy_from_dbus(accuracy_to_dbus(level)), Some(level));
        }
    }

    #[test]
    fn unknown_accuracy_value_is_rejected() {
        assert_eq!(accuracy_from_dbus(2), None);
        assert_eq!(accuracy_from_dbus(99), None);
    }

    fn paris() -> Location {
        Location::new(48.8566, 2.3522, None).unwrap()
    }

    fn across_paris() -> Location {
        Location::new(48.8606, 2.3376, None).unwrap()
    }

    #[test]
    fn first_fix_is_never_a_refinement() {
        assert!(!is_in_place_refinement(None, 500, &paris()));
        assert!(!is_in_place_refinement(None, 0, &paris()));
    }

    #[test]
    fn zero_threshold_never_refines() {
        let prev = paris();
        assert!(!is_in_place_refinement(Some(&prev), 0, &paris()));
    }

    #[test]
    fn fix_within_threshold_is_a_refinement() {
        let prev = paris();
        assert!(is_in_place_refinement(Some(&prev), 50_000, &across_paris()));
    }

    #[test]
    fn fix_past_threshold_is_not_a_refinement() {
        let prev = paris();
        assert!(!is_in_place_refinement(Some(&prev), 500, &across_paris()));
    }
}
