//! The seam between this crate's D-Bus surface and the daemon's Locator (C8): `ClientService`
//! only ever talks to a `dyn LocationProvider`, so `geoclued-dbus` never depends on the daemon
//! binary or any concrete source crate.

use async_trait::async_trait;
use geoclued_core::{AccuracyLevel, Location};
use tokio::sync::watch;

#[async_trait]
pub trait LocationProvider: Send + Sync + 'static {
    /// Registers interest in fixes capped at `cap` on behalf of `desktop_id`, returning the watch
    /// channel the client should follow. Calling this again for the same `desktop_id` re-caps the
    /// existing subscription rather than creating a second one.
    async fn start(&self, desktop_id: String, cap: AccuracyLevel) -> watch::Receiver<Option<Location>>;

    /// Withdraws `desktop_id`'s interest. A no-op if it was never started.
    async fn stop(&self, desktop_id: String);
}
