use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::accuracy::AccuracyLevel;
use crate::location::Location;

/// Tags the closed set of concrete `LocationSource` implementations. Kept alongside the trait
/// object so singleton registries and logging don't need downcasting to know what they're
/// holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Wifi,
    Cell,
    Gps,
    Locator,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceKind::Wifi => "wifi",
            SourceKind::Cell => "cell",
            SourceKind::Gps => "gps",
            SourceKind::Locator => "locator",
        };
        f.write_str(name)
    }
}

/// Abstract contract shared by every location source: lifecycle, activity, and the two
/// observable properties (`location`, `available_accuracy_level`).
///
/// Implementations hand out `watch::Receiver`s rather than a callback-based subscription API: a
/// `watch` channel always holds the latest value and delivers it to new subscribers immediately,
/// which is the async equivalent of reading a GObject property on connect and then following its
/// `notify` signal, without the reentrancy hazard of a synchronous callback (see the concurrency
/// notes on recursion).
#[async_trait]
pub trait LocationSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Idempotent. Returns whether this call caused CREATED/STOPPED -> ACTIVE.
    async fn start(&self) -> bool;

    /// Idempotent. Returns whether this call caused ACTIVE -> STOPPED.
    async fn stop(&self) -> bool;

    fn is_active(&self) -> bool;

    fn location(&self) -> watch::Receiver<Option<Location>>;

    fn available_accuracy_level(&self) -> watch::Receiver<AccuracyLevel>;
}

/// Shared bookkeeping every concrete source embeds: the active flag and the two watch channels.
/// Not itself a `LocationSource` impl (the `start`/`stop` semantics differ enough per source -
/// WifiSource opens a supplicant connection, CellSource doesn't - that forcing a single default
/// implementation would just hide the differences), but it removes the channel plumbing
/// boilerplate from every leaf source.
pub struct SourceState {
    active: AtomicBool,
    location_tx: watch::Sender<Option<Location>>,
    location_rx: watch::Receiver<Option<Location>>,
    accuracy_tx: watch::Sender<AccuracyLevel>,
    accuracy_rx: watch::Receiver<AccuracyLevel>,
}

impl SourceState {
    pub fn new() -> Self {
        let (location_tx, location_rx) = watch::channel(None);
        let (accuracy_tx, accuracy_rx) = watch::channel(AccuracyLevel::None);
        Self {
            active: AtomicBool::new(false),
            location_tx,
            location_rx,
            accuracy_tx,
            accuracy_rx,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns whether this call caused a transition.
    pub fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst) != active
    }

    pub fn location(&self) -> watch::Receiver<Option<Location>> {
        self.location_rx.clone()
    }

    pub fn current_location(&self) -> Option<Location> {
        self.location_rx.borrow().clone()
    }

    pub fn available_accuracy_level(&self) -> watch::Receiver<AccuracyLevel> {
        self.accuracy_rx.clone()
    }

    /// Unconditional publish, for use by a source's own internal plumbing (the "caller is the
    /// source itself" branch of the `setLocation` gate). Callers implementing the Locator merge
    /// rule should decide acceptance themselves before calling this.
    pub fn publish(&self, location: Location) {
        self.location_tx.send_replace(Some(location));
    }

    pub fn set_available_accuracy_level(&self, level: AccuracyLevel) {
        self.accuracy_tx.send_if_modified(|current| {
            if *current != level {
                *current = level;
                true
            } else {
                false
            }
        });
    }
}

impl Default for SourceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_active_reports_transitions_only() {
        let state = SourceState::new();
        assert!(state.set_active(true));
        assert!(!state.set_active(true));
        assert!(state.set_active(false));
        assert!(!state.set_active(false));
    }

    #[tokio::test]
    async fn publish_is_observable_through_watch_receiver() {
        let state = SourceState::new();
        let mut rx = state.location();
        assert!(rx.borrow().is_none());

        let fix = Location::new(1.0, 2.0, Some(10.0)).unwrap();
        state.publish(fix.clone());

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref(), Some(&fix));
    }
}
