//! Event listener infrastructure for named caches.

mod map_listener;
mod registry;

pub use map_listener::{
    dispatch_map_event, BoxedMapListener, FnMapListener, FnMapListenerBuilder, MapEntryEvent,
    MapListener, TypedMapListener,
};
pub(crate) use registry::{spawn_dispatcher, EventRegistry, Interest};

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Unique identifier for a listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Creates a new unique listener ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a listener ID from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Counters kept by the event pipeline.
#[derive(Debug, Default)]
pub struct ListenerStats {
    events_received: AtomicU64,
    events_delivered: AtomicU64,
    priming_suppressed: AtomicU64,
}

impl ListenerStats {
    /// Creates new listener statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, listeners: usize) {
        self.events_delivered
            .fetch_add(listeners as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.priming_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of events pushed by the peer.
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Returns the number of listener callbacks made for entry events.
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    /// Returns the number of synthetic priming events withheld from listeners.
    pub fn priming_suppressed(&self) -> u64 {
        self.priming_suppressed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_id_uniqueness() {
        let id1 = ListenerId::new();
        let id2 = ListenerId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_listener_id_display() {
        let id = ListenerId::new();
        let display = id.to_string();
        assert!(display.starts_with("listener-"));
    }

    #[test]
    fn test_listener_id_from_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(ListenerId::from_uuid(uuid).as_uuid(), uuid);
    }

    #[test]
    fn test_listener_stats() {
        let stats = ListenerStats::new();
        assert_eq!(stats.events_received(), 0);

        stats.record_received();
        stats.record_received();
        stats.record_delivered(3);
        stats.record_suppressed();

        assert_eq!(stats.events_received(), 2);
        assert_eq!(stats.events_delivered(), 3);
        assert_eq!(stats.priming_suppressed(), 1);
    }

    #[test]
    fn test_listener_id_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ListenerId>();
        assert_send_sync::<ListenerStats>();
    }
}
