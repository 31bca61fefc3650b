//! Routing of pushed events to listeners and near caches.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use extend_core::protocol::{CacheNotification, CacheNotificationKind, Event, MapEvent};
use extend_core::Data;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{dispatch_map_event, BoxedMapListener, ListenerId, ListenerStats, MapEntryEvent};
use crate::cache::NearCache;
use crate::connection::ChannelEvent;

/// Interest in a whole cache (`None`) or in a single key.
pub(crate) type Interest = Option<Data>;

struct Subscription {
    id: ListenerId,
    key: Interest,
    listener: BoxedMapListener<Data, Data>,
}

impl Subscription {
    fn matches(&self, key: &Data) -> bool {
        self.key.as_ref().map_or(true, |k| k == key)
    }
}

#[derive(Default)]
struct CacheEvents {
    subscriptions: Vec<Subscription>,
    near_cache: Option<Arc<NearCache>>,
    interest: HashMap<Interest, usize>,
}

impl CacheEvents {
    fn acquire(&mut self, interest: Interest) -> bool {
        let count = self.interest.entry(interest).or_insert(0);
        *count += 1;
        *count == 1
    }

    fn track(&mut self, near_cache: &NearCache, key: &Data) {
        if near_cache.track(key) {
            self.acquire(Some(key.clone()));
        }
    }

    fn release(&mut self, interest: &Interest) -> bool {
        match self.interest.get_mut(interest) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.interest.remove(interest);
                true
            }
            None => false,
        }
    }
}

/// Local subscriber state for every cache of one client.
///
/// Interest is reference-counted per cache and key: callers tell the peer
/// about interest only when [`EventRegistry::subscribe`] or
/// [`EventRegistry::acquire_interest`] report the first holder, and withdraw
/// it only when the last holder leaves. Keys tracked by a near cache through
/// priming hold one reference each.
///
/// Priming markers stay outstanding while their get is in flight and for
/// `priming_grace` after it was answered; only events carrying an
/// outstanding marker are suppressed.
pub(crate) struct EventRegistry {
    caches: Mutex<HashMap<String, CacheEvents>>,
    priming: Mutex<HashMap<i64, Option<Instant>>>,
    priming_grace: Duration,
    next_marker: AtomicI64,
    stats: ListenerStats,
}

/// How long an answered priming marker waits for its echoed event.
const PRIMING_GRACE: Duration = Duration::from_secs(60);

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self::with_priming_grace(PRIMING_GRACE)
    }

    pub(crate) fn with_priming_grace(priming_grace: Duration) -> Self {
        Self {
            caches: Mutex::new(HashMap::new()),
            priming: Mutex::new(HashMap::new()),
            priming_grace,
            next_marker: AtomicI64::new(1),
            stats: ListenerStats::new(),
        }
    }

    pub(crate) fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Routes events for `cache` to `near_cache` as well as listeners.
    pub(crate) fn attach_near_cache(&self, cache: &str, near_cache: Arc<NearCache>) {
        self.caches
            .lock()
            .entry(cache.to_string())
            .or_default()
            .near_cache = Some(near_cache);
    }

    /// Adds a listener. Returns its id and whether the interest is new.
    pub(crate) fn subscribe(
        &self,
        cache: &str,
        key: Interest,
        listener: BoxedMapListener<Data, Data>,
    ) -> (ListenerId, bool) {
        let id = ListenerId::new();
        let mut caches = self.caches.lock();
        let state = caches.entry(cache.to_string()).or_default();
        let first = state.acquire(key.clone());
        state.subscriptions.push(Subscription { id, key, listener });
        tracing::debug!(cache, listener = %id, "listener subscribed");
        (id, first)
    }

    /// Removes a listener. Returns its interest and whether it was the last holder.
    pub(crate) fn unsubscribe(&self, cache: &str, id: ListenerId) -> Option<(Interest, bool)> {
        let mut caches = self.caches.lock();
        let state = caches.get_mut(cache)?;
        let position = state.subscriptions.iter().position(|s| s.id == id)?;
        let subscription = state.subscriptions.remove(position);
        let last = state.release(&subscription.key);
        tracing::debug!(cache, listener = %id, "listener unsubscribed");
        Some((subscription.key, last))
    }

    /// Takes a reference on `interest` without a listener.
    pub(crate) fn acquire_interest(&self, cache: &str, interest: Interest) -> bool {
        self.caches
            .lock()
            .entry(cache.to_string())
            .or_default()
            .acquire(interest)
    }

    /// Drops a reference taken by [`EventRegistry::acquire_interest`].
    pub(crate) fn release_interest(&self, cache: &str, interest: &Interest) -> bool {
        self.caches
            .lock()
            .get_mut(cache)
            .map_or(false, |state| state.release(interest))
    }

    /// Allocates a marker for a priming get.
    pub(crate) fn begin_priming(&self) -> i64 {
        let marker = self.next_marker.fetch_add(1, Ordering::Relaxed);
        let mut priming = self.priming.lock();
        self.retire_answered(&mut priming, Instant::now());
        priming.insert(marker, None);
        marker
    }

    /// Records that the get carrying `marker` was answered.
    ///
    /// The marker is retired once its event arrives, or after the grace
    /// period if the peer never echoes it.
    pub(crate) fn finish_priming(&self, marker: i64) {
        let now = Instant::now();
        let mut priming = self.priming.lock();
        if let Some(answered) = priming.get_mut(&marker) {
            *answered = Some(now);
        }
        self.retire_answered(&mut priming, now);
    }

    /// Forgets a marker whose get failed.
    pub(crate) fn abandon_priming(&self, marker: i64) {
        self.priming.lock().remove(&marker);
    }

    fn retire_answered(&self, priming: &mut HashMap<i64, Option<Instant>>, now: Instant) {
        let grace = self.priming_grace;
        priming.retain(|_, answered| {
            answered.map_or(true, |at| now.duration_since(at) < grace)
        });
    }

    /// Marks `key` as tracked by the near cache of `cache` after a priming get.
    pub(crate) fn track_primed_key(&self, cache: &str, near_cache: &NearCache, key: &Data) {
        if let Some(state) = self.caches.lock().get_mut(cache) {
            state.track(near_cache, key);
        }
    }

    /// Drops every subscription and near-cache entry for `cache`.
    pub(crate) fn forget_cache(&self, cache: &str) {
        let removed = self.caches.lock().remove(cache);
        if let Some(state) = removed {
            if let Some(near_cache) = state.near_cache {
                near_cache.clear();
            }
            tracing::debug!(
                cache,
                listeners = state.subscriptions.len(),
                "dropped local event state"
            );
        }
    }

    /// Handles one item from the event channel.
    pub(crate) fn handle(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Event(Event::Map(event)) => self.on_map_event(event),
            ChannelEvent::Event(Event::Notification(notification)) => {
                self.on_notification(notification)
            }
            ChannelEvent::Closed(reason) => self.on_closed(&reason),
        }
    }

    fn on_map_event(&self, event: MapEvent) {
        self.stats.record_received();

        if let Some(marker) = event.priming {
            if self.priming.lock().remove(&marker).is_some() {
                self.on_priming(event);
                return;
            }
            tracing::warn!(
                cache = %event.cache_name,
                marker,
                "event carries an unknown priming marker"
            );
        }

        let (near_cache, listeners) = {
            let caches = self.caches.lock();
            let Some(state) = caches.get(&event.cache_name) else {
                tracing::debug!(cache = %event.cache_name, "event for a cache with no local state");
                return;
            };
            let listeners: Vec<_> = state
                .subscriptions
                .iter()
                .filter(|s| s.matches(&event.key))
                .map(|s| Arc::clone(&s.listener))
                .collect();
            (state.near_cache.clone(), listeners)
        };

        if let Some(near_cache) = near_cache {
            near_cache.invalidate(&event.key);
        }

        self.stats.record_delivered(listeners.len());
        let cache = event.cache_name.clone();
        let entry = MapEntryEvent::from_wire(event);
        for listener in listeners {
            notify(&cache, || dispatch_map_event(listener.as_ref(), entry.clone()));
        }
    }

    fn on_priming(&self, event: MapEvent) {
        self.stats.record_suppressed();

        let mut caches = self.caches.lock();
        let Some(state) = caches.get_mut(&event.cache_name) else {
            return;
        };
        if let Some(near_cache) = state.near_cache.clone() {
            state.track(&near_cache, &event.key);
        }
    }

    fn on_notification(&self, notification: CacheNotification) {
        self.stats.record_received();
        let cache = notification.cache_name.as_str();
        match notification.kind {
            CacheNotificationKind::Truncated => {
                let (near_cache, listeners) = self.snapshot(cache);
                if let Some(near_cache) = near_cache {
                    near_cache.clear();
                }
                for listener in listeners {
                    notify(cache, || listener.cache_truncated(cache));
                }
            }
            CacheNotificationKind::Destroyed => self.forget_cache(cache),
        }
    }

    fn on_closed(&self, reason: &str) {
        tracing::debug!(reason, "event channel closed");
        self.priming.lock().clear();

        let affected: Vec<_> = {
            let caches = self.caches.lock();
            caches
                .iter()
                .map(|(name, state)| {
                    let listeners: Vec<_> = state
                        .subscriptions
                        .iter()
                        .map(|s| Arc::clone(&s.listener))
                        .collect();
                    (name.clone(), state.near_cache.clone(), listeners)
                })
                .collect()
        };

        for (cache, near_cache, listeners) in affected {
            if let Some(near_cache) = near_cache {
                near_cache.clear();
            }
            for listener in listeners {
                notify(&cache, || listener.disconnected(&cache));
            }
        }
    }

    fn snapshot(
        &self,
        cache: &str,
    ) -> (Option<Arc<NearCache>>, Vec<BoxedMapListener<Data, Data>>) {
        let caches = self.caches.lock();
        match caches.get(cache) {
            Some(state) => (
                state.near_cache.clone(),
                state
                    .subscriptions
                    .iter()
                    .map(|s| Arc::clone(&s.listener))
                    .collect(),
            ),
            None => (None, Vec::new()),
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("caches", &self.caches.lock().len())
            .field("priming", &self.priming.lock().len())
            .finish()
    }
}

/// Runs one listener callback, containing a panic so later events still flow.
fn notify(cache: &str, callback: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        let message = panic
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string payload");
        tracing::error!(cache, panic = message, "map listener panicked");
    }
}

/// Spawns the task that applies event-channel traffic in arrival order.
pub(crate) fn spawn_dispatcher(
    registry: Arc<EventRegistry>,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let closed = matches!(event, ChannelEvent::Closed(_));
            registry.handle(event);
            if closed {
                break;
            }
        }
        tracing::debug!("event dispatcher stopped");
    })
}
