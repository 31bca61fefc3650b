//! Near-cache implementation for client-side caching.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use extend_core::Data;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{EvictionPolicy, NearCacheConfig};

/// Statistics for near-cache operations.
#[derive(Debug, Clone, Default)]
pub struct NearCacheStats {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
}

impl NearCacheStats {
    /// Returns the number of cache hits.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Returns the number of cache misses.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Returns the number of entries evicted due to capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Returns the number of entries expired due to TTL or max-idle.
    pub fn expirations(&self) -> u64 {
        self.expirations
    }

    /// Returns the number of entries dropped because of remote changes.
    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// Returns the hit ratio (hits / total lookups).
    ///
    /// Returns `0.0` if no lookups have been performed.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Internal cache entry with metadata for TTL and eviction tracking.
struct CacheEntry {
    value: Data,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn new(value: Data, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            last_accessed: now,
            access_count: 1,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count += 1;
    }
}

/// A read-through in flight for one key.
#[derive(Debug, Default)]
struct InFlight {
    readers: usize,
    generation: u64,
}

#[derive(Default)]
struct State {
    store: HashMap<Data, CacheEntry>,
    in_flight: HashMap<Data, InFlight>,
    tracked: HashSet<Data>,
    released: Option<mpsc::UnboundedSender<Data>>,
    clear_epoch: u64,
    stats: NearCacheStats,
}

impl State {
    fn untrack(&mut self, key: &Data) {
        if self.tracked.remove(key) {
            if let Some(released) = &self.released {
                let _ = released.send(key.clone());
            }
        }
    }

    fn untrack_all(&mut self) {
        for key in std::mem::take(&mut self.tracked) {
            if let Some(released) = &self.released {
                let _ = released.send(key);
            }
        }
    }
}

/// A client-side shadow of remote entries.
///
/// Entries are stored in serialized form. Reads go through [`NearCache::get`];
/// misses are filled with [`NearCache::begin_fetch`], which refuses to install
/// a value if the key was invalidated while the remote read was in flight.
///
/// A key can be tracked only while it is stored or being fetched. Whenever a
/// tracked key leaves the cache it is handed to the receiver returned by
/// [`NearCache::released_keys`].
pub struct NearCache {
    config: NearCacheConfig,
    state: Mutex<State>,
}

impl std::fmt::Debug for NearCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NearCache")
            .field("config", &self.config)
            .field("store_size", &state.store.len())
            .field("tracked", &state.tracked.len())
            .field("stats", &state.stats)
            .finish()
    }
}

impl NearCache {
    /// Creates a new near-cache with the given configuration.
    pub fn new(config: NearCacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Returns a clone of the cached value if present and not expired.
    ///
    /// This method updates access statistics and touch time for LRU/LFU tracking.
    pub fn get(&self, key: &Data) -> Option<Data> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let is_expired = match state.store.get(key) {
            Some(entry) => self.is_expired(entry, now),
            None => {
                state.stats.misses += 1;
                return None;
            }
        };

        if is_expired {
            state.store.remove(key);
            state.untrack(key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            return None;
        }

        state.stats.hits += 1;
        let entry = state.store.get_mut(key)?;
        entry.touch(now);
        Some(entry.value.clone())
    }

    /// Starts a read-through for `key`.
    ///
    /// The returned guard installs the fetched value only if no invalidation
    /// for the key (or clear) was observed since this call.
    pub fn begin_fetch(&self, key: &Data) -> FetchGuard<'_> {
        let mut state = self.state.lock();
        let clear_epoch = state.clear_epoch;
        let in_flight = state.in_flight.entry(key.clone()).or_default();
        in_flight.readers += 1;
        FetchGuard {
            cache: self,
            key: key.clone(),
            generation: in_flight.generation,
            clear_epoch,
            done: false,
        }
    }

    /// Drops the entry for `key` because the remote value changed.
    pub fn invalidate(&self, key: &Data) {
        let mut state = self.state.lock();
        if state.store.remove(key).is_some() {
            state.stats.invalidations += 1;
        }
        state.untrack(key);
        if let Some(in_flight) = state.in_flight.get_mut(key) {
            in_flight.generation += 1;
        }
    }

    /// Removes all entries and releases every tracked key.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.store.len() as u64;
        state.store.clear();
        state.untrack_all();
        state.stats.invalidations += dropped;
        state.clear_epoch += 1;
    }

    /// Records that the peer now reports changes to `key`.
    ///
    /// Returns `true` if the key was not tracked before. A key that is neither
    /// stored nor being fetched is not tracked.
    pub fn track(&self, key: &Data) -> bool {
        let mut state = self.state.lock();
        if !state.store.contains_key(key) && !state.in_flight.contains_key(key) {
            return false;
        }
        state.tracked.insert(key.clone())
    }

    /// Returns `true` if the peer reports changes to `key`.
    pub fn is_tracked(&self, key: &Data) -> bool {
        self.state.lock().tracked.contains(key)
    }

    /// Returns the number of keys the peer reports changes for.
    pub fn tracked_count(&self) -> usize {
        self.state.lock().tracked.len()
    }

    /// Returns a receiver for tracked keys as they leave the cache.
    ///
    /// Only the most recent receiver is fed.
    pub(crate) fn released_keys(&self) -> mpsc::UnboundedReceiver<Data> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().released = Some(tx);
        rx
    }

    /// Returns the number of entries in the cache.
    pub fn size(&self) -> usize {
        self.state.lock().store.len()
    }

    /// Returns a copy of the current statistics.
    pub fn stats(&self) -> NearCacheStats {
        self.state.lock().stats.clone()
    }

    /// Returns a reference to the cache configuration.
    pub fn config(&self) -> &NearCacheConfig {
        &self.config
    }

    fn finish_fetch(&self, key: &Data, generation: u64, clear_epoch: u64, value: Option<Data>) {
        let now = Instant::now();
        let mut state = self.state.lock();

        let current = match state.in_flight.get_mut(key) {
            Some(in_flight) => {
                in_flight.readers -= 1;
                let current = in_flight.generation;
                if in_flight.readers == 0 {
                    state.in_flight.remove(key);
                }
                current
            }
            None => return,
        };

        match value {
            Some(value) if current == generation && state.clear_epoch == clear_epoch => {
                self.install(&mut state, key, value, now);
            }
            Some(_) => {
                tracing::debug!("near cache skipped install of a value invalidated in flight");
            }
            None => {}
        }

        if !state.store.contains_key(key) && !state.in_flight.contains_key(key) {
            state.untrack(key);
        }
    }

    fn install(&self, state: &mut State, key: &Data, value: Data, now: Instant) {
        self.remove_expired_entries(state, now);

        if !state.store.contains_key(key)
            && state.store.len() >= self.config.max_size() as usize
            && !self.evict_one(state)
        {
            return;
        }

        state.store.insert(key.clone(), CacheEntry::new(value, now));
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        let ttl = self.config.time_to_live();
        let max_idle = self.config.max_idle();

        // Check TTL (zero = infinite)
        if !ttl.is_zero() && now.duration_since(entry.created_at) > ttl {
            return true;
        }

        // Check max-idle (zero = infinite)
        if !max_idle.is_zero() && now.duration_since(entry.last_accessed) > max_idle {
            return true;
        }

        false
    }

    fn remove_expired_entries(&self, state: &mut State, now: Instant) {
        let expired_keys: Vec<Data> = state
            .store
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in expired_keys {
            state.store.remove(&key);
            state.untrack(&key);
            state.stats.expirations += 1;
        }
    }

    fn evict_one(&self, state: &mut State) -> bool {
        let victim = match self.config.eviction_policy() {
            EvictionPolicy::Lru => state
                .store
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => state
                .store
                .iter()
                .min_by_key(|(_, entry)| entry.access_count)
                .map(|(k, _)| k.clone()),
            // HashMap iteration order is arbitrary, making this effectively random
            EvictionPolicy::Random => state.store.keys().next().cloned(),
            EvictionPolicy::None => None,
        };

        match victim {
            Some(key) => {
                state.store.remove(&key);
                state.untrack(&key);
                state.stats.evictions += 1;
                true
            }
            None => false,
        }
    }
}

/// An in-flight read-through started by [`NearCache::begin_fetch`].
///
/// Dropping the guard without calling [`FetchGuard::complete`] abandons the
/// read-through and installs nothing.
#[derive(Debug)]
pub struct FetchGuard<'a> {
    cache: &'a NearCache,
    key: Data,
    generation: u64,
    clear_epoch: u64,
    done: bool,
}

impl FetchGuard<'_> {
    /// Installs the fetched value unless the key was invalidated meanwhile.
    pub fn complete(mut self, value: Option<Data>) {
        self.done = true;
        self.cache
            .finish_fetch(&self.key, self.generation, self.clear_epoch, value);
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cache
                .finish_fetch(&self.key, self.generation, self.clear_epoch, None);
        }
    }
}
