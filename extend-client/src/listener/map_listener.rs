//! Map listener trait for named caches.

use std::marker::PhantomData;
use std::sync::Arc;

use extend_core::protocol::{MapEvent, MapEventKind};
use extend_core::{Data, Deserializable, Result};

/// An entry change delivered to a [`MapListener`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntryEvent<K, V> {
    /// Name of the cache that changed.
    pub cache_name: String,
    /// What happened to the entry.
    pub kind: MapEventKind,
    /// The affected key.
    pub key: K,
    /// Value before the change, absent for inserts.
    pub old_value: Option<V>,
    /// Value after the change, absent for deletes.
    pub new_value: Option<V>,
}

impl<K, V> MapEntryEvent<K, V> {
    /// Creates a new entry event.
    pub fn new(
        cache_name: impl Into<String>,
        kind: MapEventKind,
        key: K,
        old_value: Option<V>,
        new_value: Option<V>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            kind,
            key,
            old_value,
            new_value,
        }
    }
}

impl MapEntryEvent<Data, Data> {
    pub(crate) fn from_wire(event: MapEvent) -> Self {
        Self::new(
            event.cache_name,
            event.kind,
            event.key,
            event.old_value,
            event.new_value,
        )
    }

    /// Decodes the key and values.
    pub fn decode<K, V>(&self) -> Result<MapEntryEvent<K, V>>
    where
        K: Deserializable,
        V: Deserializable,
    {
        Ok(MapEntryEvent {
            cache_name: self.cache_name.clone(),
            kind: self.kind,
            key: self.key.decode()?,
            old_value: self.old_value.as_ref().map(Data::decode).transpose()?,
            new_value: self.new_value.as_ref().map(Data::decode).transpose()?,
        })
    }
}

/// A listener for changes to a named cache.
///
/// Implement this trait to receive notifications when entries are inserted,
/// updated or deleted, when the cache is truncated, and when the connection
/// carrying the events is lost. Every method defaults to doing nothing.
///
/// Callbacks run on the client's event task in the order the server emitted
/// the events; a slow callback delays every later event.
///
/// # Example
///
/// ```ignore
/// struct Audit;
///
/// impl MapListener<String, String> for Audit {
///     fn entry_updated(&self, event: MapEntryEvent<String, String>) {
///         println!("{}: {:?} -> {:?}", event.key, event.old_value, event.new_value);
///     }
/// }
/// ```
pub trait MapListener<K, V>: Send + Sync {
    /// Called when a key is mapped for the first time.
    fn entry_inserted(&self, event: MapEntryEvent<K, V>) {
        let _ = event;
    }

    /// Called when the value of a mapped key changes.
    fn entry_updated(&self, event: MapEntryEvent<K, V>) {
        let _ = event;
    }

    /// Called when a key is removed.
    fn entry_deleted(&self, event: MapEntryEvent<K, V>) {
        let _ = event;
    }

    /// Called when the cache is truncated. The registration stays active.
    fn cache_truncated(&self, cache_name: &str) {
        let _ = cache_name;
    }

    /// Called when the connection delivering events for the cache is lost.
    fn disconnected(&self, cache_name: &str) {
        let _ = cache_name;
    }
}

/// A shared map listener for type-erased storage.
pub type BoxedMapListener<K, V> = Arc<dyn MapListener<K, V>>;

/// Dispatches an entry event to the matching method on a map listener.
pub fn dispatch_map_event<K, V>(listener: &dyn MapListener<K, V>, event: MapEntryEvent<K, V>) {
    match event.kind {
        MapEventKind::Inserted => listener.entry_inserted(event),
        MapEventKind::Updated => listener.entry_updated(event),
        MapEventKind::Deleted => listener.entry_deleted(event),
    }
}

/// Adapts a typed listener to the serialized form the event task delivers.
///
/// Events whose key or values fail to decode are logged and skipped.
pub struct TypedMapListener<K, V> {
    inner: BoxedMapListener<K, V>,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> TypedMapListener<K, V> {
    /// Wraps a typed listener.
    pub fn new(inner: BoxedMapListener<K, V>) -> Self {
        Self {
            inner,
            _types: PhantomData,
        }
    }
}

impl<K, V> MapListener<Data, Data> for TypedMapListener<K, V>
where
    K: Deserializable + Send + Sync + 'static,
    V: Deserializable + Send + Sync + 'static,
{
    fn entry_inserted(&self, event: MapEntryEvent<Data, Data>) {
        self.forward(event);
    }

    fn entry_updated(&self, event: MapEntryEvent<Data, Data>) {
        self.forward(event);
    }

    fn entry_deleted(&self, event: MapEntryEvent<Data, Data>) {
        self.forward(event);
    }

    fn cache_truncated(&self, cache_name: &str) {
        self.inner.cache_truncated(cache_name);
    }

    fn disconnected(&self, cache_name: &str) {
        self.inner.disconnected(cache_name);
    }
}

impl<K, V> TypedMapListener<K, V>
where
    K: Deserializable,
    V: Deserializable,
{
    fn forward(&self, event: MapEntryEvent<Data, Data>) {
        match event.decode::<K, V>() {
            Ok(typed) => dispatch_map_event(self.inner.as_ref(), typed),
            Err(e) => tracing::warn!(
                cache = %event.cache_name,
                error = %e,
                "dropping event that failed to decode"
            ),
        }
    }
}

impl<K, V> std::fmt::Debug for TypedMapListener<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedMapListener").finish()
    }
}

type EntryCallback<K, V> = Box<dyn Fn(MapEntryEvent<K, V>) + Send + Sync>;
type CacheCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A map listener implementation using closures.
///
/// Use [`FnMapListener::builder`] to create a new instance.
pub struct FnMapListener<K, V> {
    on_inserted: Option<EntryCallback<K, V>>,
    on_updated: Option<EntryCallback<K, V>>,
    on_deleted: Option<EntryCallback<K, V>>,
    on_truncated: Option<CacheCallback>,
    on_disconnected: Option<CacheCallback>,
}

impl<K, V> FnMapListener<K, V> {
    /// Creates a new builder for constructing an `FnMapListener`.
    pub fn builder() -> FnMapListenerBuilder<K, V> {
        FnMapListenerBuilder::new()
    }
}

impl<K, V> MapListener<K, V> for FnMapListener<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn entry_inserted(&self, event: MapEntryEvent<K, V>) {
        if let Some(ref f) = self.on_inserted {
            f(event);
        }
    }

    fn entry_updated(&self, event: MapEntryEvent<K, V>) {
        if let Some(ref f) = self.on_updated {
            f(event);
        }
    }

    fn entry_deleted(&self, event: MapEntryEvent<K, V>) {
        if let Some(ref f) = self.on_deleted {
            f(event);
        }
    }

    fn cache_truncated(&self, cache_name: &str) {
        if let Some(ref f) = self.on_truncated {
            f(cache_name);
        }
    }

    fn disconnected(&self, cache_name: &str) {
        if let Some(ref f) = self.on_disconnected {
            f(cache_name);
        }
    }
}

impl<K, V> std::fmt::Debug for FnMapListener<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMapListener")
            .field("on_inserted", &self.on_inserted.is_some())
            .field("on_updated", &self.on_updated.is_some())
            .field("on_deleted", &self.on_deleted.is_some())
            .field("on_truncated", &self.on_truncated.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .finish()
    }
}

/// Builder for creating [`FnMapListener`] instances.
pub struct FnMapListenerBuilder<K, V> {
    on_inserted: Option<EntryCallback<K, V>>,
    on_updated: Option<EntryCallback<K, V>>,
    on_deleted: Option<EntryCallback<K, V>>,
    on_truncated: Option<CacheCallback>,
    on_disconnected: Option<CacheCallback>,
}

impl<K, V> FnMapListenerBuilder<K, V> {
    fn new() -> Self {
        Self {
            on_inserted: None,
            on_updated: None,
            on_deleted: None,
            on_truncated: None,
            on_disconnected: None,
        }
    }

    /// Sets the handler for insert events.
    pub fn on_inserted<F>(mut self, f: F) -> Self
    where
        F: Fn(MapEntryEvent<K, V>) + Send + Sync + 'static,
    {
        self.on_inserted = Some(Box::new(f));
        self
    }

    /// Sets the handler for update events.
    pub fn on_updated<F>(mut self, f: F) -> Self
    where
        F: Fn(MapEntryEvent<K, V>) + Send + Sync + 'static,
    {
        self.on_updated = Some(Box::new(f));
        self
    }

    /// Sets the handler for delete events.
    pub fn on_deleted<F>(mut self, f: F) -> Self
    where
        F: Fn(MapEntryEvent<K, V>) + Send + Sync + 'static,
    {
        self.on_deleted = Some(Box::new(f));
        self
    }

    /// Sets the handler for truncation notifications.
    pub fn on_truncated<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_truncated = Some(Box::new(f));
        self
    }

    /// Sets the handler for connection loss.
    pub fn on_disconnected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_disconnected = Some(Box::new(f));
        self
    }

    /// Builds the [`FnMapListener`].
    pub fn build(self) -> FnMapListener<K, V> {
        FnMapListener {
            on_inserted: self.on_inserted,
            on_updated: self.on_updated,
            on_deleted: self.on_deleted,
            on_truncated: self.on_truncated,
            on_disconnected: self.on_disconnected,
        }
    }
}

impl<K, V> Default for FnMapListenerBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for FnMapListenerBuilder<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMapListenerBuilder").finish()
    }
}
