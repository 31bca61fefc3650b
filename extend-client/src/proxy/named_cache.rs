//! Named cache proxy implementation.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;

use extend_core::protocol::{Request, ResponseBody};
use extend_core::{Data, Deserializable, Result, Serializable};
use tokio::sync::{mpsc, RwLock};

use super::EntryProcessor;
use crate::cache::{InvalidationStrategy, NearCache, NearCacheStats};
use crate::config::CacheConfig;
use crate::connection::Channel;
use crate::listener::{
    BoxedMapListener, EventRegistry, Interest, ListenerId, ListenerStats, MapListener,
    TypedMapListener,
};
use crate::query::Aggregator;

/// State shared by every typed view of one cache.
pub(crate) struct CacheShared {
    name: String,
    channel: Arc<Channel>,
    event_channel: Arc<Channel>,
    registry: Arc<EventRegistry>,
    near_cache: Option<Arc<NearCache>>,
    request_timeout: Duration,
    /// Held shared by priming gets and exclusively while key interest is
    /// withdrawn, so a withdrawal never overtakes a newer priming get.
    interest_lock: RwLock<()>,
}

impl CacheShared {
    /// Makes sure the cache exists on the peer and installs its configuration.
    pub(crate) async fn open(
        name: String,
        channel: Arc<Channel>,
        event_channel: Arc<Channel>,
        registry: Arc<EventRegistry>,
        config: Option<&CacheConfig>,
        request_timeout: Duration,
    ) -> Result<Arc<Self>> {
        let near_cache = config
            .and_then(CacheConfig::near_cache)
            .map(|near| Arc::new(NearCache::new(near.clone())));

        let shared = Arc::new(Self {
            name,
            channel,
            event_channel,
            registry,
            near_cache,
            request_timeout,
            interest_lock: RwLock::new(()),
        });

        shared
            .call(
                &shared.channel,
                Request::EnsureCache {
                    cache: shared.name.clone(),
                },
            )
            .await?
            .into_unit()?;

        if let Some(near_cache) = &shared.near_cache {
            shared
                .registry
                .attach_near_cache(&shared.name, Arc::clone(near_cache));
            match near_cache.config().invalidation_strategy() {
                InvalidationStrategy::All => {
                    if shared.registry.acquire_interest(&shared.name, None) {
                        if let Err(e) = shared.register_interest(None).await {
                            shared.registry.release_interest(&shared.name, &None);
                            return Err(e);
                        }
                    }
                }
                InvalidationStrategy::Present => {
                    tokio::spawn(withdraw_released_keys(
                        Arc::downgrade(&shared),
                        near_cache.released_keys(),
                    ));
                }
                _ => {}
            }
        }

        if let Some(config) = config {
            for listener in config.listeners() {
                shared.add_listener(None, Arc::clone(listener)).await?;
            }
        }

        tracing::debug!(
            cache = %shared.name,
            near_cache = shared.near_cache.is_some(),
            "cache ready"
        );
        Ok(shared)
    }

    async fn call(&self, channel: &Arc<Channel>, request: Request) -> Result<ResponseBody> {
        let pending = channel.send(&request).await?;
        channel
            .await_response(pending, self.request_timeout)
            .await?
            .into_result()
    }

    async fn get(&self, key: Data) -> Result<Option<Data>> {
        let Some(near_cache) = &self.near_cache else {
            return self.remote_get(key).await;
        };

        if let Some(value) = near_cache.get(&key) {
            return Ok(Some(value));
        }

        let fetch = near_cache.begin_fetch(&key);
        let value = if near_cache.config().invalidation_strategy() == InvalidationStrategy::Present
            && !near_cache.is_tracked(&key)
        {
            let _interest = self.interest_lock.read().await;
            let value = self.priming_get(key.clone()).await?;
            self.registry.track_primed_key(&self.name, near_cache, &key);
            value
        } else {
            self.remote_get(key).await?
        };
        fetch.complete(value.clone());
        Ok(value)
    }

    async fn remote_get(&self, key: Data) -> Result<Option<Data>> {
        let request = Request::Get {
            cache: self.name.clone(),
            key,
            priming: None,
        };
        self.call(&self.channel, request).await?.into_value()
    }

    /// A get that also asks the peer to report changes to the key.
    ///
    /// Sent on the event channel so the tracking binds to it.
    async fn priming_get(&self, key: Data) -> Result<Option<Data>> {
        let marker = self.registry.begin_priming();
        let request = Request::Get {
            cache: self.name.clone(),
            key,
            priming: Some(marker),
        };
        let result = self.call(&self.event_channel, request).await;
        match &result {
            Ok(_) => self.registry.finish_priming(marker),
            Err(_) => self.registry.abandon_priming(marker),
        }
        result?.into_value()
    }

    /// Tells the peer to stop reporting changes to a key the near cache dropped.
    async fn withdraw_key_interest(&self, key: Data) {
        let _interest = self.interest_lock.write().await;
        let interest = Some(key);
        if !self.registry.release_interest(&self.name, &interest) {
            return;
        }
        let request = Request::RemoveListener {
            cache: self.name.clone(),
            key: interest,
        };
        let result = match self.call(&self.event_channel, request).await {
            Ok(body) => body.into_unit(),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::debug!(cache = %self.name, error = %e, "key interest not withdrawn");
        }
    }

    async fn mutate(&self, key: &Data, request: Request) -> Result<ResponseBody> {
        if let Some(near_cache) = &self.near_cache {
            near_cache.invalidate(key);
        }
        let result = self.call(&self.channel, request).await;
        if let Some(near_cache) = &self.near_cache {
            near_cache.invalidate(key);
        }
        result
    }

    async fn add_listener(
        &self,
        key: Interest,
        listener: BoxedMapListener<Data, Data>,
    ) -> Result<ListenerId> {
        let (id, first) = self.registry.subscribe(&self.name, key.clone(), listener);
        if first {
            if let Err(e) = self.register_interest(key).await {
                self.registry.unsubscribe(&self.name, id);
                return Err(e);
            }
        }
        Ok(id)
    }

    async fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        let Some((key, last)) = self.registry.unsubscribe(&self.name, id) else {
            return Ok(false);
        };
        if last {
            let request = Request::RemoveListener {
                cache: self.name.clone(),
                key,
            };
            self.call(&self.event_channel, request).await?.into_unit()?;
        }
        Ok(true)
    }

    async fn register_interest(&self, key: Interest) -> Result<()> {
        let request = Request::AddListener {
            cache: self.name.clone(),
            key,
        };
        self.call(&self.event_channel, request).await?.into_unit()
    }
}

/// Withdraws key interest for tracked keys as the near cache drops them.
async fn withdraw_released_keys(
    shared: Weak<CacheShared>,
    mut released: mpsc::UnboundedReceiver<Data>,
) {
    while let Some(key) = released.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.withdraw_key_interest(key).await;
    }
}

impl std::fmt::Debug for CacheShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheShared")
            .field("name", &self.name)
            .field("channel", &self.channel.id())
            .field("event_channel", &self.event_channel.id())
            .field("near_cache", &self.near_cache)
            .finish()
    }
}

/// A proxy for a named cache on the remote grid.
///
/// `NamedCache` offers async Map-shaped operations. Every operation is sent
/// as one request and waits at most the configured request timeout for its
/// response. The proxy holds no per-call state and is cheap to clone.
#[derive(Debug)]
pub struct NamedCache<K, V> {
    shared: Arc<CacheShared>,
    _phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V> NamedCache<K, V> {
    pub(crate) fn new(shared: Arc<CacheShared>) -> Self {
        Self {
            shared,
            _phantom: PhantomData,
        }
    }

    /// Returns the name of this cache.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns statistics of the near cache, if one is configured.
    pub fn near_cache_stats(&self) -> Option<NearCacheStats> {
        self.shared.near_cache.as_ref().map(|near| near.stats())
    }

    /// Returns the event pipeline statistics of the owning client.
    pub fn listener_stats(&self) -> &ListenerStats {
        self.shared.registry.stats()
    }
}

impl<K, V> Clone for NamedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _phantom: PhantomData,
        }
    }
}

impl<K, V> NamedCache<K, V>
where
    K: Serializable + Deserializable + Send + Sync + 'static,
    V: Serializable + Deserializable + Send + Sync + 'static,
{
    /// Retrieves the value associated with the given key.
    ///
    /// With a near cache, a local hit is served without a round-trip.
    #[tracing::instrument(skip(self, key), fields(cache = %self.shared.name), level = "debug")]
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        let key = Data::of(key)?;
        decode_opt(self.shared.get(key).await?)
    }

    /// Associates the specified value with the specified key.
    ///
    /// Returns the previous value associated with the key, or `None` if there was no mapping.
    #[tracing::instrument(skip(self, key, value), fields(cache = %self.shared.name), level = "debug")]
    pub async fn put(&self, key: K, value: V) -> Result<Option<V>> {
        let key = Data::of(&key)?;
        let request = Request::Put {
            cache: self.shared.name.clone(),
            key: key.clone(),
            value: Data::of(&value)?,
        };
        decode_opt(self.shared.mutate(&key, request).await?.into_value()?)
    }

    /// Removes the mapping for a key from this cache if it is present.
    ///
    /// Returns the previous value associated with the key, or `None` if there was no mapping.
    #[tracing::instrument(skip(self, key), fields(cache = %self.shared.name), level = "debug")]
    pub async fn remove(&self, key: &K) -> Result<Option<V>> {
        let key = Data::of(key)?;
        let request = Request::Remove {
            cache: self.shared.name.clone(),
            key: key.clone(),
        };
        decode_opt(self.shared.mutate(&key, request).await?.into_value()?)
    }

    /// Returns `true` if this cache contains a mapping for the specified key.
    #[tracing::instrument(skip(self, key), fields(cache = %self.shared.name), level = "debug")]
    pub async fn contains_key(&self, key: &K) -> Result<bool> {
        let request = Request::ContainsKey {
            cache: self.shared.name.clone(),
            key: Data::of(key)?,
        };
        self.shared
            .call(&self.shared.channel, request)
            .await?
            .into_bool()
    }

    /// Returns the number of mappings in this cache.
    #[tracing::instrument(skip(self), fields(cache = %self.shared.name), level = "debug")]
    pub async fn size(&self) -> Result<usize> {
        let request = Request::Size {
            cache: self.shared.name.clone(),
        };
        let size = self
            .shared
            .call(&self.shared.channel, request)
            .await?
            .into_int()?;
        Ok(size.max(0) as usize)
    }

    /// Removes all entries, reporting a delete event for each.
    #[tracing::instrument(skip(self), fields(cache = %self.shared.name), level = "debug")]
    pub async fn clear(&self) -> Result<()> {
        let request = Request::Clear {
            cache: self.shared.name.clone(),
        };
        let result = self.shared.call(&self.shared.channel, request).await;
        self.clear_near_cache();
        result?.into_unit()
    }

    /// Removes all entries without per-entry events.
    ///
    /// Listener registrations stay active and see later changes.
    #[tracing::instrument(skip(self), fields(cache = %self.shared.name), level = "debug")]
    pub async fn truncate(&self) -> Result<()> {
        let request = Request::Truncate {
            cache: self.shared.name.clone(),
        };
        let result = self.shared.call(&self.shared.channel, request).await;
        self.clear_near_cache();
        result?.into_unit()
    }

    /// Runs `processor` against the entry for `key` on the peer.
    #[tracing::instrument(skip(self, key, processor), fields(cache = %self.shared.name), level = "debug")]
    pub async fn invoke<P>(&self, key: &K, processor: &P) -> Result<Option<P::Output>>
    where
        P: EntryProcessor,
    {
        let key = Data::of(key)?;
        let request = Request::Invoke {
            cache: self.shared.name.clone(),
            key: key.clone(),
            processor: Data::of(processor)?,
        };
        decode_opt(self.shared.mutate(&key, request).await?.into_value()?)
    }

    /// Aggregates every entry of this cache on the peer.
    #[tracing::instrument(skip(self, aggregator), fields(cache = %self.shared.name), level = "debug")]
    pub async fn aggregate<A>(&self, aggregator: &A) -> Result<A::Output>
    where
        A: Aggregator,
    {
        let request = Request::Aggregate {
            cache: self.shared.name.clone(),
            aggregator: aggregator.spec(),
        };
        let result = self
            .shared
            .call(&self.shared.channel, request)
            .await?
            .into_aggregate()?;
        aggregator.extract(result)
    }

    /// Registers a listener for every change in this cache.
    #[tracing::instrument(skip(self, listener), fields(cache = %self.shared.name), level = "debug")]
    pub async fn add_map_listener<L>(&self, listener: L) -> Result<ListenerId>
    where
        L: MapListener<K, V> + 'static,
    {
        let typed = TypedMapListener::new(Arc::new(listener));
        self.shared.add_listener(None, Arc::new(typed)).await
    }

    /// Registers a listener for changes to one key.
    #[tracing::instrument(skip(self, key, listener), fields(cache = %self.shared.name), level = "debug")]
    pub async fn add_key_listener<L>(&self, key: &K, listener: L) -> Result<ListenerId>
    where
        L: MapListener<K, V> + 'static,
    {
        let key = Data::of(key)?;
        let typed = TypedMapListener::new(Arc::new(listener));
        self.shared.add_listener(Some(key), Arc::new(typed)).await
    }

    /// Removes a listener. Returns `false` if it was not registered.
    #[tracing::instrument(skip(self), fields(cache = %self.shared.name), level = "debug")]
    pub async fn remove_map_listener(&self, id: ListenerId) -> Result<bool> {
        self.shared.remove_listener(id).await
    }

    fn clear_near_cache(&self) {
        if let Some(near_cache) = &self.shared.near_cache {
            near_cache.clear();
        }
    }
}

fn decode_opt<T: Deserializable>(data: Option<Data>) -> Result<Option<T>> {
    data.as_ref().map(Data::decode).transpose()
}
