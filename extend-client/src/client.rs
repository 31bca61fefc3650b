//! Extend client entry point.

use std::collections::HashMap;
use std::sync::Arc;

use extend_core::protocol::Request;
use extend_core::{Deserializable, ExtendError, Result, Serializable};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::connection::{Channel, Connection, ConnectionEvent, TcpTransport, Transport};
use crate::listener::{spawn_dispatcher, EventRegistry, ListenerStats};
use crate::proxy::{CacheShared, NamedCache};

/// The main entry point for talking to a remote cache grid.
///
/// `ExtendClient` owns one connection to a proxy and two channels on it: one
/// for cache operations and one that also carries pushed events. Cache
/// proxies obtained from the client share both.
///
/// # Example
///
/// ```ignore
/// use extend_client::{ClientConfig, ExtendClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::builder()
///         .add_address("127.0.0.1:9099".parse()?)
///         .build()?;
///
///     let client = ExtendClient::connect(config).await?;
///     let cache = client.get_cache::<String, String>("dist-hello").await?;
///
///     cache.put("hello".to_string(), "grid".to_string()).await?;
///     let value = cache.get(&"hello".to_string()).await?;
///
///     client.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ExtendClient {
    config: Arc<ClientConfig>,
    connection: Arc<Connection>,
    channel: Arc<Channel>,
    event_channel: Arc<Channel>,
    registry: Arc<EventRegistry>,
    caches: Mutex<HashMap<String, Arc<CacheShared>>>,
    dispatcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ExtendClient {
    /// Connects to the first reachable proxy address of `config`.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt if no address accepts a
    /// connection within the connection timeout.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let mut last_error = None;
        for &address in config.addresses() {
            match TcpTransport::connect(address, config.connection_timeout()).await {
                Ok(transport) => return Self::with_transport(config, Arc::new(transport)).await,
                Err(e) => {
                    tracing::warn!(%address, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ExtendError::Configuration("no proxy address configured".into())))
    }

    /// Builds a client over an already established transport.
    pub async fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let connection = Connection::open(transport).await?;
        let channel = connection.open_channel()?;
        let (sink, events) = mpsc::unbounded_channel();
        let event_channel = connection.open_event_channel(sink)?;

        let registry = Arc::new(EventRegistry::new());
        let dispatcher = spawn_dispatcher(Arc::clone(&registry), events);

        tracing::info!(
            client = %config.client_name(),
            connection = %connection.id(),
            "connected to cache proxy"
        );

        Ok(Self {
            config: Arc::new(config),
            connection,
            channel,
            event_channel,
            registry,
            caches: Mutex::new(HashMap::new()),
            dispatcher: parking_lot::Mutex::new(Some(dispatcher)),
        })
    }

    /// Returns a proxy for the named cache, creating the cache if needed.
    ///
    /// The first call for a name ensures the cache exists on the peer and
    /// installs the listeners and near cache of the matching
    /// [`CacheConfig`](crate::config::CacheConfig). Later calls share that
    /// state.
    ///
    /// # Type Parameters
    ///
    /// - `K`: The key type, must implement `Serializable`, `Deserializable`, `Send`, and `Sync`
    /// - `V`: The value type, must implement `Serializable`, `Deserializable`, `Send`, and `Sync`
    pub async fn get_cache<K, V>(&self, name: &str) -> Result<NamedCache<K, V>>
    where
        K: Serializable + Deserializable + Send + Sync + 'static,
        V: Serializable + Deserializable + Send + Sync + 'static,
    {
        let mut caches = self.caches.lock().await;
        if let Some(shared) = caches.get(name) {
            return Ok(NamedCache::new(Arc::clone(shared)));
        }

        let shared = CacheShared::open(
            name.to_string(),
            Arc::clone(&self.channel),
            Arc::clone(&self.event_channel),
            Arc::clone(&self.registry),
            self.config.find_cache_config(name),
            self.config.request_timeout(),
        )
        .await?;
        caches.insert(name.to_string(), Arc::clone(&shared));
        Ok(NamedCache::new(shared))
    }

    /// Destroys the named cache on the peer.
    ///
    /// Local listener registrations and near-cache entries for the cache are
    /// dropped. Proxies obtained earlier must not be used afterwards.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn destroy_cache(&self, name: &str) -> Result<()> {
        self.caches.lock().await.remove(name);
        self.registry.forget_cache(name);

        let request = Request::DestroyCache {
            cache: name.to_string(),
        };
        let pending = self.channel.send(&request).await?;
        self.channel
            .await_response(pending, self.config.request_timeout())
            .await?
            .into_result()?
            .into_unit()
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the connection this client talks over.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Subscribes to connection lifecycle events.
    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }

    /// Returns the event pipeline statistics.
    pub fn listener_stats(&self) -> &ListenerStats {
        self.registry.stats()
    }

    /// Closes both channels and the connection.
    ///
    /// Outstanding operations fail with `ConnectionLost`. Listeners receive
    /// their disconnection callback before this returns.
    pub async fn shutdown(&self) {
        tracing::info!(
            client = %self.config.client_name(),
            "shutting down extend client"
        );
        self.connection.close_channel(self.channel.id());
        self.connection.close_channel(self.event_channel.id());
        self.connection.close().await;

        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                tracing::warn!(error = %e, "event dispatcher ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for ExtendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendClient")
            .field("client_name", &self.config.client_name())
            .field("connection", &self.connection.id())
            .field("channel", &self.channel.id())
            .field("event_channel", &self.event_channel.id())
            .finish()
    }
}
