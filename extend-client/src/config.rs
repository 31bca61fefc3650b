//! Client configuration types and builders.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use extend_core::{Data, Deserializable};

use crate::cache::NearCacheConfig;
use crate::listener::{MapListener, TypedMapListener};

/// Default proxy address.
const DEFAULT_ADDRESS: ([u8; 4], u16) = ([127, 0, 0, 1], 9099);
/// Default connection timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default time a cache operation waits for its response.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for extend_core::ExtendError {
    fn from(err: ConfigError) -> Self {
        extend_core::ExtendError::Configuration(err.message)
    }
}

/// Static configuration applied to every cache whose name matches a pattern.
#[derive(Clone)]
pub struct CacheConfig {
    name: String,
    listeners: Vec<Arc<dyn MapListener<Data, Data>>>,
    near_cache: Option<NearCacheConfig>,
}

impl CacheConfig {
    /// Creates a new cache configuration builder for a name pattern.
    pub fn builder(name: impl Into<String>) -> CacheConfigBuilder {
        CacheConfigBuilder::new(name)
    }

    /// Returns the name pattern.
    ///
    /// The name can be an exact cache name or a wildcard pattern (e.g., "dist-*").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the listeners installed when a matching cache is created.
    pub fn listeners(&self) -> &[Arc<dyn MapListener<Data, Data>>] {
        &self.listeners
    }

    /// Returns the near-cache configuration, if any.
    pub fn near_cache(&self) -> Option<&NearCacheConfig> {
        self.near_cache.as_ref()
    }

    /// Checks if this configuration matches the given cache name.
    ///
    /// Supports exact matches and simple wildcard patterns with `*` at the end.
    pub fn matches(&self, cache_name: &str) -> bool {
        match self.name.strip_suffix('*') {
            Some(prefix) => cache_name.starts_with(prefix),
            None => self.name == cache_name,
        }
    }
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("name", &self.name)
            .field("listeners", &self.listeners.len())
            .field("near_cache", &self.near_cache)
            .finish()
    }
}

/// Builder for `CacheConfig`.
#[derive(Clone)]
pub struct CacheConfigBuilder {
    name: String,
    listeners: Vec<Arc<dyn MapListener<Data, Data>>>,
    near_cache: Option<NearCacheConfig>,
}

impl CacheConfigBuilder {
    /// Creates a new cache configuration builder with the given name pattern.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: Vec::new(),
            near_cache: None,
        }
    }

    /// Adds a listener that receives raw serialized keys and values.
    pub fn add_listener(mut self, listener: Arc<dyn MapListener<Data, Data>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Adds a listener that receives decoded keys and values.
    pub fn add_typed_listener<K, V, L>(mut self, listener: L) -> Self
    where
        K: Deserializable + Send + Sync + 'static,
        V: Deserializable + Send + Sync + 'static,
        L: MapListener<K, V> + 'static,
    {
        self.listeners
            .push(Arc::new(TypedMapListener::new(Arc::new(listener))));
        self
    }

    /// Puts a near cache in front of matching caches.
    pub fn near_cache(mut self, config: NearCacheConfig) -> Self {
        self.near_cache = Some(config);
        self
    }

    /// Builds the cache configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the name is empty or has `*` anywhere but the end.
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::new("cache name must not be empty"));
        }
        if self.name.trim_end_matches('*').contains('*') || self.name.ends_with("**") {
            return Err(ConfigError::new(
                "cache name pattern may only end with a single '*'",
            ));
        }

        Ok(CacheConfig {
            name: self.name,
            listeners: self.listeners,
            near_cache: self.near_cache,
        })
    }
}

impl std::fmt::Debug for CacheConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfigBuilder")
            .field("name", &self.name)
            .finish()
    }
}

/// Client configuration.
///
/// Read-only once built; caches consume it at creation time.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    client_name: String,
    addresses: Vec<SocketAddr>,
    connection_timeout: Duration,
    request_timeout: Duration,
    cache_configs: Vec<CacheConfig>,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the client name used in diagnostics.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Returns the proxy addresses, tried in order.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Returns the connection timeout duration.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns how long a cache operation waits for its response.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the cache configurations.
    pub fn cache_configs(&self) -> &[CacheConfig] {
        &self.cache_configs
    }

    /// Finds the first cache configuration matching the given cache name.
    pub fn find_cache_config(&self, cache_name: &str) -> Option<&CacheConfig> {
        self.cache_configs.iter().find(|c| c.matches(cache_name))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            addresses: vec![SocketAddr::from(DEFAULT_ADDRESS)],
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cache_configs: Vec::new(),
        }
    }
}

fn default_client_name() -> String {
    format!("extend-client-{}", extend_core::process::current_pid())
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    client_name: Option<String>,
    addresses: Vec<SocketAddr>,
    connection_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    cache_configs: Vec<CacheConfig>,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client name.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Adds a proxy address.
    pub fn add_address(mut self, address: SocketAddr) -> Self {
        self.addresses.push(address);
        self
    }

    /// Sets the proxy addresses, replacing any previously added.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets how long a cache operation waits for its response.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Adds a cache configuration. Earlier configurations win on overlap.
    pub fn add_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_configs.push(config);
        self
    }

    /// Builds the client configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the client name is empty or a timeout is zero.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let client_name = self.client_name.unwrap_or_else(default_client_name);
        if client_name.is_empty() {
            return Err(ConfigError::new("client name must not be empty"));
        }

        let connection_timeout = self
            .connection_timeout
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT);
        if connection_timeout.is_zero() {
            return Err(ConfigError::new(
                "connection_timeout must be greater than zero",
            ));
        }

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(ConfigError::new("request_timeout must be greater than zero"));
        }

        let addresses = if self.addresses.is_empty() {
            vec![SocketAddr::from(DEFAULT_ADDRESS)]
        } else {
            self.addresses
        };

        Ok(ClientConfig {
            client_name,
            addresses,
            connection_timeout,
            request_timeout,
            cache_configs: self.cache_configs,
        })
    }
}
