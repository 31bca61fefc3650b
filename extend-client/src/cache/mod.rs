//! Near-cache configuration and implementation for client-side caching.

mod near_cache;

pub use near_cache::{FetchGuard, NearCache, NearCacheStats};

use std::time::Duration;

use crate::config::ConfigError;

/// Default time-to-live for near-cache entries (0 = infinite).
const DEFAULT_TTL: Duration = Duration::ZERO;
/// Default max idle time for near-cache entries (0 = infinite).
const DEFAULT_MAX_IDLE: Duration = Duration::ZERO;
/// Default maximum size of the near-cache.
const DEFAULT_MAX_SIZE: u32 = 10_000;

/// Eviction policy for near-cache when max size is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Least Recently Used - evicts entries that haven't been accessed recently.
    #[default]
    Lru,
    /// Least Frequently Used - evicts entries with the lowest access count.
    Lfu,
    /// Random - evicts entries randomly.
    Random,
    /// None - no eviction; new entries are rejected when cache is full.
    None,
}

/// How a near cache keeps its entries consistent with the remote cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationStrategy {
    /// No events; entries live until they expire or are evicted.
    None,
    /// Track only the keys held locally, using priming gets.
    Present,
    /// Listen to every change in the cache.
    All,
    /// Let the client choose; currently the same as [`InvalidationStrategy::Present`].
    #[default]
    Auto,
}

impl InvalidationStrategy {
    /// Resolves [`InvalidationStrategy::Auto`] to a concrete strategy.
    pub fn resolve(self) -> Self {
        match self {
            InvalidationStrategy::Auto => InvalidationStrategy::Present,
            other => other,
        }
    }
}

/// Configuration for the near cache in front of a remote cache.
///
/// Near caches keep read results locally to avoid round-trips on repeated
/// reads.
#[derive(Debug, Clone)]
pub struct NearCacheConfig {
    time_to_live: Duration,
    max_idle: Duration,
    max_size: u32,
    eviction_policy: EvictionPolicy,
    invalidation_strategy: InvalidationStrategy,
}

impl NearCacheConfig {
    /// Creates a new near-cache configuration builder.
    pub fn builder() -> NearCacheConfigBuilder {
        NearCacheConfigBuilder::new()
    }

    /// Returns the time-to-live duration for cached entries.
    ///
    /// A value of `Duration::ZERO` means entries never expire based on time.
    pub fn time_to_live(&self) -> Duration {
        self.time_to_live
    }

    /// Returns the maximum idle time for cached entries.
    ///
    /// A value of `Duration::ZERO` means entries never expire based on idle time.
    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    /// Returns the maximum number of entries in the near-cache.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Returns the eviction policy used when the cache is full.
    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.eviction_policy
    }

    /// Returns the configured invalidation strategy, `Auto` already resolved.
    pub fn invalidation_strategy(&self) -> InvalidationStrategy {
        self.invalidation_strategy.resolve()
    }
}

impl Default for NearCacheConfig {
    fn default() -> Self {
        Self {
            time_to_live: DEFAULT_TTL,
            max_idle: DEFAULT_MAX_IDLE,
            max_size: DEFAULT_MAX_SIZE,
            eviction_policy: EvictionPolicy::default(),
            invalidation_strategy: InvalidationStrategy::default(),
        }
    }
}

/// Builder for `NearCacheConfig`.
#[derive(Debug, Clone, Default)]
pub struct NearCacheConfigBuilder {
    time_to_live: Option<Duration>,
    max_idle: Option<Duration>,
    max_size: Option<u32>,
    eviction_policy: Option<EvictionPolicy>,
    invalidation_strategy: Option<InvalidationStrategy>,
}

impl NearCacheConfigBuilder {
    /// Creates a new near-cache configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time-to-live duration for cached entries.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Sets the maximum idle time for cached entries.
    pub fn max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Sets the maximum number of entries in the near-cache.
    pub fn max_size(mut self, max_size: u32) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Sets the eviction policy.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Sets how the near cache learns about remote changes.
    pub fn invalidation_strategy(mut self, strategy: InvalidationStrategy) -> Self {
        self.invalidation_strategy = Some(strategy);
        self
    }

    /// Builds the near-cache configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `max_size` is zero.
    pub fn build(self) -> Result<NearCacheConfig, ConfigError> {
        let max_size = self.max_size.unwrap_or(DEFAULT_MAX_SIZE);
        if max_size == 0 {
            return Err(ConfigError::new("near-cache max_size must be greater than zero"));
        }

        Ok(NearCacheConfig {
            time_to_live: self.time_to_live.unwrap_or(DEFAULT_TTL),
            max_idle: self.max_idle.unwrap_or(DEFAULT_MAX_IDLE),
            max_size,
            eviction_policy: self.eviction_policy.unwrap_or_default(),
            invalidation_strategy: self.invalidation_strategy.unwrap_or_default(),
        })
    }
}
