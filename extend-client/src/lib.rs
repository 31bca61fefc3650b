//! Async Rust client for remote partitioned caches over the Extend protocol.
//!
//! The client talks to a cache proxy over one multiplexed connection. Each
//! cache operation is a request correlated with exactly one response, and
//! every wait is bounded by the configured request timeout. Changes made on
//! the grid are pushed back as events, feeding both application listeners
//! and an optional near cache.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use extend_client::{ClientConfig, ExtendClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .add_address("127.0.0.1:9099".parse()?)
//!         .build()?;
//!     let client = ExtendClient::connect(config).await?;
//!
//!     let cache = client.get_cache::<String, String>("dist-hello").await?;
//!     cache.put("hello".into(), "grid".into()).await?;
//!     let value = cache.get(&"hello".into()).await?;
//!     println!("{:?}", value); // Some("grid")
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Listeners
//!
//! ```rust,ignore
//! use extend_client::listener::{FnMapListener, MapEntryEvent};
//!
//! let id = cache
//!     .add_map_listener(
//!         FnMapListener::builder()
//!             .on_inserted(|e: MapEntryEvent<String, String>| println!("inserted {}", e.key))
//!             .build(),
//!     )
//!     .await?;
//! cache.remove_map_listener(id).await?;
//! ```
//!
//! # Near Cache
//!
//! ```rust,ignore
//! use extend_client::{CacheConfig, ClientConfig, InvalidationStrategy, NearCacheConfig};
//!
//! let config = ClientConfig::builder()
//!     .add_cache_config(
//!         CacheConfig::builder("dist-*")
//!             .near_cache(
//!                 NearCacheConfig::builder()
//!                     .max_size(1_000)
//!                     .invalidation_strategy(InvalidationStrategy::Present)
//!                     .build()?,
//!             )
//!             .build()?,
//!     )
//!     .build()?;
//! ```
//!
//! # Aggregation
//!
//! ```rust,ignore
//! use extend_client::query::Aggregators;
//!
//! let smallest: Option<i64> = cache.aggregate(&Aggregators::long_min()).await?;
//! ```

#![warn(missing_docs)]

pub mod cache;
mod client;
pub mod config;
pub mod connection;
pub mod listener;
pub mod proxy;
pub mod query;

pub use cache::{
    EvictionPolicy, InvalidationStrategy, NearCache, NearCacheConfig, NearCacheConfigBuilder,
    NearCacheStats,
};
pub use client::ExtendClient;
pub use config::{CacheConfig, CacheConfigBuilder, ClientConfig, ClientConfigBuilder, ConfigError};
pub use connection::{
    Channel, ChannelEvent, Connection, ConnectionEvent, ConnectionId, PendingResponse,
    TcpTransport, Transport, TransportHandler,
};
pub use extend_core as core;
pub use extend_core::{ExtendError, Result};
pub use listener::{
    BoxedMapListener, FnMapListener, FnMapListenerBuilder, ListenerId, ListenerStats,
    MapEntryEvent, MapListener, TypedMapListener,
};
pub use proxy::{EntryProcessor, NamedCache};
pub use query::{Aggregator, Aggregators, CountAggregator, DoubleAggregator, LongAggregator};
