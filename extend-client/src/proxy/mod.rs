//! Typed proxies for remote caches.

mod entry_processor;
mod named_cache;

pub use entry_processor::EntryProcessor;
pub use named_cache::NamedCache;

pub(crate) use named_cache::CacheShared;
