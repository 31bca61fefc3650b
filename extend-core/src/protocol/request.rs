//! Request messages.
//!
//! A [`Request`] is a pure wire payload. Building one has no side effects; the
//! operation it names runs only on the peer that decodes it.

use super::constants::*;
use super::frame::Frame;
use super::message::Message;
use crate::aggregation::AggregatorSpec;
use crate::error::{ExtendError, Result};
use crate::serialization::Data;

/// An operation on a named cache, one variant per request type id.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Count the entries of a cache.
    Size {
        /// Target cache.
        cache: String,
    },
    /// Test whether a key is mapped.
    ContainsKey {
        /// Target cache.
        cache: String,
        /// Key to test.
        key: Data,
    },
    /// Look up one key.
    Get {
        /// Target cache.
        cache: String,
        /// Key to look up.
        key: Data,
        /// When present, the peer starts tracking the key for this channel and
        /// emits a synthetic event carrying the marker.
        priming: Option<i64>,
    },
    /// Map a key to a value.
    Put {
        /// Target cache.
        cache: String,
        /// Key to map.
        key: Data,
        /// New value.
        value: Data,
    },
    /// Remove a key.
    Remove {
        /// Target cache.
        cache: String,
        /// Key to remove.
        key: Data,
    },
    /// Remove every entry, one delete event per entry.
    Clear {
        /// Target cache.
        cache: String,
    },
    /// Drop every entry with a single truncation notification.
    Truncate {
        /// Target cache.
        cache: String,
    },
    /// Run an entry processor against one key.
    Invoke {
        /// Target cache.
        cache: String,
        /// Key the processor runs against.
        key: Data,
        /// The serialized processor.
        processor: Data,
    },
    /// Run a two-phase aggregation over every entry.
    Aggregate {
        /// Target cache.
        cache: String,
        /// The formula to run.
        aggregator: AggregatorSpec,
    },
    /// Register event interest for the whole cache or one key.
    AddListener {
        /// Target cache.
        cache: String,
        /// Key filter; `None` means every key.
        key: Option<Data>,
    },
    /// Withdraw interest registered by [`Request::AddListener`].
    RemoveListener {
        /// Target cache.
        cache: String,
        /// Key filter; `None` means every key.
        key: Option<Data>,
    },
    /// Create the named cache if needed.
    EnsureCache {
        /// Target cache.
        cache: String,
    },
    /// Destroy the named cache.
    DestroyCache {
        /// Target cache.
        cache: String,
    },
}

impl Request {
    /// Returns the wire type id of this request.
    pub fn type_id(&self) -> i32 {
        match self {
            Request::Size { .. } => CACHE_SIZE,
            Request::ContainsKey { .. } => CACHE_CONTAINS_KEY,
            Request::Get { .. } => CACHE_GET,
            Request::Put { .. } => CACHE_PUT,
            Request::Remove { .. } => CACHE_REMOVE,
            Request::Clear { .. } => CACHE_CLEAR,
            Request::Truncate { .. } => CACHE_TRUNCATE,
            Request::Invoke { .. } => CACHE_INVOKE,
            Request::Aggregate { .. } => CACHE_AGGREGATE,
            Request::AddListener { .. } => CACHE_ADD_LISTENER,
            Request::RemoveListener { .. } => CACHE_REMOVE_LISTENER,
            Request::EnsureCache { .. } => CACHE_ENSURE,
            Request::DestroyCache { .. } => CACHE_DESTROY,
        }
    }

    /// Returns the name of the cache this request targets.
    pub fn cache_name(&self) -> &str {
        match self {
            Request::Size { cache }
            | Request::ContainsKey { cache, .. }
            | Request::Get { cache, .. }
            | Request::Put { cache, .. }
            | Request::Remove { cache, .. }
            | Request::Clear { cache }
            | Request::Truncate { cache }
            | Request::Invoke { cache, .. }
            | Request::Aggregate { cache, .. }
            | Request::AddListener { cache, .. }
            | Request::RemoveListener { cache, .. }
            | Request::EnsureCache { cache }
            | Request::DestroyCache { cache } => cache,
        }
    }

    /// Encodes this request into a message.
    pub fn encode(&self, correlation_id: i64, channel_id: i32) -> Message {
        let mut message = Message::create(self.type_id(), correlation_id, channel_id);
        message.add_frame(Frame::string(self.cache_name()));

        match self {
            Request::Size { .. }
            | Request::Clear { .. }
            | Request::Truncate { .. }
            | Request::EnsureCache { .. }
            | Request::DestroyCache { .. } => {}
            Request::ContainsKey { key, .. } | Request::Remove { key, .. } => {
                message.add_frame(Frame::data(key));
            }
            Request::Get { key, priming, .. } => {
                message.add_frame(Frame::data(key));
                message.add_frame(Frame::nullable_long(*priming));
            }
            Request::Put { key, value, .. } => {
                message.add_frame(Frame::data(key));
                message.add_frame(Frame::data(value));
            }
            Request::Invoke { key, processor, .. } => {
                message.add_frame(Frame::data(key));
                message.add_frame(Frame::data(processor));
            }
            Request::Aggregate { aggregator, .. } => aggregator.write_frames(&mut message),
            Request::AddListener { key, .. } | Request::RemoveListener { key, .. } => {
                message.add_frame(Frame::nullable_data(key.as_ref()));
            }
        }

        message
    }

    /// Decodes a request, dispatching on the message type id.
    ///
    /// An unknown type id is a protocol violation.
    pub fn decode(message: &Message) -> Result<Self> {
        let mut payload = message.payload();
        let cache = payload.next_frame()?.as_string()?;

        let request = match message.message_type() {
            CACHE_SIZE => Request::Size { cache },
            CACHE_CONTAINS_KEY => Request::ContainsKey {
                cache,
                key: payload.next_frame()?.as_data()?,
            },
            CACHE_GET => Request::Get {
                cache,
                key: payload.next_frame()?.as_data()?,
                priming: payload.next_frame()?.as_nullable_long()?,
            },
            CACHE_PUT => Request::Put {
                cache,
                key: payload.next_frame()?.as_data()?,
                value: payload.next_frame()?.as_data()?,
            },
            CACHE_REMOVE => Request::Remove {
                cache,
                key: payload.next_frame()?.as_data()?,
            },
            CACHE_CLEAR => Request::Clear { cache },
            CACHE_TRUNCATE => Request::Truncate { cache },
            CACHE_INVOKE => Request::Invoke {
                cache,
                key: payload.next_frame()?.as_data()?,
                processor: payload.next_frame()?.as_data()?,
            },
            CACHE_AGGREGATE => Request::Aggregate {
                cache,
                aggregator: AggregatorSpec::read_frames(&mut payload)?,
            },
            CACHE_ADD_LISTENER => Request::AddListener {
                cache,
                key: payload.next_frame()?.as_nullable_data()?,
            },
            CACHE_REMOVE_LISTENER => Request::RemoveListener {
                cache,
                key: payload.next_frame()?.as_nullable_data()?,
            },
            CACHE_ENSURE => Request::EnsureCache { cache },
            CACHE_DESTROY => Request::DestroyCache { cache },
            other => {
                return Err(ExtendError::ProtocolViolation(format!(
                    "unknown request type id {:#06x}",
                    other
                )))
            }
        };

        Ok(request)
    }
}
