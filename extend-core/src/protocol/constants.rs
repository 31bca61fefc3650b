//! Protocol constants for the Extend wire protocol.

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Size of the frame flags field in bytes.
pub const SIZE_OF_FRAME_FLAGS_FIELD: usize = 2;

/// Total frame header size (length + flags).
pub const FRAME_HEADER_SIZE: usize = SIZE_OF_FRAME_LENGTH_FIELD + SIZE_OF_FRAME_FLAGS_FIELD;

/// Largest frame length (flags plus content) a reader accepts.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Begin frame flag - marks the start of a message.
pub const BEGIN_FLAG: u16 = 1 << 15;

/// End frame flag - marks the end of a message.
pub const END_FLAG: u16 = 1 << 14;

/// Event flag - set on the initial frame of a pushed event.
pub const IS_EVENT_FLAG: u16 = 1 << 12;

/// Null frame flag - indicates an absent value.
pub const IS_NULL_FLAG: u16 = 1 << 10;

/// Default frame flags (no special flags set).
pub const DEFAULT_FLAGS: u16 = 0;

/// Offset of the message type in the initial frame content.
pub const TYPE_FIELD_OFFSET: usize = 0;

/// Offset of the correlation id in the initial frame content.
pub const CORRELATION_ID_OFFSET: usize = TYPE_FIELD_OFFSET + 4;

/// Offset of the channel id in the initial frame content.
pub const CHANNEL_ID_OFFSET: usize = CORRELATION_ID_OFFSET + 8;

/// Size of the initial frame header.
pub const HEADER_SIZE: usize = CHANNEL_ID_OFFSET + 4;

/// Correlation id carried by messages that answer no request.
pub const NO_CORRELATION_ID: i64 = 0;

// Request message types.

/// Count the entries of a cache.
pub const CACHE_SIZE: i32 = 0x0101;

/// Test whether a key is mapped.
pub const CACHE_CONTAINS_KEY: i32 = 0x0102;

/// Look up one key, optionally priming key interest.
pub const CACHE_GET: i32 = 0x0103;

/// Map a key to a value, returning the previous value.
pub const CACHE_PUT: i32 = 0x0104;

/// Remove a key, returning the previous value.
pub const CACHE_REMOVE: i32 = 0x0105;

/// Remove every entry, one delete event per entry.
pub const CACHE_CLEAR: i32 = 0x0106;

/// Drop every entry without per-entry events.
pub const CACHE_TRUNCATE: i32 = 0x0107;

/// Run an entry processor against one key.
pub const CACHE_INVOKE: i32 = 0x0108;

/// Run a two-phase aggregation over all entries.
pub const CACHE_AGGREGATE: i32 = 0x0109;

/// Register event interest for a cache or one key.
pub const CACHE_ADD_LISTENER: i32 = 0x010A;

/// Withdraw event interest for a cache or one key.
pub const CACHE_REMOVE_LISTENER: i32 = 0x010B;

/// Create the named cache if it does not exist.
pub const CACHE_ENSURE: i32 = 0x0201;

/// Destroy the named cache and its contents.
pub const CACHE_DESTROY: i32 = 0x0202;

// Response message types.

/// Response with no payload.
pub const RESPONSE_UNIT: i32 = 0x0001;

/// Response carrying an optional value.
pub const RESPONSE_VALUE: i32 = 0x0002;

/// Response carrying a 32-bit integer.
pub const RESPONSE_INT: i32 = 0x0003;

/// Response carrying a boolean.
pub const RESPONSE_BOOL: i32 = 0x0004;

/// Response carrying an aggregation result, null when nothing matched.
pub const RESPONSE_AGGREGATE: i32 = 0x0005;

/// Response carrying a remote failure.
pub const RESPONSE_ERROR: i32 = 0x000F;

// Event message types.

/// A cache entry was inserted, updated or deleted.
pub const EVENT_MAP: i32 = 0x0301;

/// A cache was truncated or destroyed as a whole.
pub const EVENT_CACHE_NOTIFICATION: i32 = 0x0302;

/// Error codes carried by [`RESPONSE_ERROR`] messages.
pub mod error_codes {
    /// The request carried an argument the peer rejected.
    pub const ILLEGAL_ARGUMENT: i32 = 1;

    /// The named cache does not exist.
    pub const NO_SUCH_CACHE: i32 = 2;

    /// An aggregated value was not of the expected numeric kind.
    pub const AGGREGATION_TYPE_MISMATCH: i32 = 3;

    /// A value could not be decoded by the peer.
    pub const SERIALIZATION: i32 = 4;

    /// The peer does not support the requested operation.
    pub const UNSUPPORTED_OPERATION: i32 = 5;
}
