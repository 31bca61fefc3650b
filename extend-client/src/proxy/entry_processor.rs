//! Entry processor support for named caches.

use extend_core::{Deserializable, Serializable};

/// A processor that is executed on one cache entry by the peer.
///
/// Entry processors allow atomic read-modify-write operations on an entry
/// without transferring it to the client. The processor is serialized and
/// sent with the request; the peer runs it against the entry and returns
/// its result.
///
/// # Type Parameters
///
/// - `Output`: The result type returned after processing an entry.
///
/// # Example
///
/// ```ignore
/// use extend_client::proxy::EntryProcessor;
/// use extend_core::{DataOutput, Result, Serializable};
///
/// struct IncrementProcessor {
///     delta: i64,
/// }
///
/// impl EntryProcessor for IncrementProcessor {
///     type Output = i64;
/// }
///
/// impl Serializable for IncrementProcessor {
///     fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
///         output.write_long(self.delta)
///     }
/// }
/// ```
pub trait EntryProcessor: Serializable + Send + Sync {
    /// The type of result returned when this processor is executed on an entry.
    type Output: Deserializable;
}

#[cfg(test)]
mod tests {
    use super::*;
    use extend_core::{Data, DataOutput, Result};

    struct TestProcessor {
        value: i32,
    }

    impl EntryProcessor for TestProcessor {
        type Output = i32;
    }

    impl Serializable for TestProcessor {
        fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
            output.write_int(self.value)
        }
    }

    #[test]
    fn test_entry_processor_trait_bounds() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TestProcessor>();
    }

    #[test]
    fn test_entry_processor_serialization() {
        let processor = TestProcessor { value: 42 };
        let data = Data::of(&processor).unwrap();
        assert!(!data.payload().is_empty());
        assert_eq!(data.decode::<i32>().unwrap(), 42);
    }
}
