//! Core types and protocols for Extend clients.

#![warn(missing_docs)]

pub mod aggregation;
pub mod error;
pub mod process;
pub mod protocol;
pub mod serialization;

pub use aggregation::{AggregationState, AggregatorKind, AggregatorSpec};
pub use error::{ExtendError, Result};
pub use serialization::{
    Data, DataInput, DataOutput, Deserializable, ObjectDataInput, ObjectDataOutput, Serializable,
};
