//! Value codec: typed values to and from tagged binary [`Data`].

pub mod data;
mod stream;
mod traits;

pub use data::{type_ids, Data, Number};
pub use stream::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};
pub use traits::{Deserializable, Serializable};
