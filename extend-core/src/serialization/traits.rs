//! Serialization traits and implementations for built-in value types.

use super::data::type_ids;
use super::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};
use crate::error::Result;

/// A value that can be written by the value codec.
pub trait Serializable {
    /// Writes this value to `output`.
    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()>;

    /// The codec type tag recorded next to the serialized bytes.
    ///
    /// The peer uses the tag to interpret values it computes over, such as
    /// the numbers an aggregation folds.
    fn type_id(&self) -> i32 {
        type_ids::CUSTOM
    }

    /// Serializes this value into a standalone byte vector.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut output = ObjectDataOutput::new();
        self.serialize(&mut output)?;
        Ok(output.into_bytes().to_vec())
    }
}

/// A value that can be read back by the value codec.
pub trait Deserializable: Sized {
    /// Reads a value from `input`.
    fn deserialize<R: DataInput>(input: &mut R) -> Result<Self>;

    /// Deserializes a value from a byte slice.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut input = ObjectDataInput::new(data);
        Self::deserialize(&mut input)
    }
}

macro_rules! primitive_codec {
    ($ty:ty, $tag:expr, $write:ident, $read:ident) => {
        impl Serializable for $ty {
            fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
                output.$write(*self)
            }

            fn type_id(&self) -> i32 {
                $tag
            }
        }

        impl Deserializable for $ty {
            fn deserialize<R: DataInput>(input: &mut R) -> Result<Self> {
                input.$read()
            }
        }
    };
}

primitive_codec!(i8, type_ids::BYTE, write_byte, read_byte);
primitive_codec!(bool, type_ids::BOOLEAN, write_bool, read_bool);
primitive_codec!(i32, type_ids::INTEGER, write_int, read_int);
primitive_codec!(i64, type_ids::LONG, write_long, read_long);
primitive_codec!(f64, type_ids::DOUBLE, write_double, read_double);

impl Serializable for str {
    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
        output.write_string(self)
    }

    fn type_id(&self) -> i32 {
        type_ids::STRING
    }
}

impl Serializable for String {
    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
        output.write_string(self)
    }

    fn type_id(&self) -> i32 {
        type_ids::STRING
    }
}

impl Deserializable for String {
    fn deserialize<R: DataInput>(input: &mut R) -> Result<Self> {
        input.read_string()
    }
}

impl Serializable for Vec<u8> {
    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
        output.write_int(self.len() as i32)?;
        output.write_bytes(self)
    }

    fn type_id(&self) -> i32 {
        type_ids::BYTE_ARRAY
    }
}

impl Deserializable for Vec<u8> {
    fn deserialize<R: DataInput>(input: &mut R) -> Result<Self> {
        let len = input.read_int()?;
        if len < 0 {
            return Err(crate::ExtendError::Serialization(format!(
                "invalid byte array length: {}",
                len
            )));
        }
        input.read_bytes(len as usize)
    }
}

impl<T: Serializable + ?Sized> Serializable for &T {
    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
        (**self).serialize(output)
    }

    fn type_id(&self) -> i32 {
        (**self).type_id()
    }
}
