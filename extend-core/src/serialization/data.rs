//! Binary values as they travel on the wire.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::{Deserializable, ObjectDataInput, ObjectDataOutput, Serializable};
use crate::error::{ExtendError, Result};

/// Codec type tags carried by every [`Data`] value.
pub mod type_ids {
    /// Application-defined value; opaque to the peer.
    pub const CUSTOM: i32 = 0;
    /// Signed byte.
    pub const BYTE: i32 = -3;
    /// Boolean.
    pub const BOOLEAN: i32 = -4;
    /// 32-bit signed integer.
    pub const INTEGER: i32 = -7;
    /// 64-bit signed integer.
    pub const LONG: i32 = -8;
    /// 64-bit float.
    pub const DOUBLE: i32 = -10;
    /// UTF-8 string.
    pub const STRING: i32 = -11;
    /// Byte array.
    pub const BYTE_ARRAY: i32 = -12;
}

/// A serialized value tagged with its codec type id.
///
/// Keys and values are shipped, stored in the near cache, and compared in this
/// form; only the typed proxy layer turns them back into application types.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Data {
    type_id: i32,
    payload: Bytes,
}

/// A numeric value recovered from a [`Data`] for aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// An integral value (byte, int or long).
    Long(i64),
    /// A floating-point value.
    Double(f64),
}

impl Data {
    /// Creates a value from its raw parts.
    pub fn new(type_id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            type_id,
            payload: payload.into(),
        }
    }

    /// Serializes `value` with the value codec.
    pub fn of<T: Serializable + ?Sized>(value: &T) -> Result<Self> {
        let mut output = ObjectDataOutput::new();
        value.serialize(&mut output)?;
        Ok(Self::new(value.type_id(), output.into_bytes()))
    }

    /// Deserializes the payload as `T`.
    pub fn decode<T: Deserializable>(&self) -> Result<T> {
        let mut input = ObjectDataInput::new(&self.payload);
        T::deserialize(&mut input)
    }

    /// Returns the codec type tag.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Returns the serialized payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Interprets the value as a number, if its type tag is numeric.
    pub fn as_number(&self) -> Result<Option<Number>> {
        let number = match self.type_id {
            type_ids::BYTE => Some(Number::Long(i64::from(self.decode::<i8>()?))),
            type_ids::INTEGER => Some(Number::Long(i64::from(self.decode::<i32>()?))),
            type_ids::LONG => Some(Number::Long(self.decode::<i64>()?)),
            type_ids::DOUBLE => Some(Number::Double(self.decode::<f64>()?)),
            _ => None,
        };
        Ok(number)
    }

    /// Writes `[type_id: i32 LE][payload]` into a frame body.
    pub fn to_frame_content(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(4 + self.payload.len());
        buf.put_i32_le(self.type_id);
        buf.put_slice(&self.payload);
        buf
    }

    /// Parses a frame body written by [`Data::to_frame_content`].
    pub fn from_frame_content(content: &[u8]) -> Result<Self> {
        if content.len() < 4 {
            return Err(ExtendError::ProtocolViolation(format!(
                "data frame too short: {} bytes",
                content.len()
            )));
        }
        let type_id = i32::from_le_bytes([content[0], content[1], content[2], content[3]]);
        Ok(Self::new(type_id, Bytes::copy_from_slice(&content[4..])))
    }
}

impl From<Number> for Data {
    fn from(number: Number) -> Self {
        let mut output = ObjectDataOutput::new();
        // Writing into an in-memory buffer cannot fail.
        let _ = match number {
            Number::Long(v) => v.serialize(&mut output),
            Number::Double(v) => v.serialize(&mut output),
        };
        let type_id = match number {
            Number::Long(_) => type_ids::LONG,
            Number::Double(_) => type_ids::DOUBLE,
        };
        Data::new(type_id, output.into_bytes())
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("type_id", &self.type_id)
            .field("len", &self.payload.len())
            .finish()
    }
}
