//! Byte streams used by the value codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ExtendError, Result};

/// Writes primitive values in big-endian order.
pub trait DataOutput {
    /// Writes a single signed byte.
    fn write_byte(&mut self, v: i8) -> Result<()>;

    /// Writes a boolean as one byte (0 or 1).
    fn write_bool(&mut self, v: bool) -> Result<()>;

    /// Writes a 32-bit signed integer.
    fn write_int(&mut self, v: i32) -> Result<()>;

    /// Writes a 64-bit signed integer.
    fn write_long(&mut self, v: i64) -> Result<()>;

    /// Writes a 64-bit float.
    fn write_double(&mut self, v: f64) -> Result<()>;

    /// Writes raw bytes without a length prefix.
    fn write_bytes(&mut self, v: &[u8]) -> Result<()>;

    /// Writes a UTF-8 string with an `i32` length prefix.
    fn write_string(&mut self, v: &str) -> Result<()> {
        self.write_int(v.len() as i32)?;
        self.write_bytes(v.as_bytes())
    }
}

/// Reads primitive values in big-endian order.
pub trait DataInput {
    /// Reads a single signed byte.
    fn read_byte(&mut self) -> Result<i8>;

    /// Reads a boolean; any non-zero byte is `true`.
    fn read_bool(&mut self) -> Result<bool>;

    /// Reads a 32-bit signed integer.
    fn read_int(&mut self) -> Result<i32>;

    /// Reads a 64-bit signed integer.
    fn read_long(&mut self) -> Result<i64>;

    /// Reads a 64-bit float.
    fn read_double(&mut self) -> Result<f64>;

    /// Reads exactly `len` raw bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Reads an `i32`-length-prefixed UTF-8 string.
    fn read_string(&mut self) -> Result<String> {
        let len = self.read_int()?;
        if len < 0 {
            return Err(ExtendError::Serialization(format!(
                "invalid string length: {}",
                len
            )));
        }
        let bytes = self.read_bytes(len as usize)?;
        String::from_utf8(bytes)
            .map_err(|e| ExtendError::Serialization(format!("invalid UTF-8 string: {}", e)))
    }
}

/// Growable output buffer.
#[derive(Debug, Default)]
pub struct ObjectDataOutput {
    buffer: BytesMut,
}

impl ObjectDataOutput {
    /// Creates an empty output buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64),
        }
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the output and returns the written bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

impl DataOutput for ObjectDataOutput {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.buffer.put_i8(v);
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.buffer.put_u8(u8::from(v));
        Ok(())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.buffer.put_i32(v);
        Ok(())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.buffer.put_i64(v);
        Ok(())
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.buffer.put_f64(v);
        Ok(())
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.buffer.put_slice(v);
        Ok(())
    }
}

/// Cursor over a borrowed byte slice.
#[derive(Debug)]
pub struct ObjectDataInput<'a> {
    data: &'a [u8],
}

impl<'a> ObjectDataInput<'a> {
    /// Creates an input reading from the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.data.remaining() < n {
            return Err(ExtendError::Serialization(format!(
                "insufficient data: need {} bytes, have {}",
                n,
                self.data.remaining()
            )));
        }
        Ok(())
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn read_byte(&mut self) -> Result<i8> {
        self.ensure_remaining(1)?;
        Ok(self.data.get_i8())
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.ensure_remaining(1)?;
        Ok(self.data.get_u8() != 0)
    }

    fn read_int(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.data.get_i32())
    }

    fn read_long(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.data.get_i64())
    }

    fn read_double(&mut self) -> Result<f64> {
        self.ensure_remaining(8)?;
        Ok(self.data.get_f64())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_remaining(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_is_big_endian() {
        let mut out = ObjectDataOutput::new();
        out.write_int(0x0102_0304).unwrap();
        assert_eq!(&out.into_bytes()[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_read_sequence() {
        let mut out = ObjectDataOutput::new();
        out.write_bool(true).unwrap();
        out.write_long(-5).unwrap();
        out.write_double(2.5).unwrap();
        out.write_string("grid").unwrap();
        let bytes = out.into_bytes();

        let mut input = ObjectDataInput::new(&bytes);
        assert!(input.read_bool().unwrap());
        assert_eq!(input.read_long().unwrap(), -5);
        assert_eq!(input.read_double().unwrap(), 2.5);
        assert_eq!(input.read_string().unwrap(), "grid");
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_insufficient_data() {
        let mut input = ObjectDataInput::new(&[0x01, 0x02]);
        let err = input.read_int().unwrap_err();
        assert!(err.to_string().contains("need 4 bytes, have 2"));
    }

    #[test]
    fn test_negative_string_length_rejected() {
        let mut input = ObjectDataInput::new(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(input.read_string().is_err());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut input = ObjectDataInput::new(&[0, 0, 0, 2, 0xC3, 0x28]);
        let err = input.read_string().unwrap_err();
        assert!(err.to_string().contains("invalid UTF-8"));
    }
}
