//! Frame type for the Extend wire protocol.

use bytes::{Buf, BufMut, BytesMut};

use super::constants::*;
use crate::error::{ExtendError, Result};
use crate::serialization::Data;

/// A single frame in the Extend protocol.
///
/// Each frame consists of:
/// - A 4-byte length field (little-endian)
/// - A 2-byte flags field (little-endian)
/// - Variable-length content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame content (payload after flags).
    pub content: BytesMut,
    /// Frame flags indicating frame type and properties.
    pub flags: u16,
}

impl Frame {
    /// Creates a new frame with the given content and flags.
    pub fn new(content: BytesMut, flags: u16) -> Self {
        Self { content, flags }
    }

    /// Creates a new frame with content and default flags.
    pub fn with_content(content: BytesMut) -> Self {
        Self::new(content, DEFAULT_FLAGS)
    }

    /// Creates a new empty frame with the given flags.
    pub fn with_flags(flags: u16) -> Self {
        Self::new(BytesMut::new(), flags)
    }

    /// Creates a null frame (represents an absent value).
    pub fn new_null_frame() -> Self {
        Self::with_flags(IS_NULL_FLAG)
    }

    /// Creates a frame holding a UTF-8 string.
    pub fn string(value: &str) -> Self {
        Self::with_content(BytesMut::from(value.as_bytes()))
    }

    /// Creates a frame holding a little-endian `i32`.
    pub fn int(value: i32) -> Self {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_i32_le(value);
        Self::with_content(buf)
    }

    /// Creates a frame holding a little-endian `i64`.
    pub fn long(value: i64) -> Self {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_i64_le(value);
        Self::with_content(buf)
    }

    /// Creates a frame holding a single boolean byte.
    pub fn bool(value: bool) -> Self {
        let mut buf = BytesMut::with_capacity(1);
        buf.put_u8(u8::from(value));
        Self::with_content(buf)
    }

    /// Creates a frame holding a tagged value.
    pub fn data(value: &Data) -> Self {
        Self::with_content(value.to_frame_content())
    }

    /// Creates a frame holding a tagged value, or a null frame.
    pub fn nullable_data(value: Option<&Data>) -> Self {
        value.map_or_else(Self::new_null_frame, Self::data)
    }

    /// Creates a frame holding an `i64`, or a null frame.
    pub fn nullable_long(value: Option<i64>) -> Self {
        value.map_or_else(Self::new_null_frame, Self::long)
    }

    /// Creates a frame holding a string, or a null frame.
    pub fn nullable_string(value: Option<&str>) -> Self {
        value.map_or_else(Self::new_null_frame, Self::string)
    }

    /// Returns true if this frame has the BEGIN flag set.
    pub fn is_begin_frame(&self) -> bool {
        self.flags & BEGIN_FLAG != 0
    }

    /// Returns true if this frame has the END flag set.
    pub fn is_end_frame(&self) -> bool {
        self.flags & END_FLAG != 0
    }

    /// Returns true if this frame has the NULL flag set.
    pub fn is_null_frame(&self) -> bool {
        self.flags & IS_NULL_FLAG != 0
    }

    /// Returns true if this frame has the EVENT flag set.
    pub fn is_event_frame(&self) -> bool {
        self.flags & IS_EVENT_FLAG != 0
    }

    /// Reads the content as a UTF-8 string.
    pub fn as_string(&self) -> Result<String> {
        String::from_utf8(self.content.to_vec())
            .map_err(|e| ExtendError::ProtocolViolation(format!("invalid string frame: {}", e)))
    }

    /// Reads the content as a little-endian `i32`.
    pub fn as_int(&self) -> Result<i32> {
        let bytes = self.fixed::<4>("int")?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Reads the content as a little-endian `i64`.
    pub fn as_long(&self) -> Result<i64> {
        let bytes = self.fixed::<8>("long")?;
        Ok(i64::from_le_bytes(bytes))
    }

    /// Reads the content as a boolean.
    pub fn as_bool(&self) -> Result<bool> {
        let [byte] = self.fixed::<1>("bool")?;
        Ok(byte != 0)
    }

    /// Reads the content as a tagged value.
    pub fn as_data(&self) -> Result<Data> {
        Data::from_frame_content(&self.content)
    }

    /// Reads a tagged value, mapping a null frame to `None`.
    pub fn as_nullable_data(&self) -> Result<Option<Data>> {
        if self.is_null_frame() {
            return Ok(None);
        }
        self.as_data().map(Some)
    }

    /// Reads an `i64`, mapping a null frame to `None`.
    pub fn as_nullable_long(&self) -> Result<Option<i64>> {
        if self.is_null_frame() {
            return Ok(None);
        }
        self.as_long().map(Some)
    }

    /// Reads a string, mapping a null frame to `None`.
    pub fn as_nullable_string(&self) -> Result<Option<String>> {
        if self.is_null_frame() {
            return Ok(None);
        }
        self.as_string().map(Some)
    }

    fn fixed<const N: usize>(&self, what: &str) -> Result<[u8; N]> {
        <[u8; N]>::try_from(&self.content[..]).map_err(|_| {
            ExtendError::ProtocolViolation(format!(
                "{} frame must hold {} bytes, got {}",
                what,
                N,
                self.content.len()
            ))
        })
    }

    /// Returns the size of this frame on the wire.
    ///
    /// This includes the 4-byte length field, 2-byte flags, and content.
    pub fn wire_size(&self) -> usize {
        SIZE_OF_FRAME_LENGTH_FIELD + SIZE_OF_FRAME_FLAGS_FIELD + self.content.len()
    }

    /// Returns the frame length value (flags + content length).
    ///
    /// This is the value written in the length field.
    pub fn frame_length(&self) -> usize {
        SIZE_OF_FRAME_FLAGS_FIELD + self.content.len()
    }

    /// Writes this frame to the given buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        dst.put_u32_le(self.frame_length() as u32);
        dst.put_u16_le(self.flags);
        dst.put_slice(&self.content);
    }

    /// Reads a frame from the given buffer.
    ///
    /// Returns `Ok(None)` if there isn't enough data to read a complete frame.
    pub fn read_from(src: &mut BytesMut) -> Result<Option<Self>> {
        if src.len() < SIZE_OF_FRAME_LENGTH_FIELD {
            return Ok(None);
        }

        let frame_length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if frame_length < SIZE_OF_FRAME_FLAGS_FIELD {
            return Err(ExtendError::ProtocolViolation(format!(
                "frame length {} is shorter than the flags field",
                frame_length
            )));
        }
        if frame_length > MAX_FRAME_LENGTH {
            return Err(ExtendError::ProtocolViolation(format!(
                "frame length {} exceeds the limit of {}",
                frame_length, MAX_FRAME_LENGTH
            )));
        }

        let total_frame_size = SIZE_OF_FRAME_LENGTH_FIELD + frame_length;
        if src.len() < total_frame_size {
            return Ok(None);
        }

        src.advance(SIZE_OF_FRAME_LENGTH_FIELD);
        let flags = src.get_u16_le();
        let content_length = frame_length - SIZE_OF_FRAME_FLAGS_FIELD;
        let content = src.split_to(content_length);

        Ok(Some(Self::new(content, flags)))
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::with_flags(DEFAULT_FLAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_flags() {
        let begin = Frame::with_flags(BEGIN_FLAG);
        assert!(begin.is_begin_frame());
        assert!(!begin.is_end_frame());

        let null = Frame::new_null_frame();
        assert!(null.is_null_frame());

        let event = Frame::with_flags(IS_EVENT_FLAG);
        assert!(event.is_event_frame());
    }

    #[test]
    fn test_wire_size() {
        assert_eq!(Frame::default().wire_size(), 6);
        assert_eq!(Frame::long(1).wire_size(), 14);
    }

    #[test]
    fn test_write_and_read_frame() {
        let original = Frame::new(BytesMut::from(&[0xDE, 0xAD, 0xBE, 0xEF][..]), BEGIN_FLAG);
        let mut buf = BytesMut::new();
        original.write_to(&mut buf);
        assert_eq!(buf.len(), original.wire_size());

        let decoded = Frame::read_from(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_incomplete_content() {
        let mut buf = BytesMut::from(&[
            0x06, 0x00, 0x00, 0x00, // length = 6 (flags + 4 bytes content)
            0x00, 0x80, // flags
            0x01, 0x02, // only 2 bytes of content
        ][..]);
        assert!(Frame::read_from(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_read_length_below_flags_is_violation() {
        let mut buf = BytesMut::from(&[0x01, 0x00, 0x00, 0x00, 0x00][..]);
        assert!(matches!(
            Frame::read_from(&mut buf),
            Err(ExtendError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_oversized_length_is_violation() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(u32::MAX);
        buf.put_u16_le(BEGIN_FLAG);
        assert!(matches!(
            Frame::read_from(&mut buf),
            Err(ExtendError::ProtocolViolation(_))
        ));

        let mut buf = BytesMut::new();
        buf.put_u32_le((MAX_FRAME_LENGTH + 1) as u32);
        assert!(Frame::read_from(&mut buf).is_err());
    }

    #[test]
    fn test_typed_frames() {
        assert_eq!(Frame::int(-7).as_int().unwrap(), -7);
        assert_eq!(Frame::long(1 << 40).as_long().unwrap(), 1 << 40);
        assert!(Frame::bool(true).as_bool().unwrap());
        assert_eq!(Frame::string("dist-cache").as_string().unwrap(), "dist-cache");
    }

    #[test]
    fn test_nullable_frames() {
        assert_eq!(Frame::nullable_long(None).as_nullable_long().unwrap(), None);
        assert_eq!(Frame::nullable_long(Some(4)).as_nullable_long().unwrap(), Some(4));
        assert_eq!(Frame::nullable_data(None).as_nullable_data().unwrap(), None);

        let data = Data::of("grid").unwrap();
        assert_eq!(
            Frame::nullable_data(Some(&data)).as_nullable_data().unwrap(),
            Some(data)
        );
    }

    #[test]
    fn test_wrong_width_is_violation() {
        let err = Frame::int(1).as_long().unwrap_err();
        assert!(err.to_string().contains("long frame must hold 8 bytes, got 4"));
    }
}
