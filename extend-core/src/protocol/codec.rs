//! Codec implementation for encoding/decoding Extend messages.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::Frame;
use super::message::Message;
use crate::error::{ExtendError, Result};

/// Codec for encoding and decoding Extend messages.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O.
#[derive(Debug, Default)]
pub struct MessageCodec {
    /// Frames accumulated while decoding a multi-frame message.
    pending_frames: Vec<Frame>,
}

impl MessageCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ExtendError;

    fn encode(&mut self, mut item: Message, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ExtendError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let frame = match Frame::read_from(src)? {
                Some(frame) => frame,
                None => return Ok(None),
            };

            if frame.is_begin_frame() != self.pending_frames.is_empty() {
                return Err(ExtendError::ProtocolViolation(if frame.is_begin_frame() {
                    "BEGIN frame inside an unterminated message".to_string()
                } else {
                    "frame outside of a message".to_string()
                }));
            }

            let is_end = frame.is_end_frame();
            self.pending_frames.push(frame);

            if is_end {
                let frames = std::mem::take(&mut self.pending_frames);
                return Message::from_frames(frames).map(Some);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Message::create(CACHE_SIZE, 9, 1), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.message_type(), CACHE_SIZE);
        assert_eq!(decoded.correlation_id(), 9);
        assert_eq!(decoded.channel_id(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_length() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&[0x01, 0x02][..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_multi_frame_message() {
        let mut codec = MessageCodec::new();
        let mut msg = Message::create(CACHE_PUT, 5, 1);
        msg.add_frame(Frame::string("dist-cache"));
        msg.add_frame(Frame::long(7));

        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.frame_count(), 3);
        assert_eq!(decoded.frames()[2].as_long().unwrap(), 7);
    }

    #[test]
    fn test_decode_multiple_messages() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Message::create(CACHE_GET, 1, 1), &mut buf).unwrap();
        codec.encode(Message::create_event(EVENT_MAP, 2), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.message_type(), CACHE_GET);
        assert!(second.is_event());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_then_complete_decode() {
        let mut codec = MessageCodec::new();
        let mut msg = Message::create(CACHE_REMOVE, 3, 1);
        msg.add_frame(Frame::string("dist-cache"));

        let mut full_buf = BytesMut::new();
        codec.encode(msg, &mut full_buf).unwrap();

        let split_point = full_buf.len() - 3;
        let mut partial_buf = full_buf.split_to(split_point);
        assert!(codec.decode(&mut partial_buf).unwrap().is_none());

        partial_buf.unsplit(full_buf);
        let decoded = codec.decode(&mut partial_buf).unwrap().unwrap();
        assert_eq!(decoded.message_type(), CACHE_REMOVE);
    }

    #[test]
    fn test_frame_without_begin_is_violation() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        Frame::with_flags(END_FLAG).write_to(&mut buf);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ExtendError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_oversized_frame_is_rejected_before_buffering() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((MAX_FRAME_LENGTH as u32) + 1).to_le_bytes());
        buf.extend_from_slice(&BEGIN_FLAG.to_le_bytes());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ExtendError::ProtocolViolation(_))
        ));
    }
}
