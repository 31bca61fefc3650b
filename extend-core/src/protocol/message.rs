//! Multi-frame message envelope.

use bytes::{BufMut, BytesMut};

use super::constants::*;
use super::frame::Frame;
use crate::error::{ExtendError, Result};

/// A message composed of one or more frames.
///
/// The first frame is the initial frame holding the header: message type,
/// correlation id and channel id. Additional frames carry the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Frame>,
}

impl Message {
    /// Creates a message with an initial frame holding the given header.
    pub fn create(message_type: i32, correlation_id: i64, channel_id: i32) -> Self {
        let mut initial_frame = Frame::new(BytesMut::with_capacity(HEADER_SIZE), BEGIN_FLAG);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(correlation_id);
        initial_frame.content.put_i32_le(channel_id);

        Self {
            frames: vec![initial_frame],
        }
    }

    /// Creates an event message; events answer no request.
    pub fn create_event(message_type: i32, channel_id: i32) -> Self {
        let mut message = Self::create(message_type, NO_CORRELATION_ID, channel_id);
        message.frames[0].flags |= IS_EVENT_FLAG;
        message
    }

    /// Creates a message from received frames, validating the header.
    pub fn from_frames(frames: Vec<Frame>) -> Result<Self> {
        match frames.first() {
            Some(initial) if initial.content.len() >= HEADER_SIZE => Ok(Self { frames }),
            Some(initial) => Err(ExtendError::ProtocolViolation(format!(
                "initial frame holds {} bytes, header needs {}",
                initial.content.len(),
                HEADER_SIZE
            ))),
            None => Err(ExtendError::ProtocolViolation(
                "message has no frames".to_string(),
            )),
        }
    }

    fn header(&self) -> &[u8] {
        &self.frames[0].content[..HEADER_SIZE]
    }

    /// Returns the message type from the initial frame.
    pub fn message_type(&self) -> i32 {
        let h = self.header();
        i32::from_le_bytes([h[0], h[1], h[2], h[3]])
    }

    /// Returns the correlation id from the initial frame.
    pub fn correlation_id(&self) -> i64 {
        let h = &self.header()[CORRELATION_ID_OFFSET..CHANNEL_ID_OFFSET];
        i64::from_le_bytes([h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7]])
    }

    /// Sets the correlation id in the initial frame.
    pub fn set_correlation_id(&mut self, correlation_id: i64) {
        self.frames[0].content[CORRELATION_ID_OFFSET..CHANNEL_ID_OFFSET]
            .copy_from_slice(&correlation_id.to_le_bytes());
    }

    /// Returns the channel id from the initial frame.
    pub fn channel_id(&self) -> i32 {
        let h = &self.header()[CHANNEL_ID_OFFSET..HEADER_SIZE];
        i32::from_le_bytes([h[0], h[1], h[2], h[3]])
    }

    /// Sets the channel id in the initial frame.
    pub fn set_channel_id(&mut self, channel_id: i32) {
        self.frames[0].content[CHANNEL_ID_OFFSET..HEADER_SIZE]
            .copy_from_slice(&channel_id.to_le_bytes());
    }

    /// Returns true if this message is flagged as an event.
    pub fn is_event(&self) -> bool {
        self.frames[0].is_event_frame()
    }

    /// Adds a frame to the message.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Returns a reference to all frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Returns a cursor over the payload frames, after the initial frame.
    pub fn payload(&self) -> FrameCursor<'_> {
        FrameCursor {
            message_type: self.message_type(),
            frames: self.frames[1..].iter(),
        }
    }

    /// Returns the number of frames in the message.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Calculates the total size of the message on the wire.
    pub fn wire_size(&self) -> usize {
        self.frames.iter().map(|f| f.wire_size()).sum()
    }

    /// Writes all frames to the destination buffer.
    ///
    /// Sets the END flag on the last frame before writing.
    pub fn write_to(&mut self, dst: &mut BytesMut) {
        if let Some(last) = self.frames.last_mut() {
            last.flags |= END_FLAG;
        }
        dst.reserve(self.wire_size());
        for frame in &self.frames {
            frame.write_to(dst);
        }
    }
}

/// Sequential reader over a message's payload frames.
#[derive(Debug)]
pub struct FrameCursor<'a> {
    message_type: i32,
    frames: std::slice::Iter<'a, Frame>,
}

impl<'a> FrameCursor<'a> {
    /// Returns the next frame, failing if the payload is exhausted.
    pub fn next_frame(&mut self) -> Result<&'a Frame> {
        self.frames.next().ok_or_else(|| {
            ExtendError::ProtocolViolation(format!(
                "message type {:#06x} is missing a payload frame",
                self.message_type
            ))
        })
    }

    /// Returns `true` if every payload frame has been read.
    pub fn is_exhausted(&self) -> bool {
        self.frames.len() == 0
    }
}
