//! Events pushed by the peer without a request.

use super::constants::*;
use super::frame::Frame;
use super::message::Message;
use super::response::Response;
use crate::error::{ExtendError, Result};
use crate::serialization::Data;

/// The kind of mutation a [`MapEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapEventKind {
    /// A key was mapped for the first time.
    Inserted,
    /// The value of a mapped key changed.
    Updated,
    /// A key was removed.
    Deleted,
}

impl MapEventKind {
    fn id(self) -> i32 {
        match self {
            MapEventKind::Inserted => 1,
            MapEventKind::Updated => 2,
            MapEventKind::Deleted => 3,
        }
    }

    fn from_id(id: i32) -> Result<Self> {
        match id {
            1 => Ok(MapEventKind::Inserted),
            2 => Ok(MapEventKind::Updated),
            3 => Ok(MapEventKind::Deleted),
            other => Err(ExtendError::ProtocolViolation(format!(
                "unknown map event kind {}",
                other
            ))),
        }
    }
}

/// A change to one entry of a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent {
    /// Name of the cache that changed.
    pub cache_name: String,
    /// What happened to the entry.
    pub kind: MapEventKind,
    /// The affected key.
    pub key: Data,
    /// Value before the change, absent for inserts.
    pub old_value: Option<Data>,
    /// Value after the change, absent for deletes.
    pub new_value: Option<Data>,
    /// Marker of the priming get that caused this event, if any.
    ///
    /// An event carrying a marker only establishes key tracking; it reports
    /// no mutation.
    pub priming: Option<i64>,
}

impl MapEvent {
    /// Returns `true` if this event was produced by a priming get.
    pub fn is_priming(&self) -> bool {
        self.priming.is_some()
    }
}

/// A whole-cache change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNotificationKind {
    /// Every entry was dropped; interest registrations survive.
    Truncated,
    /// The cache no longer exists.
    Destroyed,
}

/// A notification about a cache as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNotification {
    /// Name of the affected cache.
    pub cache_name: String,
    /// What happened.
    pub kind: CacheNotificationKind,
}

/// Any event pushed on an event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An entry changed.
    Map(MapEvent),
    /// A cache changed as a whole.
    Notification(CacheNotification),
}

impl Event {
    /// Encodes this event into a message on the given channel.
    pub fn encode(&self, channel_id: i32) -> Message {
        match self {
            Event::Map(event) => {
                let mut message = Message::create_event(EVENT_MAP, channel_id);
                message.add_frame(Frame::string(&event.cache_name));
                message.add_frame(Frame::int(event.kind.id()));
                message.add_frame(Frame::data(&event.key));
                message.add_frame(Frame::nullable_data(event.old_value.as_ref()));
                message.add_frame(Frame::nullable_data(event.new_value.as_ref()));
                message.add_frame(Frame::nullable_long(event.priming));
                message
            }
            Event::Notification(notification) => {
                let mut message = Message::create_event(EVENT_CACHE_NOTIFICATION, channel_id);
                message.add_frame(Frame::string(&notification.cache_name));
                message.add_frame(Frame::bool(
                    notification.kind == CacheNotificationKind::Destroyed,
                ));
                message
            }
        }
    }

    /// Decodes an event, dispatching on the message type id.
    pub fn decode(message: &Message) -> Result<Self> {
        let mut payload = message.payload();
        match message.message_type() {
            EVENT_MAP => Ok(Event::Map(MapEvent {
                cache_name: payload.next_frame()?.as_string()?,
                kind: MapEventKind::from_id(payload.next_frame()?.as_int()?)?,
                key: payload.next_frame()?.as_data()?,
                old_value: payload.next_frame()?.as_nullable_data()?,
                new_value: payload.next_frame()?.as_nullable_data()?,
                priming: payload.next_frame()?.as_nullable_long()?,
            })),
            EVENT_CACHE_NOTIFICATION => {
                let cache_name = payload.next_frame()?.as_string()?;
                let kind = if payload.next_frame()?.as_bool()? {
                    CacheNotificationKind::Destroyed
                } else {
                    CacheNotificationKind::Truncated
                };
                Ok(Event::Notification(CacheNotification { cache_name, kind }))
            }
            other => Err(ExtendError::ProtocolViolation(format!(
                "unknown event type id {:#06x}",
                other
            ))),
        }
    }
}

/// A message received by the client: either a response or a pushed event.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answers a request on the message's channel.
    Response(Response),
    /// Pushed without a request.
    Event(Event),
}

impl Inbound {
    /// Decodes a received message using the event flag to pick the table.
    pub fn decode(message: &Message) -> Result<Self> {
        if message.is_event() {
            Event::decode(message).map(Inbound::Event)
        } else {
            Response::decode(message).map(Inbound::Response)
        }
    }
}
