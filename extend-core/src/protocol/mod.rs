//! Extend wire protocol implementation.
//!
//! This module provides the frame and message envelope, the codec used by
//! framed transports, and the typeId-keyed request, response and event
//! tables.

mod codec;
pub mod constants;
mod event;
mod frame;
mod message;
mod request;
mod response;

pub use codec::MessageCodec;
pub use constants::*;
pub use event::{CacheNotification, CacheNotificationKind, Event, Inbound, MapEvent, MapEventKind};
pub use frame::Frame;
pub use message::{FrameCursor, Message};
pub use request::Request;
pub use response::{RemoteError, Response, ResponseBody};
