//! Response messages.

use super::constants::*;
use super::frame::Frame;
use super::message::Message;
use crate::error::{ExtendError, Result};
use crate::serialization::Data;

/// A failure reported by the peer while executing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// One of [`error_codes`].
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl RemoteError {
    /// Creates a remote error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<RemoteError> for ExtendError {
    fn from(err: RemoteError) -> Self {
        match err.code {
            error_codes::AGGREGATION_TYPE_MISMATCH => {
                ExtendError::AggregationTypeMismatch(err.message)
            }
            code => ExtendError::Remote {
                code,
                message: err.message,
            },
        }
    }
}

/// The payload of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The operation produced no value.
    Unit,
    /// An optional value, such as the previous mapping of a key.
    Value(Option<Data>),
    /// A 32-bit count.
    Int(i32),
    /// A yes/no answer.
    Bool(bool),
    /// An aggregation result; `None` means no entry contributed.
    Aggregate(Option<Data>),
    /// The operation failed on the peer.
    Error(RemoteError),
}

/// A response correlated to one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Correlation id of the request this answers.
    pub correlation_id: i64,
    /// Result or error.
    pub body: ResponseBody,
}

impl Response {
    /// Creates a response.
    pub fn new(correlation_id: i64, body: ResponseBody) -> Self {
        Self {
            correlation_id,
            body,
        }
    }

    /// Returns the wire type id of this response.
    pub fn type_id(&self) -> i32 {
        match self.body {
            ResponseBody::Unit => RESPONSE_UNIT,
            ResponseBody::Value(_) => RESPONSE_VALUE,
            ResponseBody::Int(_) => RESPONSE_INT,
            ResponseBody::Bool(_) => RESPONSE_BOOL,
            ResponseBody::Aggregate(_) => RESPONSE_AGGREGATE,
            ResponseBody::Error(_) => RESPONSE_ERROR,
        }
    }

    /// Encodes this response into a message on the given channel.
    pub fn encode(&self, channel_id: i32) -> Message {
        let mut message = Message::create(self.type_id(), self.correlation_id, channel_id);
        match &self.body {
            ResponseBody::Unit => {}
            ResponseBody::Value(value) | ResponseBody::Aggregate(value) => {
                message.add_frame(Frame::nullable_data(value.as_ref()));
            }
            ResponseBody::Int(value) => message.add_frame(Frame::int(*value)),
            ResponseBody::Bool(value) => message.add_frame(Frame::bool(*value)),
            ResponseBody::Error(err) => {
                message.add_frame(Frame::int(err.code));
                message.add_frame(Frame::string(&err.message));
            }
        }
        message
    }

    /// Decodes a response, dispatching on the message type id.
    ///
    /// An unknown type id is a protocol violation.
    pub fn decode(message: &Message) -> Result<Self> {
        let mut payload = message.payload();
        let body = match message.message_type() {
            RESPONSE_UNIT => ResponseBody::Unit,
            RESPONSE_VALUE => ResponseBody::Value(payload.next_frame()?.as_nullable_data()?),
            RESPONSE_INT => ResponseBody::Int(payload.next_frame()?.as_int()?),
            RESPONSE_BOOL => ResponseBody::Bool(payload.next_frame()?.as_bool()?),
            RESPONSE_AGGREGATE => {
                ResponseBody::Aggregate(payload.next_frame()?.as_nullable_data()?)
            }
            RESPONSE_ERROR => ResponseBody::Error(RemoteError {
                code: payload.next_frame()?.as_int()?,
                message: payload.next_frame()?.as_string()?,
            }),
            other => {
                return Err(ExtendError::ProtocolViolation(format!(
                    "unknown response type id {:#06x}",
                    other
                )))
            }
        };
        Ok(Self::new(message.correlation_id(), body))
    }

    /// Converts a carried remote error into `Err`.
    pub fn into_result(self) -> Result<ResponseBody> {
        match self.body {
            ResponseBody::Error(err) => Err(err.into()),
            body => Ok(body),
        }
    }
}

impl ResponseBody {
    /// Expects [`ResponseBody::Unit`].
    pub fn into_unit(self) -> Result<()> {
        match self {
            ResponseBody::Unit => Ok(()),
            other => Err(unexpected("unit", &other)),
        }
    }

    /// Expects [`ResponseBody::Value`].
    pub fn into_value(self) -> Result<Option<Data>> {
        match self {
            ResponseBody::Value(value) => Ok(value),
            other => Err(unexpected("value", &other)),
        }
    }

    /// Expects [`ResponseBody::Int`].
    pub fn into_int(self) -> Result<i32> {
        match self {
            ResponseBody::Int(value) => Ok(value),
            other => Err(unexpected("int", &other)),
        }
    }

    /// Expects [`ResponseBody::Bool`].
    pub fn into_bool(self) -> Result<bool> {
        match self {
            ResponseBody::Bool(value) => Ok(value),
            other => Err(unexpected("bool", &other)),
        }
    }

    /// Expects [`ResponseBody::Aggregate`].
    pub fn into_aggregate(self) -> Result<Option<Data>> {
        match self {
            ResponseBody::Aggregate(value) => Ok(value),
            other => Err(unexpected("aggregate", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &ResponseBody) -> ExtendError {
    ExtendError::ProtocolViolation(format!(
        "expected a {} response, got {:?}",
        expected, got
    ))
}
