//! The seam between the channel layer and the bytes on the wire.

use std::sync::Arc;

use async_trait::async_trait;
use extend_core::protocol::Message;
use extend_core::{ExtendError, Result};

/// Receives everything a [`Transport`] reads from its peer.
///
/// Called from the transport's receiving task. Implementations must not
/// block; a slow handler stalls every channel on the connection.
pub trait TransportHandler: Send + Sync {
    /// Called once per complete message, in arrival order.
    fn on_message(&self, message: Message);

    /// Called once when the transport can no longer deliver messages.
    ///
    /// `error` is a [`ExtendError::ProtocolViolation`] when the inbound byte
    /// stream could not be framed.
    fn on_closed(&self, error: ExtendError);
}

/// Carries complete messages between the client and one peer.
///
/// Framing, sockets and TLS belong to the implementation. The connection
/// calls [`Transport::start`] exactly once before the first send.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begins delivering inbound messages to `handler`.
    async fn start(&self, handler: Arc<dyn TransportHandler>) -> Result<()>;

    /// Sends one message.
    async fn send(&self, message: Message) -> Result<()>;

    /// Stops the transport. The handler must not be called afterwards,
    /// except for a final [`TransportHandler::on_closed`].
    async fn close(&self);
}
