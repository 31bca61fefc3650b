//! Connection, channel and transport layers.

mod channel;
mod connection;
mod tcp;
mod transport;

pub use channel::{Channel, ChannelEvent, PendingResponse};
pub use connection::{Connection, ConnectionEvent, ConnectionId};
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportHandler};
