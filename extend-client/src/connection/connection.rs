//! The physical session with one peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use extend_core::protocol::{Inbound, Message};
use extend_core::{ExtendError, Result};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};

use super::channel::{Channel, ChannelEvent, CloseCause};
use super::transport::{Transport, TransportHandler};

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Events emitted during connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport started delivering messages.
    Connected {
        /// The connection identifier.
        id: ConnectionId,
    },
    /// The connection stopped; every channel has been failed.
    Disconnected {
        /// The connection identifier.
        id: ConnectionId,
        /// What ended the connection.
        reason: String,
    },
}

/// A session with one peer, carrying any number of channels.
///
/// Inbound messages are routed by the channel id in their header. Losing
/// the transport is terminal: every channel fails its outstanding requests
/// and event channels report the closure to their sink.
pub struct Connection {
    id: ConnectionId,
    transport: Arc<dyn Transport>,
    channels: RwLock<HashMap<i32, Arc<Channel>>>,
    next_channel_id: AtomicI32,
    closed: AtomicBool,
    event_sender: broadcast::Sender<ConnectionEvent>,
}

impl Connection {
    /// Starts `transport` and returns the connection fed by it.
    pub async fn open(transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        let (event_sender, _) = broadcast::channel(16);
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            transport,
            channels: RwLock::new(HashMap::new()),
            next_channel_id: AtomicI32::new(1),
            closed: AtomicBool::new(false),
            event_sender,
        });

        let handler = Arc::new(Handler {
            connection: Arc::downgrade(&connection),
        });
        connection.transport.start(handler).await?;

        tracing::debug!(id = %connection.id, "connection opened");
        let _ = connection
            .event_sender
            .send(ConnectionEvent::Connected { id: connection.id });
        Ok(connection)
    }

    /// Returns the connection's unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns `true` once the connection has stopped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Subscribes to connection lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_sender.subscribe()
    }

    /// Opens a channel for request/response traffic.
    pub fn open_channel(self: &Arc<Self>) -> Result<Arc<Channel>> {
        self.register_channel(None)
    }

    /// Opens a channel whose pushed events are forwarded to `sink`.
    ///
    /// Requests can be sent on an event channel too; interest registered
    /// through it binds pushed events to it.
    pub fn open_event_channel(
        self: &Arc<Self>,
        sink: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Arc<Channel>> {
        self.register_channel(Some(sink))
    }

    /// Returns the open channel with the given id.
    pub fn channel(&self, id: i32) -> Option<Arc<Channel>> {
        self.channels.read().get(&id).cloned()
    }

    /// Returns the number of open channels.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Closes a channel, failing its outstanding requests.
    ///
    /// Returns `false` if no channel with that id was open.
    pub fn close_channel(&self, id: i32) -> bool {
        let removed = self.channels.write().remove(&id);
        match removed {
            Some(channel) => {
                channel.fail_all(CloseCause::ChannelClosed(id));
                true
            }
            None => false,
        }
    }

    /// Routes one inbound message to its channel.
    ///
    /// Messages for unknown channels are dropped. A message that cannot be
    /// decoded tears the connection down.
    pub fn dispatch_incoming(&self, message: Message) {
        let channel_id = message.channel_id();
        let inbound = match Inbound::decode(&message) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::error!(id = %self.id, channel = channel_id, error = %e, "undecodable message");
                let cause = match e {
                    ExtendError::ProtocolViolation(reason) => CloseCause::ProtocolViolation(reason),
                    other => CloseCause::ProtocolViolation(other.to_string()),
                };
                if self.fail(cause) {
                    self.spawn_transport_close();
                }
                return;
            }
        };

        let Some(channel) = self.channel(channel_id) else {
            tracing::warn!(id = %self.id, channel = channel_id, "dropping message for unknown channel");
            return;
        };

        match inbound {
            Inbound::Response(response) => channel.on_response_received(response),
            Inbound::Event(event) => channel.on_event(event),
        }
    }

    /// Closes the connection and every channel on it.
    pub async fn close(&self) {
        if self.fail(CloseCause::ConnectionLost(format!(
            "connection {} closed by client",
            self.id
        ))) {
            self.transport.close().await;
        }
    }

    pub(crate) async fn transmit(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(ExtendError::ConnectionLost(format!(
                "connection {} is closed",
                self.id
            )));
        }
        self.transport.send(message).await
    }

    fn register_channel(
        self: &Arc<Self>,
        sink: Option<mpsc::UnboundedSender<ChannelEvent>>,
    ) -> Result<Arc<Channel>> {
        let mut channels = self.channels.write();
        if self.is_closed() {
            return Err(ExtendError::ConnectionLost(format!(
                "connection {} is closed",
                self.id
            )));
        }

        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let event_channel = sink.is_some();
        let channel = Arc::new(Channel::new(id, Arc::downgrade(self), sink));
        channels.insert(id, Arc::clone(&channel));
        tracing::debug!(id = %self.id, channel = id, event_channel, "channel opened");
        Ok(channel)
    }

    /// Marks the connection closed and fails every channel. Only the first
    /// call has any effect.
    fn fail(&self, cause: CloseCause) -> bool {
        let channels: Vec<_> = {
            let mut channels = self.channels.write();
            if self.closed.swap(true, Ordering::AcqRel) {
                drop(channels);
                tracing::warn!(id = %self.id, cause = %cause, "suppressed duplicate closure");
                return false;
            }
            channels.drain().map(|(_, channel)| channel).collect()
        };

        tracing::debug!(id = %self.id, channels = channels.len(), cause = %cause, "connection closed");
        for channel in channels {
            channel.fail_all(cause.clone());
        }
        let _ = self.event_sender.send(ConnectionEvent::Disconnected {
            id: self.id,
            reason: cause.to_string(),
        });
        true
    }

    fn spawn_transport_close(&self) {
        let transport = Arc::clone(&self.transport);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { transport.close().await });
            }
            Err(_) => tracing::warn!(id = %self.id, "no runtime to close the transport on"),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("channels", &self.channels.read().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Handler {
    connection: Weak<Connection>,
}

impl TransportHandler for Handler {
    fn on_message(&self, message: Message) {
        if let Some(connection) = self.connection.upgrade() {
            connection.dispatch_incoming(message);
        }
    }

    fn on_closed(&self, error: ExtendError) {
        let Some(connection) = self.connection.upgrade() else {
            return;
        };
        let cause = match error {
            ExtendError::ProtocolViolation(reason) => CloseCause::ProtocolViolation(reason),
            other => CloseCause::ConnectionLost(other.to_string()),
        };
        connection.fail(cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use extend_core::protocol::{Request, Response, ResponseBody};
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Records sent messages and lets the test inject inbound traffic.
    #[derive(Default)]
    struct ScriptedTransport {
        handler: Mutex<Option<Arc<dyn TransportHandler>>>,
        sent: Mutex<Vec<Message>>,
        closed: AtomicBool,
    }

    impl ScriptedTransport {
        fn deliver(&self, message: Message) {
            let handler = self.handler.lock().clone();
            if let Some(handler) = handler {
                handler.on_message(message);
            }
        }

        fn drop_link(&self, reason: &str) {
            let handler = self.handler.lock().clone();
            if let Some(handler) = handler {
                handler.on_closed(ExtendError::ConnectionLost(reason.to_string()));
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn start(&self, handler: Arc<dyn TransportHandler>) -> Result<()> {
            *self.handler.lock() = Some(handler);
            Ok(())
        }

        async fn send(&self, message: Message) -> Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn size_request() -> Request {
        Request::Size {
            cache: "dist-cache".to_string(),
        }
    }

    #[test]
    fn test_connection_id_uniqueness() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId(42);
        assert_eq!(id.to_string(), "conn-42");
        assert_eq!(id.value(), 42);
    }

    #[tokio::test]
    async fn test_channels_get_distinct_ids() {
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::open(transport).await.unwrap();

        let a = connection.open_channel().unwrap();
        let b = connection.open_channel().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(connection.channel_count(), 2);

        assert!(connection.close_channel(a.id()));
        assert!(!connection.close_channel(a.id()));
        assert!(a.is_closed());
        assert_eq!(connection.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_channel() {
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::open(Arc::clone(&transport) as Arc<dyn Transport>)
            .await
            .unwrap();
        let channel = connection.open_channel().unwrap();

        let pending = channel.send(&size_request()).await.unwrap();
        let sent = transport.sent.lock().pop().unwrap();
        assert_eq!(sent.channel_id(), channel.id());
        assert_eq!(sent.correlation_id(), pending.correlation_id());

        // same correlation id on another channel must not complete the slot
        transport.deliver(Response::new(pending.correlation_id(), ResponseBody::Int(9)).encode(99));
        assert_eq!(channel.pending_count(), 1);

        transport.deliver(
            Response::new(pending.correlation_id(), ResponseBody::Int(3)).encode(channel.id()),
        );
        let response = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(response.body, ResponseBody::Int(3));
    }

    #[tokio::test]
    async fn test_undecodable_message_is_fatal() {
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::open(Arc::clone(&transport) as Arc<dyn Transport>)
            .await
            .unwrap();
        let channel = connection.open_channel().unwrap();
        let pending = channel.send(&size_request()).await.unwrap();

        transport.deliver(Message::create(0x7777, pending.correlation_id(), channel.id()));

        assert!(matches!(
            pending.wait(Duration::from_secs(1)).await,
            Err(ExtendError::ProtocolViolation(_))
        ));
        assert!(connection.is_closed());
        assert!(connection.open_channel().is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_connection_loss_fails_every_channel() {
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::open(Arc::clone(&transport) as Arc<dyn Transport>)
            .await
            .unwrap();
        let mut lifecycle = connection.subscribe();

        let (sink, mut events) = mpsc::unbounded_channel();
        let first = connection.open_channel().unwrap();
        let second = connection.open_event_channel(sink).unwrap();
        let a = first.send(&size_request()).await.unwrap();
        let b = second.send(&size_request()).await.unwrap();

        transport.drop_link("peer reset");
        transport.drop_link("peer reset");

        let timeout = Duration::from_secs(1);
        assert!(matches!(a.wait(timeout).await, Err(ExtendError::ConnectionLost(_))));
        assert!(matches!(b.wait(timeout).await, Err(ExtendError::ConnectionLost(_))));
        assert!(matches!(events.recv().await, Some(ChannelEvent::Closed(_))));
        assert!(matches!(
            lifecycle.recv().await,
            Ok(ConnectionEvent::Disconnected { .. })
        ));
        assert!(matches!(
            first.send(&size_request()).await,
            Err(ExtendError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn test_close_stops_transport() {
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::open(Arc::clone(&transport) as Arc<dyn Transport>)
            .await
            .unwrap();
        connection.close().await;
        assert!(transport.closed.load(Ordering::SeqCst));
        assert!(connection.is_closed());
    }

    #[test]
    fn test_connection_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Connection>();
        assert_send_sync::<ConnectionId>();
    }
}
