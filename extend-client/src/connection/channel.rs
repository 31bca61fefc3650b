//! Logical conversations multiplexed over one connection.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use extend_core::protocol::{Event, Request, Response, NO_CORRELATION_ID};
use extend_core::{ExtendError, Result};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::connection::Connection;

/// Items delivered to the sink of an event channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// An event pushed by the peer.
    Event(Event),
    /// The channel stopped; no further events follow.
    Closed(String),
}

/// Why a channel stopped.
#[derive(Debug, Clone)]
pub(crate) enum CloseCause {
    /// The channel was closed locally.
    ChannelClosed(i32),
    /// The transport failed or the connection was closed.
    ConnectionLost(String),
    /// An inbound message could not be decoded.
    ProtocolViolation(String),
}

impl CloseCause {
    fn to_error(&self) -> ExtendError {
        match self {
            CloseCause::ChannelClosed(id) => {
                ExtendError::ConnectionLost(format!("channel {} was closed", id))
            }
            CloseCause::ConnectionLost(reason) => ExtendError::ConnectionLost(reason.clone()),
            CloseCause::ProtocolViolation(reason) => {
                ExtendError::ProtocolViolation(reason.clone())
            }
        }
    }
}

impl std::fmt::Display for CloseCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

type Slot = oneshot::Sender<Result<Response>>;

#[derive(Default)]
struct State {
    pending: HashMap<i64, Slot>,
    closed: Option<CloseCause>,
}

/// A logical conversation with the peer.
///
/// A channel owns the table of requests it has sent and not yet seen
/// answered. Every slot in the table is retired exactly once: by its
/// response, by a timeout, by cancellation or by the channel closing.
/// The table lock is never held across an `.await`.
pub struct Channel {
    id: i32,
    connection: Weak<Connection>,
    state: Mutex<State>,
    next_correlation_id: AtomicI64,
    events: Option<mpsc::UnboundedSender<ChannelEvent>>,
}

impl Channel {
    pub(crate) fn new(
        id: i32,
        connection: Weak<Connection>,
        events: Option<mpsc::UnboundedSender<ChannelEvent>>,
    ) -> Self {
        Self {
            id,
            connection,
            state: Mutex::new(State::default()),
            next_correlation_id: AtomicI64::new(1),
            events,
        }
    }

    /// Returns the channel id carried in every message header.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns `true` if pushed events on this channel reach a sink.
    pub fn is_event_channel(&self) -> bool {
        self.events.is_some()
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` once the channel has stopped.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    /// Sends a request and returns a handle to its future response.
    ///
    /// Safe to call concurrently. The correlation id is unique among the
    /// requests outstanding on this channel.
    pub async fn send(self: &Arc<Self>, request: &Request) -> Result<PendingResponse> {
        let connection = self.connection.upgrade().ok_or_else(|| {
            ExtendError::ConnectionLost(format!("connection of channel {} was dropped", self.id))
        })?;

        let (tx, rx) = oneshot::channel();
        let correlation_id = self.register(tx)?;
        let pending = PendingResponse {
            channel: Arc::clone(self),
            correlation_id,
            receiver: rx,
            retired: false,
        };

        tracing::debug!(
            channel = self.id,
            correlation_id,
            request_type = format_args!("{:#06x}", request.type_id()),
            "sending request"
        );
        connection
            .transmit(request.encode(correlation_id, self.id))
            .await?;
        Ok(pending)
    }

    /// Waits for the response to `pending`, at most `timeout`.
    ///
    /// On timeout the slot is retired and a late response is dropped.
    pub async fn await_response(
        &self,
        pending: PendingResponse,
        timeout: Duration,
    ) -> Result<Response> {
        if pending.channel.id != self.id {
            return Err(ExtendError::Cancelled(format!(
                "request {} belongs to channel {}, not {}",
                pending.correlation_id, pending.channel.id, self.id
            )));
        }
        pending.wait(timeout).await
    }

    /// Abandons `pending`. Returns `true` if the slot was still outstanding.
    ///
    /// Work already running on the peer is not retracted.
    pub fn cancel(&self, mut pending: PendingResponse) -> bool {
        pending.retired = true;
        let retired = pending.channel.retire(pending.correlation_id);
        if retired {
            tracing::debug!(
                channel = self.id,
                correlation_id = pending.correlation_id,
                "request cancelled"
            );
        }
        retired
    }

    /// Completes the slot matching `response`.
    ///
    /// A response with no outstanding slot (already timed out, cancelled or
    /// duplicated) is dropped.
    pub fn on_response_received(&self, response: Response) {
        let correlation_id = response.correlation_id;
        let mut state = self.state.lock();
        match state.pending.remove(&correlation_id) {
            Some(slot) => {
                tracing::debug!(channel = self.id, correlation_id, "response correlated");
                let _ = slot.send(Ok(response));
            }
            None => tracing::warn!(
                channel = self.id,
                correlation_id,
                "dropping response with no pending request"
            ),
        }
    }

    pub(crate) fn on_event(&self, event: Event) {
        match &self.events {
            Some(sink) => {
                if sink.send(ChannelEvent::Event(event)).is_err() {
                    tracing::debug!(channel = self.id, "event sink is gone");
                }
            }
            None => tracing::warn!(channel = self.id, "dropping event on a request channel"),
        }
    }

    /// Fails every outstanding slot and refuses further sends.
    pub(crate) fn fail_all(&self, cause: CloseCause) {
        let pending = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return;
            }
            state.closed = Some(cause.clone());
            std::mem::take(&mut state.pending)
        };

        tracing::debug!(
            channel = self.id,
            pending = pending.len(),
            cause = %cause,
            "channel closed"
        );
        for (_, slot) in pending {
            let _ = slot.send(Err(cause.to_error()));
        }
        if let Some(sink) = &self.events {
            let _ = sink.send(ChannelEvent::Closed(cause.to_string()));
        }
    }

    fn register(&self, slot: Slot) -> Result<i64> {
        let mut state = self.state.lock();
        if let Some(cause) = &state.closed {
            return Err(cause.to_error());
        }

        loop {
            let id = self.next_correlation_id.fetch_add(1, Ordering::Relaxed);
            if id == NO_CORRELATION_ID {
                continue;
            }
            if let Entry::Vacant(entry) = state.pending.entry(id) {
                entry.insert(slot);
                return Ok(id);
            }
        }
    }

    /// Removes the slot for `correlation_id`. Only the first caller wins.
    fn retire(&self, correlation_id: i64) -> bool {
        self.state.lock().pending.remove(&correlation_id).is_some()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .field("event_channel", &self.events.is_some())
            .finish()
    }
}

/// A request that was sent and not yet answered.
///
/// Dropping the handle retires its slot, so a response arriving afterwards
/// is discarded.
#[derive(Debug)]
pub struct PendingResponse {
    channel: Arc<Channel>,
    correlation_id: i64,
    receiver: oneshot::Receiver<Result<Response>>,
    retired: bool,
}

impl PendingResponse {
    /// Returns the correlation id assigned to the request.
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    /// Waits for the response, at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<Response> {
        let outcome = tokio::time::timeout(timeout, &mut self.receiver).await;
        self.retired = true;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ExtendError::ConnectionLost(format!(
                "channel {} dropped request {}",
                self.channel.id, self.correlation_id
            ))),
            Err(_) if self.channel.retire(self.correlation_id) => {
                Err(ExtendError::Timeout(format!(
                    "no response to request {} on channel {} within {:?}",
                    self.correlation_id, self.channel.id, timeout
                )))
            }
            // the slot was completed while the timer fired
            Err(_) => self.receiver.try_recv().unwrap_or_else(|_| {
                Err(ExtendError::Timeout(format!(
                    "no response to request {} on channel {} within {:?}",
                    self.correlation_id, self.channel.id, timeout
                )))
            }),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.retired {
            self.channel.retire(self.correlation_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extend_core::protocol::ResponseBody;

    fn detached(id: i32) -> Arc<Channel> {
        Arc::new(Channel::new(id, Weak::new(), None))
    }

    fn pending_on(channel: &Arc<Channel>) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let correlation_id = channel.register(tx).unwrap();
        PendingResponse {
            channel: Arc::clone(channel),
            correlation_id,
            receiver: rx,
            retired: false,
        }
    }

    #[tokio::test]
    async fn test_response_reaches_matching_request() {
        let channel = detached(1);
        let first = pending_on(&channel);
        let second = pending_on(&channel);
        assert_ne!(first.correlation_id(), second.correlation_id());

        channel.on_response_received(Response::new(second.correlation_id(), ResponseBody::Int(2)));
        channel.on_response_received(Response::new(first.correlation_id(), ResponseBody::Int(1)));

        let timeout = Duration::from_secs(1);
        assert_eq!(
            channel.await_response(first, timeout).await.unwrap().body,
            ResponseBody::Int(1)
        );
        assert_eq!(
            channel.await_response(second, timeout).await.unwrap().body,
            ResponseBody::Int(2)
        );
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_retires_only_its_slot() {
        let channel = detached(1);
        let slow = pending_on(&channel);
        let other = pending_on(&channel);
        let slow_id = slow.correlation_id();

        let err = channel
            .await_response(slow, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtendError::Timeout(_)));
        assert_eq!(channel.pending_count(), 1);

        // late response is dropped without disturbing the other request
        channel.on_response_received(Response::new(slow_id, ResponseBody::Unit));
        channel.on_response_received(Response::new(other.correlation_id(), ResponseBody::Bool(true)));
        assert_eq!(
            other.wait(Duration::from_secs(1)).await.unwrap().body,
            ResponseBody::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_with_response() {
        let channel = detached(1);
        let pending = pending_on(&channel);
        let id = pending.correlation_id();

        assert!(channel.cancel(pending));
        assert_eq!(channel.pending_count(), 0);
        channel.on_response_received(Response::new(id, ResponseBody::Unit));
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_retires_slot() {
        let channel = detached(1);
        drop(pending_on(&channel));
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_all_wakes_every_waiter() {
        let channel = detached(4);
        let first = pending_on(&channel);
        let second = pending_on(&channel);

        channel.fail_all(CloseCause::ConnectionLost("peer reset".to_string()));

        let timeout = Duration::from_secs(1);
        assert!(matches!(
            first.wait(timeout).await,
            Err(ExtendError::ConnectionLost(_))
        ));
        assert!(matches!(
            second.wait(timeout).await,
            Err(ExtendError::ConnectionLost(_))
        ));

        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            channel.register(tx),
            Err(ExtendError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn test_protocol_violation_cause() {
        let channel = detached(4);
        let pending = pending_on(&channel);
        channel.fail_all(CloseCause::ProtocolViolation("unknown type id".to_string()));
        assert!(matches!(
            pending.wait(Duration::from_secs(1)).await,
            Err(ExtendError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_event_channel_reports_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = Channel::new(2, Weak::new(), Some(tx));
        assert!(channel.is_event_channel());

        channel.fail_all(CloseCause::ChannelClosed(2));
        channel.fail_all(CloseCause::ChannelClosed(2));

        assert!(matches!(rx.recv().await, Some(ChannelEvent::Closed(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let channel = detached(1);
        let request = Request::Size {
            cache: "dist-cache".to_string(),
        };
        assert!(matches!(
            channel.send(&request).await,
            Err(ExtendError::ConnectionLost(_))
        ));
    }

    #[test]
    fn test_channel_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Channel>();
        assert_send_sync::<PendingResponse>();
    }
}
