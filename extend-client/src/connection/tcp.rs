//! Transport over a single TCP stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use extend_core::protocol::{Message, MessageCodec};
use extend_core::{ExtendError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};

use super::transport::{Transport, TransportHandler};

/// A [`Transport`] that frames messages over TCP.
///
/// Writes are serialized through an async mutex around the write half.
/// Reads run on a dedicated task started by [`Transport::start`].
#[derive(Debug)]
pub struct TcpTransport {
    address: SocketAddr,
    reader: parking_lot::Mutex<Option<OwnedReadHalf>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Establishes a connection to the given address.
    pub async fn connect(address: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                ExtendError::Timeout(format!(
                    "connecting to {} took longer than {:?}",
                    address, timeout
                ))
            })?
            .map_err(|e| {
                ExtendError::ConnectionLost(format!("failed to connect to {}: {}", address, e))
            })?;

        stream.set_nodelay(true).map_err(|e| {
            ExtendError::ConnectionLost(format!("failed to set TCP_NODELAY: {}", e))
        })?;

        tracing::debug!(address = %address, "established connection");
        Ok(Self::from_stream(stream, address))
    }

    /// Wraps an established stream.
    pub fn from_stream(stream: TcpStream, address: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            address,
            reader: parking_lot::Mutex::new(Some(reader)),
            writer: tokio::sync::Mutex::new(Some(writer)),
            reader_task: parking_lot::Mutex::new(None),
        }
    }

    /// Returns the remote address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        address: SocketAddr,
        handler: Arc<dyn TransportHandler>,
    ) {
        let mut codec = MessageCodec::new();
        let mut read_buffer = BytesMut::with_capacity(8192);

        let error = loop {
            match codec.decode(&mut read_buffer) {
                Ok(Some(message)) => {
                    handler.on_message(message);
                    continue;
                }
                Ok(None) => {}
                Err(e) => break e,
            }

            match reader.read_buf(&mut read_buffer).await {
                Ok(0) if read_buffer.is_empty() => {
                    break ExtendError::ConnectionLost(format!("{} closed the connection", address))
                }
                Ok(0) => {
                    break ExtendError::ConnectionLost(format!(
                        "connection to {} closed unexpectedly",
                        address
                    ))
                }
                Ok(_) => {}
                Err(e) => {
                    break ExtendError::ConnectionLost(format!(
                        "failed to read from {}: {}",
                        address, e
                    ))
                }
            }
        };

        tracing::debug!(address = %address, error = %error, "reader stopped");
        handler.on_closed(error);
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn start(&self, handler: Arc<dyn TransportHandler>) -> Result<()> {
        let reader = self.reader.lock().take().ok_or_else(|| {
            ExtendError::ConnectionLost(format!("transport to {} already started", self.address))
        })?;
        let task = tokio::spawn(Self::read_loop(reader, self.address, handler));
        *self.reader_task.lock() = Some(task);
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut buf = BytesMut::new();
        MessageCodec::new().encode(message, &mut buf)?;

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(|| {
            ExtendError::ConnectionLost(format!("connection to {} is closed", self.address))
        })?;
        stream.write_all(&buf).await.map_err(|e| {
            ExtendError::ConnectionLost(format!("failed to write to {}: {}", self.address, e))
        })
    }

    async fn close(&self) {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        if let Some(mut stream) = self.writer.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        tracing::debug!(address = %self.address, "transport closed");
    }
}
