// ============================================
// File: crates/burrow-transport/src/tcp.rs
// ============================================
//! # TCP Transport
//!
//! ## Creation Reason
//! Client-initiated TCP is what gets through CGNAT. Each message is
//! length-prefixed so frame boundaries survive the byte stream.
//!
//! ## Stream Format
//! ```text
//! ┌──────────────┬────────────────────────┐
//! │ len (u16 BE) │ message (len bytes)    │  repeated
//! └──────────────┴────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The length is checked against the limit BEFORE the body buffer is
//!   allocated
//! - Read and write halves sit behind separate async mutexes so one task
//!   can block in `recv` while another sends
//! - Plain TCP presents no peer certificate; server identity comes from
//!   the signed handshake
//!
//! ## Last Modified
//! v0.1.0 - Initial TCP transport

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Connector, Listener, PeerCertificate, Transport};

// ============================================
// Constants
// ============================================

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest message the prefix can describe.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Default dial timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================
// TcpTransport
// ============================================

/// Length-prefixed message transport over one TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    peer: SocketAddr,
    max_message: usize,
    closed: AtomicBool,
}

impl TcpTransport {
    /// Wraps a connected stream.
    ///
    /// # Errors
    /// Returns `Io` if the peer address cannot be read.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::io("read peer address", e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::io("set TCP_NODELAY", e))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer,
            max_message: MAX_MESSAGE_SIZE,
            closed: AtomicBool::new(false),
        })
    }

    /// Lowers the accepted message size.
    #[must_use]
    pub fn with_max_message(mut self, max_message: usize) -> Self {
        self.max_message = max_message.min(MAX_MESSAGE_SIZE);
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, message: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let len = u16::try_from(message.len())
            .ok()
            .filter(|_| message.len() <= self.max_message)
            .ok_or(TransportError::MessageTooLarge {
                size: message.len(),
                limit: self.max_message,
            })?;

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + message.len());
        buf.put_u16(len);
        buf.put_slice(message);

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&buf)
            .await
            .map_err(|e| TransportError::from_stream("tcp send", e))
    }

    async fn recv(&self) -> Result<Bytes> {
        self.ensure_open()?;
        let mut reader = self.reader.lock().await;

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        reader
            .read_exact(&mut prefix)
            .await
            .map_err(|e| TransportError::from_stream("tcp recv header", e))?;
        let len = usize::from(u16::from_be_bytes(prefix));
        if len > self.max_message {
            return Err(TransportError::MessageTooLarge {
                size: len,
                limit: self.max_message,
            });
        }

        let mut body = vec![0u8; len];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| TransportError::from_stream("tcp recv body", e))?;
        Ok(Bytes::from(body))
    }

    fn peer_certificate(&self) -> Option<PeerCertificate> {
        None
    }

    fn peer_addr(&self) -> String {
        self.peer.to_string()
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(peer = %self.peer, "Closing TCP transport");
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) => match TransportError::from_stream("tcp shutdown", e) {
                TransportError::ConnectionClosed => Ok(()),
                other => Err(other),
            },
        }
    }
}

// ============================================
// TcpConnector
// ============================================

/// Dials TCP transports with a timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector with the given dial timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn dial(&self, addr: &str) -> Result<Box<dyn Transport>> {
        debug!(%addr, "Dialing TCP");
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::timeout(format!("connect to {addr}")))?
            .map_err(|e| TransportError::connect_failed(addr, e.to_string()))?;
        Ok(Box::new(TcpTransport::from_stream(stream)?))
    }
}

// ============================================
// TcpTransportListener
// ============================================

/// Accepts TCP transports.
#[derive(Debug)]
pub struct TcpTransportListener {
    listener: TcpListener,
    local: SocketAddr,
}

impl TcpTransportListener {
    /// Binds to `addr`.
    ///
    /// # Errors
    /// Returns `BindFailed` if the address is unavailable.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::bind_failed(addr.to_string(), e.to_string()))?;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::io("read local address", e))?;
        info!(addr = %local, "TCP listener bound");
        Ok(Self { listener, local })
    }
}

#[async_trait]
impl Listener for TcpTransportListener {
    async fn accept(&self) -> Result<Box<dyn Transport>> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::io("tcp accept", e))?;
        debug!(%peer, "Accepted TCP connection");
        Ok(Box::new(TcpTransport::from_stream(stream)?))
    }

    fn local_addr(&self) -> String {
        self.local.to_string()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected_pair() -> (Box<dyn Transport>, Box<dyn Transport>) {
        let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let client = TcpConnector::default().dial(&addr).await.unwrap();
        let server = accept.await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_message_boundaries_preserved() {
        let (client, server) = connected_pair().await;
        client.send(b"first").await.unwrap();
        client.send(b"").await.unwrap();
        client.send(&[7u8; 1500]).await.unwrap();

        assert_eq!(&server.recv().await.unwrap()[..], b"first");
        assert!(server.recv().await.unwrap().is_empty());
        assert_eq!(server.recv().await.unwrap().len(), 1500);
    }

    #[tokio::test]
    async fn test_concurrent_send_and_recv() {
        let (client, server) = connected_pair().await;
        let client = std::sync::Arc::new(client);
        let reader = {
            let client = client.clone();
            tokio::spawn(async move { client.recv().await.unwrap() })
        };
        client.send(b"ping").await.unwrap();
        assert_eq!(&server.recv().await.unwrap()[..], b"ping");
        server.send(b"pong").await.unwrap();
        assert_eq!(&reader.await.unwrap()[..], b"pong");
    }

    #[tokio::test]
    async fn test_oversized_send_rejected() {
        let (client, _server) = connected_pair().await;
        let err = client.send(&vec![0u8; MAX_MESSAGE_SIZE + 1]).await.unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_lowered_limit_applies_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let near = TcpTransport::from_stream(TcpStream::connect(addr).await.unwrap())
            .unwrap()
            .with_max_message(16);
        let far = TcpTransport::from_stream(accept.await.unwrap()).unwrap();

        assert!(matches!(
            near.send(&[1u8; 17]).await,
            Err(TransportError::MessageTooLarge { limit: 16, .. })
        ));
        far.send(&[2u8; 32]).await.unwrap();
        assert!(matches!(
            near.recv().await,
            Err(TransportError::MessageTooLarge { size: 32, limit: 16 })
        ));
    }

    #[tokio::test]
    async fn test_close_is_seen_by_peer() {
        let (client, server) = connected_pair().await;
        client.close().await.unwrap();
        assert!(matches!(
            server.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
        assert!(matches!(
            client.send(b"late").await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr();
        drop(listener);
        let err = TcpConnector::new(Duration::from_secs(2))
            .dial(&addr)
            .await
            .err()
            .unwrap();
        assert!(err.is_connection_error());
    }
}
