// ============================================
// File: crates/burrow-client/src/pump.rs
// ============================================
//! # Data Plane Pump
//!
//! ## Creation Reason
//! Moves IP packets between the local adapter and the tunnel for one
//! session, and sorts everything that arrives into "delivered",
//! "dropped" or "for the driver".
//!
//! ## Main Functionality
//! ```text
//! adapter.read_packet ──► TunnelRecord::Packet ──► FrameCodec::encode ──► transport.send
//!
//! transport.recv ──► FrameCodec::decode ──┬─► Packet  ──► adapter.write_packet
//!                                         ├─► Control ──► Inbound::Control (driver)
//!                                         └─► error   ──► counted, dropped
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Per-packet failures never end the connection; only `SessionExpired`
//!   and transport errors do
//! - Oversized frames are logged once per connection (`reset()`)
//!
//! ## Last Modified
//! v0.1.0 - Initial pump

use std::sync::Arc;

use tracing::{debug, warn};

use burrow_core::{ControlMessage, CoreError, FrameCodec, SessionCipher, TunnelRecord};
use burrow_transport::{Transport, VirtualAdapter};

use crate::error::Result;
use crate::stats::ClientStats;

/// What became of one inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Packet written to the adapter.
    Delivered,
    /// Control message for the driver.
    Control(ControlMessage),
    /// Frame dropped and counted.
    Dropped,
    /// Frame failed authentication and was counted.
    AuthFailure,
    /// The session cipher is no longer usable.
    SessionExpired,
}

/// Packet encode/decode for the current connection.
pub struct Pump {
    codec: FrameCodec,
    adapter: Arc<dyn VirtualAdapter>,
    stats: Arc<ClientStats>,
    oversize_logged: bool,
}

impl Pump {
    /// Creates a pump sized for the adapter MTU.
    #[must_use]
    pub fn new(adapter: Arc<dyn VirtualAdapter>, stats: Arc<ClientStats>) -> Self {
        Self {
            codec: FrameCodec::for_mtu(adapter.mtu()),
            adapter,
            stats,
            oversize_logged: false,
        }
    }

    /// Starts a new connection.
    pub fn reset(&mut self) {
        self.oversize_logged = false;
    }

    /// Seals and sends one IP packet.
    ///
    /// Oversized packets and an exhausted nonce space drop the packet.
    ///
    /// # Errors
    /// Transport failures, or `SessionExpired` once the cipher is gone.
    pub async fn send_packet(
        &mut self,
        transport: &dyn Transport,
        cipher: &SessionCipher,
        packet: &[u8],
    ) -> Result<()> {
        let record = TunnelRecord::encode_packet(packet);
        let frame = match self.codec.encode(&record, cipher) {
            Ok(frame) => frame,
            Err(CoreError::SessionExpired) => return Err(CoreError::SessionExpired.into()),
            Err(e) => {
                self.note_drop(&e);
                return Ok(());
            }
        };
        transport.send(&frame).await?;
        self.stats.record_sent(packet.len());
        Ok(())
    }

    /// Seals and sends one control message.
    ///
    /// # Errors
    /// Codec or transport failures.
    pub async fn send_control(
        &self,
        transport: &dyn Transport,
        cipher: &SessionCipher,
        message: &ControlMessage,
    ) -> Result<()> {
        let record = TunnelRecord::Control(message.clone()).encode();
        let frame = self.codec.encode(&record, cipher)?;
        transport.send(&frame).await?;
        Ok(())
    }

    /// Opens one inbound frame and delivers it if it carries a packet.
    pub async fn receive(&mut self, frame: &[u8], cipher: &SessionCipher) -> Inbound {
        let plaintext = match self.codec.decode(frame, cipher) {
            Ok(plaintext) => plaintext,
            Err(CoreError::SessionExpired) => return Inbound::SessionExpired,
            Err(CoreError::ReplayDetected { sequence }) => {
                debug!(sequence, "Replayed frame dropped");
                self.stats.record_replay();
                return Inbound::Dropped;
            }
            Err(CoreError::AuthenticationFailed) => {
                self.stats.record_auth_failure();
                return Inbound::AuthFailure;
            }
            Err(e) => {
                self.note_drop(&e);
                return Inbound::Dropped;
            }
        };

        match TunnelRecord::decode(plaintext) {
            Ok(TunnelRecord::Packet(packet)) => {
                if let Err(e) = self.adapter.write_packet(&packet).await {
                    warn!(adapter = self.adapter.name(), error = %e, "Adapter write failed");
                    self.stats.record_dropped(1);
                    return Inbound::Dropped;
                }
                self.stats.record_received(packet.len());
                Inbound::Delivered
            }
            Ok(TunnelRecord::Control(message)) => Inbound::Control(message),
            Err(e) => {
                self.note_drop(&e);
                Inbound::Dropped
            }
        }
    }

    fn note_drop(&mut self, err: &CoreError) {
        self.stats.record_dropped(1);
        if matches!(err, CoreError::OversizedFrame { .. }) {
            if !self.oversize_logged {
                self.oversize_logged = true;
                warn!(error = %err, "Oversized frame dropped; further ones on this connection are silent");
            }
        } else {
            debug!(error = %err, "Frame dropped");
        }
    }
}

impl std::fmt::Debug for Pump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump")
            .field("adapter", &self.adapter.name())
            .field("max_plaintext", &self.codec.max_plaintext())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use bytes::Bytes;

    use burrow_common::SystemClock;
    use burrow_core::{CipherConfig, DirectionKeys, SessionKey};
    use burrow_transport::{MemoryTransport, MockAdapter};

    use super::*;

    fn ciphers() -> (SessionCipher, SessionCipher) {
        let keys = DirectionKeys {
            client_to_server: SessionKey::from_bytes([1u8; 32]),
            server_to_client: SessionKey::from_bytes([2u8; 32]),
        };
        (
            SessionCipher::for_client(&keys, SystemClock::shared(), CipherConfig::default()),
            SessionCipher::for_server(&keys, SystemClock::shared(), CipherConfig::default()),
        )
    }

    fn pump() -> (Pump, Arc<MockAdapter>, Arc<ClientStats>) {
        let adapter = Arc::new(MockAdapter::default());
        let stats = Arc::new(ClientStats::default());
        let pump = Pump::new(adapter.clone(), stats.clone());
        (pump, adapter, stats)
    }

    #[tokio::test]
    async fn test_send_packet_reaches_peer() {
        let (mut pump, _adapter, stats) = pump();
        let (client, server) = ciphers();
        let (ours, theirs) = MemoryTransport::pair();

        pump.send_packet(&ours, &client, b"\x45packet").await.unwrap();

        let frame = theirs.recv().await.unwrap();
        let plain = FrameCodec::for_mtu(1420).decode(&frame, &server).unwrap();
        assert_eq!(
            TunnelRecord::decode(plain).unwrap(),
            TunnelRecord::Packet(Bytes::from_static(b"\x45packet"))
        );
        assert_eq!(stats.snapshot(Instant::now()).packets_sent, 1);
    }

    #[tokio::test]
    async fn test_receive_sorts_frames() {
        let (mut pump, adapter, stats) = pump();
        let (client, server) = ciphers();
        let codec = FrameCodec::for_mtu(1420);

        let packet = codec
            .encode(&TunnelRecord::encode_packet(b"\x45data"), &server)
            .unwrap();
        assert_eq!(pump.receive(&packet, &client).await, Inbound::Delivered);
        assert_eq!(&adapter.take_written()[0][..], b"\x45data");

        let pong = codec
            .encode(&TunnelRecord::Control(ControlMessage::Pong).encode(), &server)
            .unwrap();
        assert_eq!(
            pump.receive(&pong, &client).await,
            Inbound::Control(ControlMessage::Pong)
        );

        assert_eq!(pump.receive(&packet, &client).await, Inbound::Dropped);

        let mut tampered = codec
            .encode(&TunnelRecord::encode_packet(b"\x45more"), &server)
            .unwrap()
            .to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert_eq!(pump.receive(&tampered, &client).await, Inbound::AuthFailure);

        let snap = stats.snapshot(Instant::now());
        assert_eq!(snap.packets_received, 1);
        assert_eq!(snap.replays_blocked, 1);
        assert_eq!(snap.auth_failures, 1);
        assert_eq!(snap.packets_dropped, 2);
    }

    #[tokio::test]
    async fn test_oversized_packet_dropped_not_fatal() {
        let (mut pump, _adapter, stats) = pump();
        let (client, _server) = ciphers();
        let (ours, _theirs) = MemoryTransport::pair();

        let jumbo = vec![0x45u8; 4000];
        pump.send_packet(&ours, &client, &jumbo).await.unwrap();
        pump.send_packet(&ours, &client, &jumbo).await.unwrap();
        assert_eq!(stats.snapshot(Instant::now()).packets_dropped, 2);
        assert!(pump.oversize_logged);
    }

    #[tokio::test]
    async fn test_invalidated_cipher_reports_expiry() {
        let (mut pump, _adapter, _stats) = pump();
        let (client, server) = ciphers();
        let (ours, _theirs) = MemoryTransport::pair();
        let frame = FrameCodec::for_mtu(1420)
            .encode(&TunnelRecord::encode_packet(b"\x45x"), &server)
            .unwrap();

        client.invalidate();
        assert_eq!(pump.receive(&frame, &client).await, Inbound::SessionExpired);
        assert!(pump.send_packet(&ours, &client, b"\x45x").await.is_err());
    }
}
