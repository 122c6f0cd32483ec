// ============================================
// File: crates/burrow-core/src/protocol/record.rs
// ============================================
//! # Tunnel Records
//!
//! The plaintext inside every packet frame is one record:
//!
//! ```text
//! ┌────────┬──────────────────────────────────────┐
//! │ kind   │ body                                 │
//! │ 0x00   │ raw IP packet                        │
//! │ 0x01   │ control message (see `ControlCodec`) │
//! └────────┴──────────────────────────────────────┘
//! ```
//!
//! Keepalives are control records carrying `Ping` / `Pong`, whose
//! payload is empty.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CoreError, Result};
use crate::protocol::codec::ControlCodec;
use crate::protocol::messages::ControlMessage;

/// Record kind for IP packets.
pub const RECORD_KIND_PACKET: u8 = 0x00;

/// Record kind for control messages.
pub const RECORD_KIND_CONTROL: u8 = 0x01;

/// One decrypted tunnel record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelRecord {
    /// IP packet for the virtual adapter.
    Packet(Bytes),
    /// Control message.
    Control(ControlMessage),
}

impl TunnelRecord {
    /// Serializes the record into frame plaintext.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        match self {
            Self::Packet(packet) => Self::encode_packet(packet),
            Self::Control(msg) => {
                let body = ControlCodec::new().encode(msg);
                let mut buf = BytesMut::with_capacity(1 + body.len());
                buf.put_u8(RECORD_KIND_CONTROL);
                buf.put_slice(&body);
                buf
            }
        }
    }

    /// Serializes an IP packet record without cloning into a `Bytes`.
    #[must_use]
    pub fn encode_packet(packet: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1 + packet.len());
        buf.put_u8(RECORD_KIND_PACKET);
        buf.put_slice(packet);
        buf
    }

    /// Parses frame plaintext.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on an empty or unknown record, or the
    /// control codec's error.
    pub fn decode(plaintext: Bytes) -> Result<Self> {
        match plaintext.first() {
            Some(&RECORD_KIND_PACKET) => Ok(Self::Packet(plaintext.slice(1..))),
            Some(&RECORD_KIND_CONTROL) => {
                ControlCodec::new().decode(&plaintext[1..]).map(Self::Control)
            }
            Some(kind) => Err(CoreError::malformed(format!(
                "unknown record kind 0x{kind:02x}"
            ))),
            None => Err(CoreError::malformed("empty record")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_record() {
        let record = TunnelRecord::Packet(Bytes::from_static(&[0x45, 0, 0, 20]));
        let encoded = record.encode();
        assert_eq!(encoded[0], RECORD_KIND_PACKET);
        assert_eq!(TunnelRecord::decode(encoded.freeze()).unwrap(), record);
    }

    #[test]
    fn test_ping_record() {
        let encoded = TunnelRecord::Control(ControlMessage::Ping).encode();
        assert_eq!(&encoded[..], &[RECORD_KIND_CONTROL, b'B', b'W', 0x30, 0, 0]);
        assert_eq!(
            TunnelRecord::decode(encoded.freeze()).unwrap(),
            TunnelRecord::Control(ControlMessage::Ping)
        );
    }

    #[test]
    fn test_bad_records() {
        assert!(TunnelRecord::decode(Bytes::new()).is_err());
        assert!(TunnelRecord::decode(Bytes::from_static(&[0x07, 1])).is_err());
    }
}
