// ============================================
// File: crates/burrow-core/src/protocol/codec.rs
// ============================================
//! # Control Message Codec
//!
//! ## Wire Format
//! ```text
//! ┌────────┬────────┬──────────────┬─────────────────┐
//! │ "BW"   │ type   │ length (u16) │ payload         │
//! │ 2 B    │ 1 B    │ 2 B, BE      │ length bytes    │
//! └────────┴────────┴──────────────┴─────────────────┘
//! ```
//!
//! ## Parsing Strategy
//! 1. Check header length and magic
//! 2. Check declared length against the cap and the buffer
//! 3. Dispatch on the type byte to the message's `WireFormat`
//! 4. Reject trailing bytes
//!
//! ## ⚠️ Important Note for Next Developer
//! - Validate lengths before every read; `bytes::Buf` getters panic on
//!   short input
//!
//! ## Last Modified
//! v0.1.0 - Initial control codec

use bytes::{Buf, BufMut, Bytes, BytesMut};

use burrow_common::types::{SessionToken, VirtualIp};

use crate::crypto::proof::CredentialProof;
use crate::crypto::{DIGEST_SIZE, KEY_SEED_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::messages::{
    AuthRequest, AuthResponse, ClientHello, ControlMessage, Disconnect, MessageType, ReasonCode,
    Rekey, ServerHello, AUTH_RESPONSE_SIZE, CLIENT_HELLO_SIZE, MAX_IDENTITY_LEN,
    SERVER_HELLO_SIZE,
};
use crate::protocol::version::ProtocolVersion;

// ============================================
// Constants
// ============================================

/// Control message magic.
pub const CONTROL_MAGIC: [u8; 2] = *b"BW";

/// Control header size.
pub const CONTROL_HEADER_SIZE: usize = 5;

/// Largest payload accepted.
pub const MAX_CONTROL_PAYLOAD: usize = 1024;

// ============================================
// WireFormat
// ============================================

/// Payload serialization for one message type.
pub trait WireFormat: Sized {
    /// Appends the payload to `buf`.
    fn encode_payload(&self, buf: &mut BytesMut);

    /// Parses the payload. `buf` holds exactly the payload bytes.
    ///
    /// # Errors
    /// Returns a protocol error on short or invalid payloads.
    fn decode_payload(buf: &mut Bytes) -> Result<Self>;
}

fn need(buf: &Bytes, expected: usize) -> Result<()> {
    if buf.remaining() < expected {
        return Err(CoreError::too_short(expected, buf.remaining()));
    }
    Ok(())
}

fn take_array<const N: usize>(buf: &mut Bytes) -> Result<[u8; N]> {
    need(buf, N)?;
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

impl WireFormat for ClientHello {
    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_u8(self.proposed_version.as_u8());
        buf.put_slice(&self.client_ephemeral);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        need(buf, CLIENT_HELLO_SIZE)?;
        Ok(Self {
            proposed_version: ProtocolVersion::new(buf.get_u8()),
            client_ephemeral: take_array(buf)?,
        })
    }
}

impl WireFormat for ServerHello {
    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_u8(self.chosen_version.as_u8());
        buf.put_slice(&self.server_identity);
        buf.put_slice(&self.server_ephemeral);
        buf.put_slice(&self.signature);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        need(buf, SERVER_HELLO_SIZE)?;
        Ok(Self {
            chosen_version: ProtocolVersion::new(buf.get_u8()),
            server_identity: take_array(buf)?,
            server_ephemeral: take_array(buf)?,
            signature: take_array(buf)?,
        })
    }
}

impl WireFormat for AuthRequest {
    #[allow(clippy::cast_possible_truncation)]
    fn encode_payload(&self, buf: &mut BytesMut) {
        // Identity length is validated when the request is built
        let identity = &self.identity.as_bytes()[..self.identity.len().min(MAX_IDENTITY_LEN)];
        buf.put_u8(identity.len() as u8);
        buf.put_slice(identity);
        buf.put_slice(&self.proof.digest);
        buf.put_slice(&self.proof.channel_binding);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        need(buf, 1)?;
        let len = usize::from(buf.get_u8());
        if len == 0 {
            return Err(CoreError::malformed("empty identity"));
        }
        need(buf, len + 2 * DIGEST_SIZE)?;
        let identity = String::from_utf8(buf.split_to(len).to_vec())
            .map_err(|_| CoreError::malformed("identity is not UTF-8"))?;
        Ok(Self {
            identity,
            proof: CredentialProof {
                digest: take_array(buf)?,
                channel_binding: take_array(buf)?,
            },
        })
    }
}

impl WireFormat for AuthResponse {
    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_slice(self.session_token.as_bytes());
        buf.put_slice(&self.virtual_address.octets());
        buf.put_slice(&self.key_seed);
        buf.put_u32(self.lease_seconds);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        need(buf, AUTH_RESPONSE_SIZE)?;
        let token: [u8; 16] = take_array(buf)?;
        let address: [u8; 4] = take_array(buf)?;
        let key_seed: [u8; KEY_SEED_SIZE] = take_array(buf)?;
        Ok(Self {
            session_token: SessionToken::from_array(token),
            virtual_address: VirtualIp::from(address),
            key_seed,
            lease_seconds: buf.get_u32(),
        })
    }
}

impl WireFormat for Rekey {
    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.new_key_seed);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            new_key_seed: take_array(buf)?,
        })
    }
}

impl WireFormat for Disconnect {
    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_u8(self.reason.as_byte());
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        need(buf, 1)?;
        Ok(Self {
            reason: ReasonCode::from_byte(buf.get_u8()),
        })
    }
}

// ============================================
// ControlCodec
// ============================================

/// Encoder/decoder for framed control messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControlCodec;

impl ControlCodec {
    /// Creates a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Peeks the message type without consuming input.
    ///
    /// # Errors
    /// Returns an error on short input, bad magic or unknown type.
    pub fn peek_message_type(buf: &[u8]) -> Result<MessageType> {
        if buf.len() < CONTROL_HEADER_SIZE {
            return Err(CoreError::too_short(CONTROL_HEADER_SIZE, buf.len()));
        }
        if buf[..2] != CONTROL_MAGIC {
            return Err(CoreError::malformed("bad control magic"));
        }
        MessageType::from_byte(buf[2]).ok_or(CoreError::UnknownMessageType(buf[2]))
    }

    /// Encodes `msg` with its header.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, msg: &ControlMessage) -> BytesMut {
        let mut payload = BytesMut::new();
        match msg {
            ControlMessage::ClientHello(m) => m.encode_payload(&mut payload),
            ControlMessage::ServerHello(m) => m.encode_payload(&mut payload),
            ControlMessage::AuthRequest(m) => m.encode_payload(&mut payload),
            ControlMessage::AuthResponse(m) => m.encode_payload(&mut payload),
            ControlMessage::Rekey(m) => m.encode_payload(&mut payload),
            ControlMessage::Disconnect(m) => m.encode_payload(&mut payload),
            ControlMessage::Ping | ControlMessage::Pong => {}
        }

        let mut buf = BytesMut::with_capacity(CONTROL_HEADER_SIZE + payload.len());
        buf.put_slice(&CONTROL_MAGIC);
        buf.put_u8(msg.message_type().as_byte());
        // Every payload is far below MAX_CONTROL_PAYLOAD
        buf.put_u16(payload.len() as u16);
        buf.put_slice(&payload);
        buf
    }

    /// Decodes one complete message.
    ///
    /// # Errors
    /// Returns a protocol error on any structural problem.
    pub fn decode(&self, input: &[u8]) -> Result<ControlMessage> {
        let msg_type = Self::peek_message_type(input)?;
        let declared = usize::from(u16::from_be_bytes([input[3], input[4]]));
        if declared > MAX_CONTROL_PAYLOAD {
            return Err(CoreError::malformed(format!(
                "control payload of {declared} bytes exceeds {MAX_CONTROL_PAYLOAD}"
            )));
        }
        let body = &input[CONTROL_HEADER_SIZE..];
        if body.len() != declared {
            return Err(CoreError::malformed(format!(
                "declared {declared} payload bytes, got {}",
                body.len()
            )));
        }

        let mut buf = Bytes::copy_from_slice(body);
        let msg = match msg_type {
            MessageType::ClientHello => ControlMessage::ClientHello(ClientHello::decode_payload(&mut buf)?),
            MessageType::ServerHello => ControlMessage::ServerHello(ServerHello::decode_payload(&mut buf)?),
            MessageType::AuthRequest => ControlMessage::AuthRequest(AuthRequest::decode_payload(&mut buf)?),
            MessageType::AuthResponse => ControlMessage::AuthResponse(AuthResponse::decode_payload(&mut buf)?),
            MessageType::Rekey => ControlMessage::Rekey(Rekey::decode_payload(&mut buf)?),
            MessageType::Disconnect => ControlMessage::Disconnect(Disconnect::decode_payload(&mut buf)?),
            MessageType::Ping => ControlMessage::Ping,
            MessageType::Pong => ControlMessage::Pong,
        };

        if buf.has_remaining() {
            return Err(CoreError::malformed(format!(
                "{} trailing bytes after {}",
                buf.remaining(),
                msg.name()
            )));
        }
        Ok(msg)
    }
}

// ============================================
// Tests
// ============================================
