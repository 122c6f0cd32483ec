// ============================================
// File: crates/burrow-core/src/protocol/messages.rs
// ============================================
//! # Control Message Definitions
//!
//! ## Main Functionality
//! - `MessageType`: one-byte control message identifier
//! - `ReasonCode`: `Disconnect` reason table
//! - Message structs and the `ControlMessage` sum type
//!
//! ## Payload Sizes
//! | Message | Payload (bytes) |
//! |---------|-----------------|
//! | ClientHello | 33 |
//! | ServerHello | 129 |
//! | AuthRequest | 65 + identity length |
//! | AuthResponse | 56 |
//! | Ping / Pong | 0 |
//! | Rekey | 32 |
//! | Disconnect | 1 |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Byte values are part of the wire protocol; never renumber
//! - Multi-byte integers are big-endian
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use std::fmt;

use burrow_common::types::{SessionToken, VirtualIp};

use crate::crypto::proof::CredentialProof;
use crate::crypto::{ED25519_PUBLIC_KEY_SIZE, ED25519_SIGNATURE_SIZE, KEY_SEED_SIZE, X25519_PUBLIC_KEY_SIZE};
use crate::protocol::version::ProtocolVersion;

// ============================================
// Sizes
// ============================================

/// `ClientHello` payload size.
pub const CLIENT_HELLO_SIZE: usize = 1 + X25519_PUBLIC_KEY_SIZE;

/// `ServerHello` payload size.
pub const SERVER_HELLO_SIZE: usize =
    1 + ED25519_PUBLIC_KEY_SIZE + X25519_PUBLIC_KEY_SIZE + ED25519_SIGNATURE_SIZE;

/// `AuthResponse` payload size.
pub const AUTH_RESPONSE_SIZE: usize = 16 + 4 + KEY_SEED_SIZE + 4;

/// Longest identity accepted in `AuthRequest`.
pub const MAX_IDENTITY_LEN: usize = 255;

// ============================================
// MessageType
// ============================================

/// Control message type identifier.
///
/// | Value | Type |
/// |-------|------|
/// | 0x01 | AuthRequest |
/// | 0x02 | AuthResponse |
/// | 0x0A | ClientHello |
/// | 0x0B | ServerHello |
/// | 0x22 | Disconnect |
/// | 0x30 | Ping |
/// | 0x31 | Pong |
/// | 0x40 | Rekey |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Client credential proof.
    AuthRequest = 0x01,
    /// Session parameters.
    AuthResponse = 0x02,
    /// Handshake opener.
    ClientHello = 0x0A,
    /// Signed handshake reply.
    ServerHello = 0x0B,
    /// Orderly close with a reason.
    Disconnect = 0x22,
    /// Keepalive request.
    Ping = 0x30,
    /// Keepalive answer.
    Pong = 0x31,
    /// Key rotation announcement.
    Rekey = 0x40,
}

impl MessageType {
    /// Parses a type byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::AuthRequest),
            0x02 => Some(Self::AuthResponse),
            0x0A => Some(Self::ClientHello),
            0x0B => Some(Self::ServerHello),
            0x22 => Some(Self::Disconnect),
            0x30 => Some(Self::Ping),
            0x31 => Some(Self::Pong),
            0x40 => Some(Self::Rekey),
            _ => None,
        }
    }

    /// Wire byte.
    #[must_use]
    pub const fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Handshake messages travel unencrypted.
    #[must_use]
    pub const fn is_handshake(&self) -> bool {
        matches!(self, Self::ClientHello | Self::ServerHello)
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_byte(value).ok_or(value)
    }
}

// ============================================
// ReasonCode
// ============================================

/// Reason carried by `Disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReasonCode {
    /// Unspecified.
    Unknown = 0x00,
    /// Message could not be parsed.
    InvalidMessage = 0x01,
    /// No common protocol version.
    VersionMismatch = 0x02,
    /// Authentication failed for a non-credential reason.
    AuthFailed = 0x10,
    /// Identity unknown or proof wrong.
    InvalidCredentials = 0x11,
    /// Session token invalid.
    InvalidToken = 0x12,
    /// Session token expired.
    TokenExpired = 0x13,
    /// Identity holds too many sessions.
    TooManySessions = 0x14,
    /// Identity disabled by the operator.
    IdentityDisabled = 0x15,
    /// Session unknown.
    SessionNotFound = 0x20,
    /// Session lease ran out.
    SessionExpired = 0x21,
    /// Server-wide session limit reached.
    SessionLimitReached = 0x22,
    /// Tunnel setup failed.
    TunnelCreationFailed = 0x30,
    /// No free virtual address.
    AddressAllocationFailed = 0x31,
    /// Routing failure.
    RoutingError = 0x32,
    /// Encryption failure.
    EncryptionFailed = 0x40,
    /// Decryption failure.
    DecryptFailed = 0x41,
    /// Key exchange failure.
    KeyExchangeFailed = 0x42,
    /// Replay detected.
    ReplayDetected = 0x43,
    /// Generic network error.
    NetworkError = 0x50,
    /// Connection lost.
    ConnectionLost = 0x51,
    /// Operation timed out.
    Timeout = 0x52,
    /// Server overloaded.
    Overloaded = 0x60,
    /// Server in maintenance.
    Maintenance = 0x61,
    /// Client closed on user request.
    UserRequested = 0x70,
}

impl ReasonCode {
    /// Parses a reason byte; unknown values map to `Unknown`.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::InvalidMessage,
            0x02 => Self::VersionMismatch,
            0x10 => Self::AuthFailed,
            0x11 => Self::InvalidCredentials,
            0x12 => Self::InvalidToken,
            0x13 => Self::TokenExpired,
            0x14 => Self::TooManySessions,
            0x15 => Self::IdentityDisabled,
            0x20 => Self::SessionNotFound,
            0x21 => Self::SessionExpired,
            0x22 => Self::SessionLimitReached,
            0x30 => Self::TunnelCreationFailed,
            0x31 => Self::AddressAllocationFailed,
            0x32 => Self::RoutingError,
            0x40 => Self::EncryptionFailed,
            0x41 => Self::DecryptFailed,
            0x42 => Self::KeyExchangeFailed,
            0x43 => Self::ReplayDetected,
            0x50 => Self::NetworkError,
            0x51 => Self::ConnectionLost,
            0x52 => Self::Timeout,
            0x60 => Self::Overloaded,
            0x61 => Self::Maintenance,
            0x70 => Self::UserRequested,
            _ => Self::Unknown,
        }
    }

    /// Wire byte.
    #[must_use]
    pub const fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// The client's credentials were rejected; retrying cannot help.
    #[must_use]
    pub const fn is_credential_rejection(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::IdentityDisabled)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}(0x{:02x})", self.as_byte())
    }
}

// ============================================
// Messages
// ============================================

/// Handshake opener.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ proposed_version (1)                 │
/// │ client_ephemeral (32)  X25519        │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Highest version the client speaks.
    pub proposed_version: ProtocolVersion,
    /// Client's X25519 ephemeral public key.
    pub client_ephemeral: [u8; X25519_PUBLIC_KEY_SIZE],
}

/// Signed handshake reply.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ chosen_version (1)                   │
/// │ server_identity (32)   Ed25519       │
/// │ server_ephemeral (32)  X25519        │
/// │ signature (64)         over transcript│
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Negotiated version.
    pub chosen_version: ProtocolVersion,
    /// Server's Ed25519 identity public key.
    pub server_identity: [u8; ED25519_PUBLIC_KEY_SIZE],
    /// Server's X25519 ephemeral public key.
    pub server_ephemeral: [u8; X25519_PUBLIC_KEY_SIZE],
    /// Signature over the handshake transcript hash.
    pub signature: [u8; ED25519_SIGNATURE_SIZE],
}

/// Credential proof for an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Account identity (1..=255 bytes of UTF-8).
    pub identity: String,
    /// Proof bound to the handshake transcript.
    pub proof: CredentialProof,
}

/// Session parameters issued by the server.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthResponse {
    /// Opaque session token.
    pub session_token: SessionToken,
    /// Address assigned inside the tunnel.
    pub virtual_address: VirtualIp,
    /// Per-session salt for session key derivation.
    pub key_seed: [u8; KEY_SEED_SIZE],
    /// Lease duration.
    pub lease_seconds: u32,
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResponse")
            .field("session_token", &self.session_token)
            .field("virtual_address", &self.virtual_address)
            .field("lease_seconds", &self.lease_seconds)
            .finish_non_exhaustive()
    }
}

/// Key rotation announcement.
#[derive(Clone, PartialEq, Eq)]
pub struct Rekey {
    /// Seed mixed into each direction's current key.
    pub new_key_seed: [u8; KEY_SEED_SIZE],
}

impl fmt::Debug for Rekey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rekey { .. }")
    }
}

/// Orderly close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    /// Why the peer is closing.
    pub reason: ReasonCode,
}

// ============================================
// ControlMessage
// ============================================

/// Any control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// See [`ClientHello`].
    ClientHello(ClientHello),
    /// See [`ServerHello`].
    ServerHello(ServerHello),
    /// See [`AuthRequest`].
    AuthRequest(AuthRequest),
    /// See [`AuthResponse`].
    AuthResponse(AuthResponse),
    /// Keepalive request.
    Ping,
    /// Keepalive answer.
    Pong,
    /// See [`Rekey`].
    Rekey(Rekey),
    /// See [`Disconnect`].
    Disconnect(Disconnect),
}

impl ControlMessage {
    /// Type byte of this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::ClientHello(_) => MessageType::ClientHello,
            Self::ServerHello(_) => MessageType::ServerHello,
            Self::AuthRequest(_) => MessageType::AuthRequest,
            Self::AuthResponse(_) => MessageType::AuthResponse,
            Self::Ping => MessageType::Ping,
            Self::Pong => MessageType::Pong,
            Self::Rekey(_) => MessageType::Rekey,
            Self::Disconnect(_) => MessageType::Disconnect,
        }
    }

    /// Short name for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ClientHello(_) => "ClientHello",
            Self::ServerHello(_) => "ServerHello",
            Self::AuthRequest(_) => "AuthRequest",
            Self::AuthResponse(_) => "AuthResponse",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Rekey(_) => "Rekey",
            Self::Disconnect(_) => "Disconnect",
        }
    }

    /// Builds a `Disconnect`.
    #[must_use]
    pub const fn disconnect(reason: ReasonCode) -> Self {
        Self::Disconnect(Disconnect { reason })
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for t in [
            MessageType::AuthRequest,
            MessageType::AuthResponse,
            MessageType::ClientHello,
            MessageType::ServerHello,
            MessageType::Disconnect,
            MessageType::Ping,
            MessageType::Pong,
            MessageType::Rekey,
        ] {
            assert_eq!(MessageType::from_byte(t.as_byte()), Some(t));
        }
        assert!(MessageType::from_byte(0xFF).is_none());
    }

    #[test]
    fn test_reason_code_table() {
        assert_eq!(ReasonCode::from_byte(0x11), ReasonCode::InvalidCredentials);
        assert_eq!(ReasonCode::from_byte(0x43), ReasonCode::ReplayDetected);
        assert_eq!(ReasonCode::from_byte(0x61), ReasonCode::Maintenance);
        assert_eq!(ReasonCode::from_byte(0xEE), ReasonCode::Unknown);
        assert!(ReasonCode::InvalidCredentials.is_credential_rejection());
        assert!(!ReasonCode::Overloaded.is_credential_rejection());
    }

    #[test]
    fn test_auth_response_debug_hides_seed() {
        let resp = AuthResponse {
            session_token: SessionToken::from_array([1; 16]),
            virtual_address: VirtualIp::from([10, 8, 0, 5]),
            key_seed: [0xAB; 32],
            lease_seconds: 86_400,
        };
        let text = format!("{resp:?}");
        assert!(text.contains("10.8.0.5"));
        assert!(!text.contains("key_seed"));
    }
}
