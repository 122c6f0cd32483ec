// ============================================
// File: crates/burrow-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Error taxonomy for the packet codec, control protocol and handshake
//! cryptography.
//!
//! ## Error Categories
//! 1. **Per-packet errors**: `ReplayDetected`, `AuthenticationFailed`,
//!    `OversizedFrame`, `MalformedFrame`. The data plane drops the packet
//!    and keeps the session.
//! 2. **Session errors**: `SessionExpired`. Forces re-authentication.
//! 3. **Trust errors**: `CertificateRejected`. Fatal, never retried.
//! 4. **Protocol / crypto errors**: everything else.
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material, proofs or nonces in error messages
//! - Keep `is_per_packet` in sync with the data plane drop logic
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use burrow_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for protocol and cryptographic operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Packet Errors
    // ========================================

    /// Frame (or plaintext) exceeds the negotiated maximum.
    #[error("Oversized frame: {size} bytes exceeds limit of {limit}")]
    OversizedFrame {
        /// Declared or actual size
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Frame is structurally invalid.
    #[error("Malformed frame: {reason}")]
    MalformedFrame {
        /// What's wrong with the frame
        reason: String,
    },

    /// Sequence number already seen or older than the replay window.
    #[error("Replay detected: sequence {sequence}")]
    ReplayDetected {
        /// Rejected sequence number
        sequence: u64,
    },

    /// AEAD tag mismatch (tampered frame or wrong key).
    #[error("Authentication failed: tag mismatch")]
    AuthenticationFailed,

    /// Send counter space of the current key is exhausted.
    #[error("Nonce space exhausted, key rotation required")]
    NonceExhausted,

    // ========================================
    // Session Errors
    // ========================================

    /// Session expired or was invalidated.
    #[error("Session expired")]
    SessionExpired,

    // ========================================
    // Trust Errors
    // ========================================

    /// Server identity could not be verified.
    #[error("Certificate rejected: {reason}")]
    CertificateRejected {
        /// Why the peer was rejected
        reason: String,
    },

    // ========================================
    // Cryptographic Errors
    // ========================================

    /// Key material could not be constructed.
    #[error("Invalid key: {context}")]
    InvalidKey {
        /// What key was being built
        context: String,
    },

    /// An Ed25519 signature did not match the transcript.
    #[error("Bad signature on handshake transcript")]
    SignatureVerification,

    /// X25519 agreement produced no usable secret.
    #[error("X25519 agreement failed: {reason}")]
    KeyExchange {
        /// Cause
        reason: String,
    },

    /// AEAD sealing failed.
    #[error("Could not seal {context}")]
    Encryption {
        /// Frame kind being sealed
        context: String,
    },

    /// HKDF expansion failed.
    #[error("HKDF expansion failed: {reason}")]
    KeyDerivation {
        /// Cause
        reason: String,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// Control message type byte not in the table.
    #[error("Unknown control message type 0x{0:02x}")]
    UnknownMessageType(u8),

    /// Protocol version mismatch.
    #[error("Unsupported protocol version: {got}, expected major {expected_major}")]
    UnsupportedVersion {
        /// Version received
        got: u8,
        /// Major version we speak
        expected_major: u8,
    },

    /// Control message body does not parse.
    #[error("Malformed control message: {reason}")]
    MalformedMessage {
        /// Parse failure
        reason: String,
    },

    /// Control message shorter than its header or declared length.
    #[error("Control message truncated: need {expected} bytes, have {actual}")]
    MessageTooShort {
        /// Bytes needed
        expected: usize,
        /// Bytes present
        actual: usize,
    },

    /// Peer sent a message that is not valid at this point of the exchange.
    #[error("Unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        /// What was expected
        expected: &'static str,
        /// What arrived
        got: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Shared value type failure.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `OversizedFrame` error.
    #[must_use]
    pub const fn oversized(size: usize, limit: usize) -> Self {
        Self::OversizedFrame { size, limit }
    }

    /// Creates a `MalformedFrame` error.
    pub fn malformed_frame(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Creates a `CertificateRejected` error.
    pub fn certificate_rejected(reason: impl Into<String>) -> Self {
        Self::CertificateRejected {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidKey` error.
    pub fn invalid_key(context: impl Into<String>) -> Self {
        Self::InvalidKey {
            context: context.into(),
        }
    }

    /// Creates an `UnexpectedMessage` error.
    pub fn unexpected(expected: &'static str, got: impl Into<String>) -> Self {
        Self::UnexpectedMessage {
            expected,
            got: got.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the error concerns a single packet only.
    ///
    /// The data plane drops the packet, bumps statistics and keeps going.
    #[must_use]
    pub const fn is_per_packet(&self) -> bool {
        matches!(
            self,
            Self::OversizedFrame { .. }
                | Self::MalformedFrame { .. }
                | Self::ReplayDetected { .. }
                | Self::AuthenticationFailed
        )
    }

    /// Returns `true` if the error must never be retried automatically.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CertificateRejected { .. } | Self::SignatureVerification
        )
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::oversized(2000, 1444);
        assert!(err.to_string().contains("2000"));
        assert!(err.to_string().contains("1444"));

        let err = CoreError::too_short(100, 50);
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_per_packet_classification() {
        assert!(CoreError::AuthenticationFailed.is_per_packet());
        assert!(CoreError::ReplayDetected { sequence: 3 }.is_per_packet());
        assert!(CoreError::oversized(1, 0).is_per_packet());
        assert!(!CoreError::SessionExpired.is_per_packet());
        assert!(!CoreError::certificate_rejected("x").is_per_packet());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(CoreError::certificate_rejected("untrusted").is_fatal());
        assert!(!CoreError::SessionExpired.is_fatal());
        assert!(!CoreError::AuthenticationFailed.is_fatal());
    }

    #[test]
    fn test_common_error_conversion() {
        let common = CommonError::invalid_input("field", "bad value");
        let core: CoreError = common.into();
        assert!(matches!(core, CoreError::Common(_)));
    }
}
