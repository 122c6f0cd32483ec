// ============================================
// File: crates/burrow-core/src/crypto/aead.rs
// ============================================
//! # Frame Encryption
//!
//! ## Creation Reason
//! ChaCha20-Poly1305 sealing and opening for packet frames.
//!
//! ## Nonce Construction
//! ```text
//! AEAD nonce (12 bytes) = 0x00000000 || frame nonce (8 bytes)
//! frame nonce           = counter (40-bit BE) || coarse time (24-bit BE)
//! ```
//!
//! The associated data is the frame's 2-byte length header, so a frame
//! cannot be truncated or extended without failing authentication.
//!
//! ## ⚠️ Important Note for Next Developer
//! - (key, nonce) pairs must never repeat; the counter is owned by the
//!   send side of `SessionCipher`, never by callers
//!
//! ## Last Modified
//! v0.1.0 - Initial frame AEAD

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};

use super::keys::SessionKey;
use super::{CHACHA20_NONCE_SIZE, FRAME_NONCE_SIZE, POLY1305_TAG_SIZE};
use crate::error::{CoreError, Result};

/// Bytes added by encryption.
pub const ENCRYPTION_OVERHEAD: usize = POLY1305_TAG_SIZE;

/// Highest value of the 40-bit frame counter.
pub const MAX_FRAME_COUNTER: u64 = (1 << 40) - 1;

// ============================================
// FrameNonce
// ============================================

/// The 8-byte nonce carried in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameNonce([u8; FRAME_NONCE_SIZE]);

impl FrameNonce {
    /// Builds a nonce from a 40-bit counter and a 24-bit coarse timestamp.
    ///
    /// Bits above the field widths are discarded.
    #[must_use]
    pub fn new(counter: u64, coarse_time: u32) -> Self {
        let c = (counter & MAX_FRAME_COUNTER).to_be_bytes();
        let t = (coarse_time & 0x00FF_FFFF).to_be_bytes();
        Self([c[3], c[4], c[5], c[6], c[7], t[1], t[2], t[3]])
    }

    /// Wraps nonce bytes read off the wire.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; FRAME_NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FRAME_NONCE_SIZE] {
        &self.0
    }

    /// The counter part, used as the replay sequence.
    #[must_use]
    pub fn counter(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf[3..].copy_from_slice(&self.0[..5]);
        u64::from_be_bytes(buf)
    }

    /// The coarse timestamp part.
    #[must_use]
    pub fn coarse_time(&self) -> u32 {
        u32::from_be_bytes([0, self.0[5], self.0[6], self.0[7]])
    }

    fn to_aead_nonce(self) -> Nonce {
        let mut nonce = [0u8; CHACHA20_NONCE_SIZE];
        nonce[CHACHA20_NONCE_SIZE - FRAME_NONCE_SIZE..].copy_from_slice(&self.0);
        Nonce::from(nonce)
    }
}

// ============================================
// Seal / Open
// ============================================

/// Encrypts `plaintext`, returning `ciphertext || tag`.
///
/// # Errors
/// Returns `Encryption` if the cipher rejects the input.
pub fn seal(key: &SessionKey, nonce: FrameNonce, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(
            &nonce.to_aead_nonce(),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CoreError::Encryption {
            context: "ChaCha20-Poly1305 seal failed".into(),
        })
}

/// Decrypts and authenticates `ciphertext || tag`.
///
/// # Errors
/// Returns `AuthenticationFailed` on tag mismatch or short input.
pub fn open(key: &SessionKey, nonce: FrameNonce, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < POLY1305_TAG_SIZE {
        return Err(CoreError::AuthenticationFailed);
    }
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(
            &nonce.to_aead_nonce(),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CoreError::AuthenticationFailed)
}

// ============================================
// Tests
// ============================================
