// ============================================
// File: crates/burrow-core/src/codec.rs
// ============================================
//! # Packet Frame Codec
//!
//! ## Creation Reason
//! Turns plaintext into authenticated frames and back, for both the data
//! plane and the sealed control channel.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────────┬──────────────────┬───────────┐
//! │ len (2)  │ nonce (8)    │ ciphertext (N)   │ tag (16)  │
//! │ u16 BE   │ ctr40 | t24  │                  │           │
//! └──────────┴──────────────┴──────────────────┴───────────┘
//!   len = 8 + N + 16;  AAD = len bytes
//! ```
//!
//! ## Decode Checks (in order)
//! 1. at least 2 bytes for the header
//! 2. `len > max_plaintext + 24`  -> `OversizedFrame` (nothing allocated)
//! 3. `len < 24` or frame shorter than `2 + len` -> `MalformedFrame`
//! 4. cipher: replay check, open, mark
//!
//! ## Last Modified
//! v0.1.0 - Initial frame codec

use bytes::{BufMut, Bytes, BytesMut};

use crate::cipher::SessionCipher;
use crate::crypto::aead::FrameNonce;
use crate::crypto::{FRAME_NONCE_SIZE, POLY1305_TAG_SIZE};
use crate::error::{CoreError, Result};

/// Size of the length header.
pub const FRAME_HEADER_SIZE: usize = 2;

/// Nonce plus tag: the smallest legal `len`.
pub const FRAME_OVERHEAD: usize = FRAME_NONCE_SIZE + POLY1305_TAG_SIZE;

/// Largest plaintext a frame can carry at all.
pub const MAX_FRAME_PLAINTEXT: usize = u16::MAX as usize - FRAME_OVERHEAD;

/// Encoder/decoder for packet frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_plaintext: usize,
}

impl FrameCodec {
    /// Creates a codec accepting plaintexts up to `max_plaintext` bytes.
    ///
    /// Values above [`MAX_FRAME_PLAINTEXT`] are clamped.
    #[must_use]
    pub fn new(max_plaintext: usize) -> Self {
        Self {
            max_plaintext: max_plaintext.min(MAX_FRAME_PLAINTEXT),
        }
    }

    /// Codec for data plane frames on a link with `mtu`: one IP packet
    /// plus the record kind byte, or any control record.
    #[must_use]
    pub fn for_mtu(mtu: u16) -> Self {
        Self::new((usize::from(mtu) + 1).max(crate::control::MAX_CONTROL_RECORD))
    }

    /// Configured plaintext limit.
    #[must_use]
    pub const fn max_plaintext(&self) -> usize {
        self.max_plaintext
    }

    /// Largest legal value of the length header.
    #[must_use]
    pub const fn max_frame_len(&self) -> usize {
        self.max_plaintext + FRAME_OVERHEAD
    }

    /// Seals `plaintext` into one frame.
    ///
    /// # Errors
    /// - `OversizedFrame`: plaintext above the limit
    /// - `SessionExpired` / `NonceExhausted`: from the cipher
    pub fn encode(&self, plaintext: &[u8], session: &SessionCipher) -> Result<Bytes> {
        if plaintext.len() > self.max_plaintext {
            return Err(CoreError::oversized(plaintext.len(), self.max_plaintext));
        }
        let len = u16::try_from(FRAME_OVERHEAD + plaintext.len())
            .map_err(|_| CoreError::oversized(plaintext.len(), self.max_plaintext))?;
        let header = len.to_be_bytes();

        let (nonce, sealed) = session.seal(&header, plaintext)?;

        let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + usize::from(len));
        frame.put_slice(&header);
        frame.put_slice(nonce.as_bytes());
        frame.put_slice(&sealed);
        Ok(frame.freeze())
    }

    /// Reads the declared frame length from a header, enforcing the limit.
    ///
    /// Stream readers call this before buffering the frame body.
    ///
    /// # Errors
    /// `MalformedFrame` on a short header, `OversizedFrame` above the limit.
    pub fn declared_len(&self, frame: &[u8]) -> Result<usize> {
        if frame.len() < FRAME_HEADER_SIZE {
            return Err(CoreError::malformed_frame("missing length header"));
        }
        let len = usize::from(u16::from_be_bytes([frame[0], frame[1]]));
        if len > self.max_frame_len() {
            return Err(CoreError::oversized(len, self.max_frame_len()));
        }
        if len < FRAME_OVERHEAD {
            return Err(CoreError::malformed_frame(format!(
                "declared length {len} below minimum {FRAME_OVERHEAD}"
            )));
        }
        Ok(len)
    }

    /// Authenticates and decrypts one frame.
    ///
    /// # Errors
    /// `OversizedFrame`, `MalformedFrame`, `ReplayDetected`,
    /// `AuthenticationFailed` or `SessionExpired`.
    pub fn decode(&self, frame: &[u8], session: &SessionCipher) -> Result<Bytes> {
        let len = self.declared_len(frame)?;
        let body = &frame[FRAME_HEADER_SIZE..];
        if body.len() < len {
            return Err(CoreError::malformed_frame(format!(
                "frame truncated: declared {len}, got {}",
                body.len()
            )));
        }
        if body.len() > len {
            return Err(CoreError::malformed_frame("trailing bytes after frame"));
        }

        let mut nonce = [0u8; FRAME_NONCE_SIZE];
        nonce.copy_from_slice(&body[..FRAME_NONCE_SIZE]);
        let plaintext = session.open(
            &frame[..FRAME_HEADER_SIZE],
            FrameNonce::from_bytes(nonce),
            &body[FRAME_NONCE_SIZE..],
        )?;
        Ok(Bytes::from(plaintext))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use burrow_common::time::ManualClock;

    use super::*;
    use crate::cipher::CipherConfig;
    use crate::crypto::kdf::DirectionKeys;
    use crate::crypto::keys::SessionKey;

    fn pair() -> (SessionCipher, SessionCipher) {
        let keys = DirectionKeys {
            client_to_server: SessionKey::from_bytes([3; 32]),
            server_to_client: SessionKey::from_bytes([4; 32]),
        };
        let clock = Arc::new(ManualClock::new());
        (
            SessionCipher::for_client(&keys, clock.clone(), CipherConfig::default()),
            SessionCipher::for_server(&keys, clock, CipherConfig::default()),
        )
    }

    #[test]
    fn test_roundtrip_and_layout() {
        let codec = FrameCodec::new(1420);
        let (client, server) = pair();
        let frame = codec.encode(b"hello", &client).unwrap();
        assert_eq!(frame.len(), 2 + 8 + 5 + 16);
        assert_eq!(u16::from_be_bytes([frame[0], frame[1]]), 29);
        assert_eq!(&codec.decode(&frame, &server).unwrap()[..], b"hello");
    }

    #[test]
    fn test_for_mtu_fits_packet_and_control() {
        let codec = FrameCodec::for_mtu(1420);
        assert_eq!(codec.max_plaintext(), 1421);
        let tiny = FrameCodec::for_mtu(576);
        assert_eq!(tiny.max_plaintext(), crate::control::MAX_CONTROL_RECORD.max(577));
    }

    #[test]
    fn test_empty_plaintext() {
        let codec = FrameCodec::new(1420);
        let (client, server) = pair();
        let frame = codec.encode(&[], &client).unwrap();
        assert_eq!(frame.len(), 2 + FRAME_OVERHEAD);
        assert!(codec.decode(&frame, &server).unwrap().is_empty());
    }

    #[test]
    fn test_oversized_plaintext() {
        let codec = FrameCodec::new(16);
        let (client, _) = pair();
        assert!(matches!(
            codec.encode(&[0u8; 17], &client),
            Err(CoreError::OversizedFrame { size: 17, limit: 16 })
        ));
        assert_eq!(client.send_counter(), 0);
    }

    #[test]
    fn test_oversized_declared_length() {
        let codec = FrameCodec::new(16);
        let (_, server) = pair();
        let frame = [0x00, 41, 0, 0];
        assert!(matches!(
            codec.decode(&frame, &server),
            Err(CoreError::OversizedFrame { size: 41, .. })
        ));
    }

    #[test]
    fn test_malformed_frames() {
        let codec = FrameCodec::new(1420);
        let (client, server) = pair();
        assert!(matches!(
            codec.decode(&[0x00], &server),
            Err(CoreError::MalformedFrame { .. })
        ));
        assert!(matches!(
            codec.decode(&[0x00, 10, 0, 0], &server),
            Err(CoreError::MalformedFrame { .. })
        ));
        let frame = codec.encode(b"abc", &client).unwrap();
        assert!(matches!(
            codec.decode(&frame[..frame.len() - 1], &server),
            Err(CoreError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let codec = FrameCodec::new(1420);
        let (client, server) = pair();
        let mut frame = codec.encode(b"payload", &client).unwrap().to_vec();
        frame[12] ^= 0x01;
        assert!(matches!(
            codec.decode(&frame, &server),
            Err(CoreError::AuthenticationFailed)
        ));

        let good = codec.encode(b"next", &client).unwrap();
        assert_eq!(&codec.decode(&good, &server).unwrap()[..], b"next");
    }

    #[test]
    fn test_length_header_is_authenticated() {
        let codec = FrameCodec::new(1420);
        let (client, server) = pair();
        let mut frame = codec.encode(b"payload", &client).unwrap().to_vec();
        frame.push(0);
        frame[1] += 1;
        assert!(matches!(
            codec.decode(&frame, &server),
            Err(CoreError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_replayed_frame() {
        let codec = FrameCodec::new(1420);
        let (client, server) = pair();
        let frame = codec.encode(b"once", &client).unwrap();
        codec.decode(&frame, &server).unwrap();
        assert!(matches!(
            codec.decode(&frame, &server),
            Err(CoreError::ReplayDetected { .. })
        ));
    }
}
