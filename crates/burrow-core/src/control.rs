// ============================================
// File: crates/burrow-core/src/control.rs
// ============================================
//! # Sealed Control Channel
//!
//! ## Creation Reason
//! After `ServerHello` every control message travels as a packet frame
//! under the channel keys. Both the client and the server side wrap the
//! same state, so it lives here without any I/O.
//!
//! ```text
//! ControlMessage ─► TunnelRecord::Control ─► FrameCodec ─► frame bytes
//!                       (kind 0x01)         (channel keys)
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial sealed channel

use bytes::Bytes;

use burrow_common::time::SharedClock;

use crate::cipher::{CipherConfig, SessionCipher};
use crate::codec::FrameCodec;
use crate::crypto::HandshakeOutcome;
use crate::error::{CoreError, Result};
use crate::protocol::codec::{CONTROL_HEADER_SIZE, MAX_CONTROL_PAYLOAD};
use crate::protocol::messages::ControlMessage;
use crate::protocol::record::TunnelRecord;

/// Largest plaintext a sealed control frame carries.
pub const MAX_CONTROL_RECORD: usize = 1 + CONTROL_HEADER_SIZE + MAX_CONTROL_PAYLOAD;

/// Which end of the channel we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dialing side.
    Client,
    /// Accepting side.
    Server,
}

/// Frame codec plus cipher state for the control channel of one
/// connection.
#[derive(Debug)]
pub struct SealedChannel {
    codec: FrameCodec,
    cipher: SessionCipher,
}

impl SealedChannel {
    /// Builds the channel from a completed handshake.
    #[must_use]
    pub fn from_handshake(outcome: &HandshakeOutcome, role: Role, clock: SharedClock) -> Self {
        let keys = outcome.channel_keys();
        let cipher = match role {
            Role::Client => SessionCipher::for_client(keys, clock, CipherConfig::default()),
            Role::Server => SessionCipher::for_server(keys, clock, CipherConfig::default()),
        };
        Self {
            codec: FrameCodec::new(MAX_CONTROL_RECORD),
            cipher,
        }
    }

    /// Seals one control message into a frame.
    ///
    /// # Errors
    /// Propagates codec errors.
    pub fn seal(&self, message: &ControlMessage) -> Result<Bytes> {
        let record = TunnelRecord::Control(message.clone()).encode();
        self.codec.encode(&record, &self.cipher)
    }

    /// Opens a frame and parses the control message inside.
    ///
    /// # Errors
    /// Codec errors, `MalformedMessage` if the record is a packet, or
    /// `UnexpectedMessage` for a handshake message.
    pub fn open(&self, frame: &[u8]) -> Result<ControlMessage> {
        match TunnelRecord::decode(self.codec.decode(frame, &self.cipher)?)? {
            TunnelRecord::Control(message) if message.message_type().is_handshake() => Err(
                CoreError::unexpected("sealed control message", message.name()),
            ),
            TunnelRecord::Control(message) => Ok(message),
            TunnelRecord::Packet(_) => Err(CoreError::malformed(
                "packet record on the control channel",
            )),
        }
    }

    /// Stops the channel; later seal/open fail with `SessionExpired`.
    pub fn close(&self) {
        self.cipher.invalidate();
    }
}
