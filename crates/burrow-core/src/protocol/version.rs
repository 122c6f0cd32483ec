// ============================================
// File: crates/burrow-core/src/protocol/version.rs
// ============================================
//! # Protocol Versioning
//!
//! ## Versioning Strategy
//! - Single byte: major in the high nibble, minor in the low nibble
//! - Peers must share the major version
//! - The negotiated version is the lower of the two minors
//!
//! ## Version History
//! | Version | Description |
//! |---------|-------------|
//! | 0x10    | Signed handshake, HMAC credential proof, 40-bit frame counters |
//!
//! ## Last Modified
//! v0.1.0 - Major/minor negotiation

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Version spoken by this build.
pub const CURRENT_PROTOCOL_VERSION: u8 = 0x10;

/// Protocol version identifier.
///
/// # Example
/// ```
/// use burrow_core::protocol::ProtocolVersion;
///
/// let ours = ProtocolVersion::new(0x12);
/// let chosen = ours.negotiate(ProtocolVersion::new(0x10)).unwrap();
/// assert_eq!(chosen, ProtocolVersion::new(0x10));
///
/// assert!(ours.negotiate(ProtocolVersion::new(0x20)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(u8);

impl ProtocolVersion {
    /// Wraps a raw version byte.
    #[must_use]
    pub const fn new(version: u8) -> Self {
        Self(version)
    }

    /// Version spoken by this build.
    #[must_use]
    pub const fn current() -> Self {
        Self(CURRENT_PROTOCOL_VERSION)
    }

    /// Raw byte.
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    /// Major version (high nibble).
    #[must_use]
    pub const fn major(&self) -> u8 {
        self.0 >> 4
    }

    /// Minor version (low nibble).
    #[must_use]
    pub const fn minor(&self) -> u8 {
        self.0 & 0x0F
    }

    /// Whether both versions share a major version.
    #[must_use]
    pub const fn is_compatible_with(&self, other: &Self) -> bool {
        self.major() == other.major()
    }

    /// Picks the version to speak with a peer proposing `proposed`.
    ///
    /// # Errors
    /// Returns `UnsupportedVersion` if the majors differ.
    pub fn negotiate(&self, proposed: Self) -> Result<Self> {
        if !self.is_compatible_with(&proposed) {
            return Err(CoreError::UnsupportedVersion {
                got: proposed.0,
                expected_major: self.major(),
            });
        }
        Ok(if proposed.0 < self.0 { proposed } else { *self })
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major(), self.minor())
    }
}

impl From<u8> for ProtocolVersion {
    fn from(version: u8) -> Self {
        Self(version)
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(version: ProtocolVersion) -> Self {
        version.0
    }
}
