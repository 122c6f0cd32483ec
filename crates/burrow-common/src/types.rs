// ============================================
// File: crates/burrow-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Main Functionality
//! - `SessionToken`: opaque, server-issued session identity (16 random bytes)
//! - `VirtualIp`: address assigned to a client inside the tunnel
//!
//! ## ⚠️ Important Note for Next Developer
//! - Tokens come from a CSPRNG; they are handles, not key material, so
//!   they are `Copy` and travel freely between maps and tasks
//! - `Debug` shows only a prefix of the token
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Constants
// ============================================

/// Size of a session token in bytes.
pub const SESSION_TOKEN_SIZE: usize = 16;

// ============================================
// SessionToken
// ============================================

/// Opaque server-issued identifier bound to one session.
///
/// # Wire Format
/// ```text
/// ┌────────────────────────────────────┐
/// │     Session token (16 bytes)       │
/// └────────────────────────────────────┘
/// ```
///
/// # Example
/// ```
/// use burrow_common::types::SessionToken;
///
/// let token = SessionToken::generate();
/// let parsed: SessionToken = token.to_string().parse().unwrap();
/// assert_eq!(token, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken([u8; SESSION_TOKEN_SIZE]);

impl SessionToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps raw token bytes.
    #[must_use]
    pub const fn from_array(bytes: [u8; SESSION_TOKEN_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a token from a byte slice.
    ///
    /// # Errors
    /// Returns `InvalidLength` unless exactly 16 bytes are given.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CommonError> {
        let arr: [u8; SESSION_TOKEN_SIZE] = bytes
            .try_into()
            .map_err(|_| CommonError::invalid_length(SESSION_TOKEN_SIZE, bytes.len()))?;
        Ok(Self(arr))
    }

    /// Raw token bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SESSION_TOKEN_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionToken({:02x}{:02x}{:02x}{:02x}...)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64.encode(self.0))
    }
}

impl FromStr for SessionToken {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64.decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for SessionToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for SessionToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Self::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}

// ============================================
// VirtualIp
// ============================================

/// Address assigned to a client inside the tunnel.
///
/// Kept distinct from `Ipv4Addr` so physical and virtual addresses cannot
/// be mixed up in routing code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualIp(Ipv4Addr);

impl VirtualIp {
    /// Wraps an address.
    #[must_use]
    pub const fn new(addr: Ipv4Addr) -> Self {
        Self(addr)
    }

    /// Underlying address.
    #[must_use]
    pub const fn inner(&self) -> Ipv4Addr {
        self.0
    }

    /// Address octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }

    /// Whether this address lies in `network/prefix_len`.
    ///
    /// ```
    /// use burrow_common::types::VirtualIp;
    /// use std::net::Ipv4Addr;
    ///
    /// let vip = VirtualIp::new(Ipv4Addr::new(10, 8, 0, 5));
    /// assert!(vip.is_in_range(Ipv4Addr::new(10, 8, 0, 0), 24));
    /// ```
    #[must_use]
    pub fn is_in_range(&self, network: Ipv4Addr, prefix_len: u8) -> bool {
        if prefix_len > 32 {
            return false;
        }
        let mask = if prefix_len == 0 {
            0
        } else {
            !0u32 << (32 - prefix_len)
        };
        (u32::from(self.0) & mask) == (u32::from(network) & mask)
    }
}

impl fmt::Display for VirtualIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ipv4Addr> for VirtualIp {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr)
    }
}

impl From<VirtualIp> for Ipv4Addr {
    fn from(vip: VirtualIp) -> Self {
        vip.0
    }
}

impl From<[u8; 4]> for VirtualIp {
    fn from(octets: [u8; 4]) -> Self {
        Self(Ipv4Addr::from(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_unique() {
        assert_ne!(SessionToken::generate(), SessionToken::generate());
    }

    #[test]
    fn test_session_token_string_roundtrip() {
        let token = SessionToken::generate();
        let parsed: SessionToken = token.to_string().parse().unwrap();
        assert_eq!(token, parsed);
    }

    #[test]
    fn test_session_token_rejects_wrong_length() {
        assert!(SessionToken::from_slice(&[0u8; 8]).is_err());
        assert!(SessionToken::from_slice(&[0u8; 32]).is_err());
        assert!("AAAA".parse::<SessionToken>().is_err());
    }

    #[test]
    fn test_session_token_is_a_copyable_handle() {
        let token = SessionToken::generate();
        let mut sessions = std::collections::HashMap::new();
        sessions.insert(token, 1u8);
        let held = token;
        assert_eq!(sessions.get(&held), Some(&1));
        assert_eq!(held, token);
    }

    #[test]
    fn test_session_token_debug_is_truncated() {
        let token = SessionToken::from_array([0xAB; SESSION_TOKEN_SIZE]);
        assert_eq!(format!("{token:?}"), "SessionToken(abababab...)");
    }

    #[test]
    fn test_session_token_json() {
        let token = SessionToken::generate();
        let json = serde_json::to_string(&token).unwrap();
        let restored: SessionToken = serde_json::from_str(&json).unwrap();
        assert_eq!(token, restored);
    }

    #[test]
    fn test_virtual_ip_in_range() {
        let vip = VirtualIp::new(Ipv4Addr::new(10, 8, 0, 50));
        assert!(vip.is_in_range(Ipv4Addr::new(10, 8, 0, 0), 24));
        assert!(!vip.is_in_range(Ipv4Addr::new(192, 168, 0, 0), 24));
        assert!(vip.is_in_range(Ipv4Addr::new(10, 0, 0, 0), 8));
        assert!(!vip.is_in_range(Ipv4Addr::new(10, 8, 0, 0), 33));
    }
}
