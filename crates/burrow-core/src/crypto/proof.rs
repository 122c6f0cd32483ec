// ============================================
// File: crates/burrow-core/src/crypto/proof.rs
// ============================================
//! # Credential Proofs
//!
//! ## Creation Reason
//! Clients prove knowledge of their secret without sending it. The server
//! stores only a salted pre-hash (the verifier); the proof binds that
//! verifier to the handshake transcript so it cannot be replayed on
//! another connection.
//!
//! ## Construction
//! ```text
//! salt      = SHA-256("burrow/v1 credential salt" || identity)
//! verifier  = SHA-256(salt || secret)                 (stored server side)
//! digest    = HMAC-SHA256(key = verifier,
//!                         msg = "burrow/v1 auth" || identity || transcript)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Compare digests with `subtle` only
//! - Verifiers are password-equivalent for this protocol: protect the
//!   credential file like a key file
//!
//! ## Last Modified
//! v0.1.0 - Initial proof construction

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::DIGEST_SIZE;
use crate::error::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;

const SALT_LABEL: &[u8] = b"burrow/v1 credential salt";
const PROOF_LABEL: &[u8] = b"burrow/v1 auth";

/// Per-identity credential salt.
#[must_use]
pub fn credential_salt(identity: &str) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(SALT_LABEL);
    hasher.update(identity.as_bytes());
    hasher.finalize().into()
}

// ============================================
// CredentialVerifier
// ============================================

/// Salted pre-hash of a client secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CredentialVerifier([u8; DIGEST_SIZE]);

impl CredentialVerifier {
    /// Derives the verifier for `identity` / `secret`.
    #[must_use]
    pub fn derive(identity: &str, secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(credential_salt(identity));
        hasher.update(secret.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Parses the base64 form stored in credential files.
    ///
    /// # Errors
    /// Returns `InvalidKey` on bad encoding or length.
    pub fn from_base64(text: &str) -> Result<Self> {
        let mut bytes = BASE64
            .decode(text.trim())
            .map_err(|_| CoreError::invalid_key("verifier is not valid base64"))?;
        let arr: std::result::Result<[u8; DIGEST_SIZE], _> = bytes.as_slice().try_into();
        bytes.zeroize();
        arr.map(Self)
            .map_err(|_| CoreError::invalid_key("verifier must be 32 bytes"))
    }

    /// Base64 form for credential files.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialVerifier([REDACTED])")
    }
}

// ============================================
// CredentialProof
// ============================================

/// Proof sent in `AuthRequest`.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialProof {
    /// HMAC digest.
    pub digest: [u8; DIGEST_SIZE],
    /// Transcript hash of the handshake the proof is bound to.
    pub channel_binding: [u8; DIGEST_SIZE],
}

impl CredentialProof {
    fn mac(
        verifier: &CredentialVerifier,
        identity: &str,
        binding: &[u8; DIGEST_SIZE],
    ) -> Result<[u8; DIGEST_SIZE]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&verifier.0).map_err(|_| {
            CoreError::KeyDerivation {
                reason: "HMAC key rejected".into(),
            }
        })?;
        mac.update(PROOF_LABEL);
        mac.update(identity.as_bytes());
        mac.update(binding);
        Ok(mac.finalize().into_bytes().into())
    }

    /// Computes the proof for a connection.
    ///
    /// # Errors
    /// Returns `KeyDerivation` if the MAC cannot be keyed.
    pub fn compute(
        verifier: &CredentialVerifier,
        identity: &str,
        transcript_hash: &[u8; DIGEST_SIZE],
    ) -> Result<Self> {
        Ok(Self {
            digest: Self::mac(verifier, identity, transcript_hash)?,
            channel_binding: *transcript_hash,
        })
    }

    /// Checks the proof against a stored verifier in constant time.
    #[must_use]
    pub fn verify(&self, verifier: &CredentialVerifier, identity: &str) -> bool {
        Self::mac(verifier, identity, &self.channel_binding)
            .map(|expected| bool::from(expected.ct_eq(&self.digest)))
            .unwrap_or(false)
    }

    /// Whether the proof is bound to `transcript_hash`.
    #[must_use]
    pub fn is_bound_to(&self, transcript_hash: &[u8; DIGEST_SIZE]) -> bool {
        self.channel_binding.ct_eq(transcript_hash).into()
    }
}

impl fmt::Debug for CredentialProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialProof([REDACTED])")
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_verifies() {
        let verifier = CredentialVerifier::derive("alice", "hunter2");
        let proof = CredentialProof::compute(&verifier, "alice", &[1u8; 32]).unwrap();
        assert!(proof.verify(&verifier, "alice"));
        assert!(proof.is_bound_to(&[1u8; 32]));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let stored = CredentialVerifier::derive("alice", "hunter2");
        let guessed = CredentialVerifier::derive("alice", "hunter3");
        let proof = CredentialProof::compute(&guessed, "alice", &[1u8; 32]).unwrap();
        assert!(!proof.verify(&stored, "alice"));
    }

    #[test]
    fn test_proof_bound_to_identity_and_transcript() {
        let verifier = CredentialVerifier::derive("alice", "pw");
        let proof = CredentialProof::compute(&verifier, "alice", &[1u8; 32]).unwrap();
        assert!(!proof.verify(&verifier, "bob"));

        let mut moved = proof.clone();
        moved.channel_binding = [2u8; 32];
        assert!(!moved.verify(&verifier, "alice"));
    }

    #[test]
    fn test_salt_differs_per_identity() {
        let a = CredentialVerifier::derive("alice", "same");
        let b = CredentialVerifier::derive("bob", "same");
        assert_ne!(a.to_base64(), b.to_base64());
    }

    #[test]
    fn test_verifier_base64_roundtrip() {
        let verifier = CredentialVerifier::derive("alice", "pw");
        let parsed = CredentialVerifier::from_base64(&verifier.to_base64()).unwrap();
        assert_eq!(parsed.to_base64(), verifier.to_base64());
        assert!(CredentialVerifier::from_base64("AAAA").is_err());
    }
}
