// ============================================
// File: crates/burrow-core/src/crypto/handshake.rs
// ============================================
//! # Handshake Cryptography
//!
//! ## Creation Reason
//! Establishes the secured control channel: ephemeral X25519 agreement,
//! authenticated by the server's Ed25519 identity signing the transcript.
//! Clients pin the identities they accept.
//!
//! ## Handshake Flow
//! ```text
//! Client                                          Server
//!   │  ClientHello                                  │
//!   │  ├─ proposed_version                          │
//!   │  └─ client_ephemeral (X25519) ──────────────► │
//!   │                                               │ negotiate version
//!   │                                               │ generate ephemeral
//!   │                                               │ sign SHA-256(transcript)
//!   │                                  ServerHello  │
//!   │  ◄───────────────── chosen_version            │
//!   │                     server_identity (Ed25519) │
//!   │                     server_ephemeral (X25519) │
//!   │                     signature                 │
//!   │                                               │
//!   │  identity pinned?  ── no ──► CertificateRejected
//!   │  transport cert matches? ─ no ─► CertificateRejected
//!   │  signature valid?  ── no ──► CertificateRejected
//!   │                                               │
//!   │  channel keys = HKDF(X25519, salt = transcript hash)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The transcript layout is part of the protocol; never reorder
//! - Every trust failure is `CertificateRejected`; callers treat it as
//!   fatal and never fall back to an unauthenticated channel
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake crypto implementation

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::kdf::{derive_channel_keys, derive_session_keys, DirectionKeys};
use super::keys::{EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, SharedSecret};
use super::{DIGEST_SIZE, ED25519_PUBLIC_KEY_SIZE, KEY_SEED_SIZE, X25519_PUBLIC_KEY_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::messages::{ClientHello, ServerHello};
use crate::protocol::version::ProtocolVersion;

const TRANSCRIPT_LABEL: &[u8] = b"burrow/v1 handshake";

/// Hash of everything both sides said during the handshake.
///
/// ```text
/// SHA-256( label || proposed_version || client_ephemeral ||
///          chosen_version || server_identity || server_ephemeral )
/// ```
#[must_use]
pub fn transcript_hash(
    hello: &ClientHello,
    chosen_version: ProtocolVersion,
    server_identity: &[u8; ED25519_PUBLIC_KEY_SIZE],
    server_ephemeral: &[u8; X25519_PUBLIC_KEY_SIZE],
) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(TRANSCRIPT_LABEL);
    hasher.update([hello.proposed_version.as_u8()]);
    hasher.update(hello.client_ephemeral);
    hasher.update([chosen_version.as_u8()]);
    hasher.update(server_identity);
    hasher.update(server_ephemeral);
    hasher.finalize().into()
}

// ============================================
// TrustedServers
// ============================================

/// Pinned set of server identities a client accepts.
///
/// An empty set accepts nobody.
#[derive(Debug, Clone, Default)]
pub struct TrustedServers {
    keys: Vec<IdentityPublicKey>,
}

impl TrustedServers {
    /// Builds a trust set.
    pub fn new(keys: impl IntoIterator<Item = IdentityPublicKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Whether `identity` is pinned.
    #[must_use]
    pub fn contains(&self, identity: &[u8; ED25519_PUBLIC_KEY_SIZE]) -> bool {
        self.keys
            .iter()
            .fold(false, |found, key| found | bool::from(key.to_bytes().ct_eq(identity)))
    }

    /// Number of pinned identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no identity is pinned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// ============================================
// HandshakeOutcome
// ============================================

/// Result of a completed handshake, held for the life of one connection.
#[derive(Debug)]
pub struct HandshakeOutcome {
    version: ProtocolVersion,
    server_identity: IdentityPublicKey,
    shared: SharedSecret,
    transcript_hash: [u8; DIGEST_SIZE],
    channel_keys: DirectionKeys,
}

impl HandshakeOutcome {
    fn build(
        version: ProtocolVersion,
        server_identity: IdentityPublicKey,
        shared: SharedSecret,
        transcript_hash: [u8; DIGEST_SIZE],
    ) -> Result<Self> {
        let channel_keys = derive_channel_keys(&shared, &transcript_hash)?;
        Ok(Self {
            version,
            server_identity,
            shared,
            transcript_hash,
            channel_keys,
        })
    }

    /// Negotiated protocol version.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Authenticated server identity.
    #[must_use]
    pub const fn server_identity(&self) -> &IdentityPublicKey {
        &self.server_identity
    }

    /// Transcript hash, used as channel binding for credential proofs.
    #[must_use]
    pub const fn transcript_hash(&self) -> &[u8; DIGEST_SIZE] {
        &self.transcript_hash
    }

    /// Control-channel keys.
    #[must_use]
    pub const fn channel_keys(&self) -> &DirectionKeys {
        &self.channel_keys
    }

    /// Session keys for the session salted with `key_seed`.
    ///
    /// # Errors
    /// Returns `KeyDerivation` if HKDF fails.
    pub fn session_keys(&self, key_seed: &[u8; KEY_SEED_SIZE]) -> Result<DirectionKeys> {
        derive_session_keys(&self.shared, key_seed)
    }
}

// ============================================
// Client Side
// ============================================

/// Client half of the handshake.
#[derive(Debug)]
pub struct ClientHandshake {
    ephemeral: EphemeralKeyPair,
    hello: ClientHello,
}

impl ClientHandshake {
    /// Generates an ephemeral key and the `ClientHello` to send.
    #[must_use]
    pub fn start(version: ProtocolVersion) -> Self {
        let ephemeral = EphemeralKeyPair::generate();
        let hello = ClientHello {
            proposed_version: version,
            client_ephemeral: ephemeral.public_key_bytes(),
        };
        Self { ephemeral, hello }
    }

    /// The message to send.
    #[must_use]
    pub const fn hello(&self) -> &ClientHello {
        &self.hello
    }

    /// Verifies the server's reply and derives the channel keys.
    ///
    /// `peer_certificate` is the identity the transport authenticated, if
    /// the transport authenticates peers at all.
    ///
    /// # Errors
    /// - `UnsupportedVersion`: server chose a version we did not offer
    /// - `CertificateRejected`: identity not pinned, transport certificate
    ///   mismatch, or bad signature
    /// - `KeyExchange`: degenerate server ephemeral
    pub fn finish(
        self,
        reply: &ServerHello,
        trusted: &TrustedServers,
        peer_certificate: Option<&[u8; ED25519_PUBLIC_KEY_SIZE]>,
    ) -> Result<HandshakeOutcome> {
        let proposed = self.hello.proposed_version;
        if !proposed.is_compatible_with(&reply.chosen_version) || reply.chosen_version > proposed {
            return Err(CoreError::UnsupportedVersion {
                got: reply.chosen_version.as_u8(),
                expected_major: proposed.major(),
            });
        }

        if !trusted.contains(&reply.server_identity) {
            return Err(CoreError::certificate_rejected("server identity is not pinned"));
        }

        if let Some(cert) = peer_certificate {
            if !bool::from(cert.ct_eq(&reply.server_identity)) {
                return Err(CoreError::certificate_rejected(
                    "transport certificate does not match handshake identity",
                ));
            }
        }

        let identity = IdentityPublicKey::from_bytes(&reply.server_identity)
            .map_err(|_| CoreError::certificate_rejected("server identity is not a valid key"))?;
        let hash = transcript_hash(
            &self.hello,
            reply.chosen_version,
            &reply.server_identity,
            &reply.server_ephemeral,
        );
        identity
            .verify(&hash, &reply.signature)
            .map_err(|_| CoreError::certificate_rejected("handshake signature is invalid"))?;

        let shared = self.ephemeral.exchange(&reply.server_ephemeral)?;
        HandshakeOutcome::build(reply.chosen_version, identity, shared, hash)
    }
}

// ============================================
// Server Side
// ============================================

/// Server half of the handshake.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    identity: Arc<IdentityKeyPair>,
    version: ProtocolVersion,
}

impl ServerHandshake {
    /// Creates the responder for `identity`.
    #[must_use]
    pub fn new(identity: Arc<IdentityKeyPair>) -> Self {
        Self {
            identity,
            version: ProtocolVersion::current(),
        }
    }

    /// Overrides the version this server speaks.
    #[must_use]
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Server identity public key.
    #[must_use]
    pub fn public_key(&self) -> IdentityPublicKey {
        self.identity.public_key()
    }

    /// Answers a `ClientHello`.
    ///
    /// # Errors
    /// - `UnsupportedVersion`: majors differ
    /// - `KeyExchange`: degenerate client ephemeral
    pub fn respond(&self, hello: &ClientHello) -> Result<(ServerHello, HandshakeOutcome)> {
        let chosen = self.version.negotiate(hello.proposed_version)?;
        let ephemeral = EphemeralKeyPair::generate();
        let server_ephemeral = ephemeral.public_key_bytes();
        let public = self.identity.public_key();
        let server_identity = public.to_bytes();

        let hash = transcript_hash(hello, chosen, &server_identity, &server_ephemeral);
        let reply = ServerHello {
            chosen_version: chosen,
            server_identity,
            server_ephemeral,
            signature: self.identity.sign(&hash),
        };

        let shared = ephemeral.exchange(&hello.client_ephemeral)?;
        let outcome = HandshakeOutcome::build(chosen, public, shared, hash)?;
        Ok((reply, outcome))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ServerHandshake {
        ServerHandshake::new(Arc::new(IdentityKeyPair::generate()))
    }

    #[test]
    fn test_full_handshake() {
        let server = server();
        let trusted = TrustedServers::new([server.public_key()]);

        let client = ClientHandshake::start(ProtocolVersion::current());
        let (reply, server_outcome) = server.respond(client.hello()).unwrap();
        let client_outcome = client.finish(&reply, &trusted, None).unwrap();

        assert_eq!(client_outcome.transcript_hash(), server_outcome.transcript_hash());
        assert_eq!(client_outcome.channel_keys(), server_outcome.channel_keys());
        assert_eq!(
            client_outcome.session_keys(&[1; 32]).unwrap(),
            server_outcome.session_keys(&[1; 32]).unwrap()
        );
        assert_eq!(client_outcome.server_identity(), &server.public_key());
    }

    #[test]
    fn test_unpinned_identity_rejected() {
        let server = server();
        let trusted = TrustedServers::new([IdentityKeyPair::generate().public_key()]);

        let client = ClientHandshake::start(ProtocolVersion::current());
        let (reply, _) = server.respond(client.hello()).unwrap();
        let err = client.finish(&reply, &trusted, None).unwrap_err();
        assert!(matches!(err, CoreError::CertificateRejected { .. }));
    }

    #[test]
    fn test_empty_trust_set_fails_closed() {
        let server = server();
        let client = ClientHandshake::start(ProtocolVersion::current());
        let (reply, _) = server.respond(client.hello()).unwrap();
        assert!(client
            .finish(&reply, &TrustedServers::default(), None)
            .unwrap_err()
            .is_fatal());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let server = server();
        let trusted = TrustedServers::new([server.public_key()]);
        let client = ClientHandshake::start(ProtocolVersion::current());
        let (mut reply, _) = server.respond(client.hello()).unwrap();
        reply.signature[0] ^= 0x01;

        assert!(matches!(
            client.finish(&reply, &trusted, None),
            Err(CoreError::CertificateRejected { .. })
        ));
    }

    #[test]
    fn test_substituted_ephemeral_rejected() {
        let server = server();
        let trusted = TrustedServers::new([server.public_key()]);
        let client = ClientHandshake::start(ProtocolVersion::current());
        let (mut reply, _) = server.respond(client.hello()).unwrap();
        reply.server_ephemeral = EphemeralKeyPair::generate().public_key_bytes();

        assert!(matches!(
            client.finish(&reply, &trusted, None),
            Err(CoreError::CertificateRejected { .. })
        ));
    }

    #[test]
    fn test_transport_certificate_must_match() {
        let server = server();
        let trusted = TrustedServers::new([server.public_key()]);

        let client = ClientHandshake::start(ProtocolVersion::current());
        let (reply, _) = server.respond(client.hello()).unwrap();
        let other = IdentityKeyPair::generate().public_key().to_bytes();
        assert!(matches!(
            client.finish(&reply, &trusted, Some(&other)),
            Err(CoreError::CertificateRejected { .. })
        ));

        let client = ClientHandshake::start(ProtocolVersion::current());
        let (reply, _) = server.respond(client.hello()).unwrap();
        let own = server.public_key().to_bytes();
        assert!(client.finish(&reply, &trusted, Some(&own)).is_ok());
    }

    #[test]
    fn test_version_negotiation() {
        let server = server().with_version(ProtocolVersion::new(0x13));
        let trusted = TrustedServers::new([server.public_key()]);

        let client = ClientHandshake::start(ProtocolVersion::new(0x11));
        let (reply, outcome) = server.respond(client.hello()).unwrap();
        assert_eq!(reply.chosen_version, ProtocolVersion::new(0x11));
        assert_eq!(outcome.version(), ProtocolVersion::new(0x11));
        assert!(client.finish(&reply, &trusted, None).is_ok());

        let client = ClientHandshake::start(ProtocolVersion::new(0x21));
        assert!(matches!(
            server.respond(client.hello()),
            Err(CoreError::UnsupportedVersion { .. })
        ));
    }
}
