// ============================================
// File: crates/burrow-client/src/control.rs
// ============================================
//! # Control Channel (client side)
//!
//! ## Creation Reason
//! Turns a freshly dialed transport into an authenticated session: server
//! identity verified against the pinned set, credentials proven without
//! sending the secret, session keys installed.
//!
//! ## Message Flow
//! ```text
//! Client                                   Server
//!   │── ClientHello (plain) ────────────────►│
//!   │◄─────────────────── ServerHello (plain)│  verify: pinned? signed?
//!   │                                        │          cert matches?
//!   │── AuthRequest{identity, proof} ───────►│  sealed, channel keys
//!   │◄──────── AuthResponse / Disconnect ────│
//!   │                                        │
//!   │  session keys = HKDF(shared, key_seed) │
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Trust failures always surface as `CertificateRejected`; never
//!   continue with an unverified server
//! - `Credentials` keeps the verifier, not the secret
//!
//! ## Last Modified
//! v0.1.0 - Initial control channel

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use burrow_common::time::SharedClock;
use burrow_common::{SessionToken, VirtualIp};
use burrow_core::protocol::{AuthRequest, ControlCodec};
use burrow_core::{
    CipherConfig, ClientHandshake, ControlMessage, CoreError, CredentialProof, CredentialVerifier,
    HandshakeOutcome, IdentityPublicKey, ProtocolVersion, Role, SealedChannel, SessionCipher,
    TrustedServers,
};
use burrow_transport::Transport;

use crate::error::{ClientError, Result};

// ============================================
// Credentials
// ============================================

/// Identity plus the verifier derived from its secret.
#[derive(Clone)]
pub struct Credentials {
    identity: String,
    verifier: CredentialVerifier,
}

impl Credentials {
    /// Derives the verifier; `secret` is not retained.
    #[must_use]
    pub fn new(identity: impl Into<String>, secret: &str) -> Self {
        let identity = identity.into();
        let verifier = CredentialVerifier::derive(&identity, secret);
        Self { identity, verifier }
    }

    /// Account identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

// ============================================
// SessionDescriptor
// ============================================

/// Everything the data plane needs about an issued session.
#[derive(Debug)]
pub struct SessionDescriptor {
    /// Opaque session handle.
    pub token: SessionToken,
    /// Address assigned inside the tunnel.
    pub virtual_address: VirtualIp,
    /// Lease granted by the server.
    pub lease: Duration,
    /// Verified server identity.
    pub server_identity: IdentityPublicKey,
    /// Negotiated protocol version.
    pub version: ProtocolVersion,
    /// Data plane cipher.
    pub cipher: Arc<SessionCipher>,
}

// ============================================
// ControlClient
// ============================================

/// Client side of the control channel.
pub struct ControlClient {
    trusted: TrustedServers,
    credentials: Credentials,
    codec: ControlCodec,
    cipher_config: CipherConfig,
    reply_timeout: Duration,
    clock: SharedClock,
}

impl ControlClient {
    /// Creates the control client.
    #[must_use]
    pub fn new(
        trusted: TrustedServers,
        credentials: Credentials,
        reply_timeout: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            trusted,
            credentials,
            codec: ControlCodec::new(),
            cipher_config: CipherConfig::default(),
            reply_timeout,
            clock,
        }
    }

    /// Runs handshake and authentication on `transport`.
    ///
    /// # Errors
    /// Classified failures; see [`ClientError::lifecycle_event`].
    pub async fn establish(&self, transport: &dyn Transport) -> Result<SessionDescriptor> {
        let (outcome, channel) = self.handshake(transport).await?;
        let result = self.authenticate(transport, &channel, &outcome).await;
        channel.close();
        result
    }

    /// Sends `ClientHello`, verifies `ServerHello` and derives the
    /// control channel.
    ///
    /// # Errors
    /// - `CertificateRejected` if the server identity cannot be verified
    /// - `ServerDisconnect` if the server refused the version
    /// - `PhaseTimeout`, `UnexpectedMessage` or a transport error otherwise
    pub async fn handshake(
        &self,
        transport: &dyn Transport,
    ) -> Result<(HandshakeOutcome, SealedChannel)> {
        let handshake = ClientHandshake::start(ProtocolVersion::current());
        transport
            .send(&self.codec.encode(&ControlMessage::ClientHello(handshake.hello().clone())))
            .await?;

        let raw = self.recv_reply(transport, "handshake").await?;
        let reply = match self.codec.decode(&raw)? {
            ControlMessage::ServerHello(reply) => reply,
            ControlMessage::Disconnect(bye) => {
                return Err(ClientError::ServerDisconnect { reason: bye.reason })
            }
            other => return Err(CoreError::unexpected("ServerHello", other.name()).into()),
        };

        let certificate = transport.peer_certificate();
        let outcome = handshake.finish(
            &reply,
            &self.trusted,
            certificate.as_ref().map(|cert| cert.public_key()),
        )?;

        debug!(
            server = %outcome.server_identity(),
            version = %outcome.version(),
            "Server identity verified"
        );
        let channel = SealedChannel::from_handshake(&outcome, Role::Client, Arc::clone(&self.clock));
        Ok((outcome, channel))
    }

    /// Proves the credentials and installs the issued session.
    ///
    /// # Errors
    /// - `Credential` if the server rejected the credentials
    /// - `ServerDisconnect` for any other refusal
    /// - `PhaseTimeout`, `UnexpectedMessage` or a transport error otherwise
    pub async fn authenticate(
        &self,
        transport: &dyn Transport,
        channel: &SealedChannel,
        outcome: &HandshakeOutcome,
    ) -> Result<SessionDescriptor> {
        let proof = CredentialProof::compute(
            &self.credentials.verifier,
            &self.credentials.identity,
            outcome.transcript_hash(),
        )?;
        let request = ControlMessage::AuthRequest(AuthRequest {
            identity: self.credentials.identity.clone(),
            proof,
        });
        transport.send(&channel.seal(&request)?).await?;

        let frame = self.recv_reply(transport, "authentication").await?;
        let response = match channel.open(&frame)? {
            ControlMessage::AuthResponse(response) => response,
            ControlMessage::Disconnect(bye) if bye.reason.is_credential_rejection() => {
                return Err(ClientError::Credential { reason: bye.reason })
            }
            ControlMessage::Disconnect(bye) => {
                return Err(ClientError::ServerDisconnect { reason: bye.reason })
            }
            other => return Err(CoreError::unexpected("AuthResponse", other.name()).into()),
        };

        let keys = outcome.session_keys(&response.key_seed)?;
        let cipher = SessionCipher::for_client(&keys, Arc::clone(&self.clock), self.cipher_config);

        Ok(SessionDescriptor {
            token: response.session_token,
            virtual_address: response.virtual_address,
            lease: Duration::from_secs(u64::from(response.lease_seconds)),
            server_identity: *outcome.server_identity(),
            version: outcome.version(),
            cipher: Arc::new(cipher),
        })
    }

    async fn recv_reply(&self, transport: &dyn Transport, phase: &'static str) -> Result<Bytes> {
        tokio::time::timeout(self.reply_timeout, transport.recv())
            .await
            .map_err(|_| ClientError::PhaseTimeout { phase })?
            .map_err(ClientError::from)
    }
}

impl fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlClient")
            .field("identity", &self.credentials.identity)
            .field("trusted_servers", &self.trusted.len())
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}
