// ============================================
// File: crates/burrow-server/src/services/control.rs
// ============================================
//! # Control Channel (server side)
//!
//! ## Creation Reason
//! Takes a freshly accepted transport from "just connected" to "owns an
//! authenticated session", or closes it with a reason code.
//!
//! ## Message Flow
//! ```text
//! Client                                   Server
//!   │                                        │
//!   │── ClientHello (plain) ────────────────►│  handshake_timeout
//!   │◄─────────────────── ServerHello (plain)│  signed transcript
//!   │                                        │
//!   │        channel keys derived both sides │
//!   │                                        │
//!   │── AuthRequest (sealed) ───────────────►│  auth_timeout
//!   │◄──────────────── AuthResponse (sealed) │  session created
//!   │            or Disconnect{reason}       │
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only `ClientHello`, `ServerHello` and a pre-key `Disconnect` ever
//!   travel unsealed
//! - The control channel cipher is closed once the session cipher takes
//!   over; nothing after `AuthResponse` is sealed with channel keys
//!
//! ## Last Modified
//! v0.1.0 - Initial control channel

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use burrow_common::time::SharedClock;
use burrow_core::protocol::{AuthResponse, ControlCodec};
use burrow_core::{
    ControlMessage, CoreError, HandshakeOutcome, IdentityKeyPair, ReasonCode, Role,
    SealedChannel, ServerHandshake,
};
use burrow_transport::Transport;

use crate::error::{Result, ServerError};
use crate::services::session_store::{NewSession, SessionStore};

/// Server side of the control channel.
pub struct ControlService {
    handshake: ServerHandshake,
    store: Arc<SessionStore>,
    codec: ControlCodec,
    handshake_timeout: Duration,
    auth_timeout: Duration,
    clock: SharedClock,
}

impl ControlService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        identity: Arc<IdentityKeyPair>,
        store: Arc<SessionStore>,
        handshake_timeout: Duration,
        auth_timeout: Duration,
    ) -> Self {
        let clock = store.clock();
        Self {
            handshake: ServerHandshake::new(identity),
            store,
            codec: ControlCodec::new(),
            handshake_timeout,
            auth_timeout,
            clock,
        }
    }

    /// Runs handshake and authentication on `transport`.
    ///
    /// # Errors
    /// Any handshake or admission failure. The peer has already been sent
    /// a `Disconnect` where one could be delivered.
    pub async fn admit(&self, transport: &dyn Transport) -> Result<NewSession> {
        let (outcome, channel) = self.accept_handshake(transport).await?;
        let result = self.authenticate(transport, &channel, &outcome).await;
        channel.close();
        result
    }

    /// Answers the `ClientHello` and derives the control channel.
    ///
    /// # Errors
    /// `PhaseTimeout`, `ProtocolViolation`, `UnsupportedVersion` or a
    /// transport error.
    pub async fn accept_handshake(
        &self,
        transport: &dyn Transport,
    ) -> Result<(HandshakeOutcome, SealedChannel)> {
        let peer = transport.peer_addr();
        let raw = tokio::time::timeout(self.handshake_timeout, transport.recv())
            .await
            .map_err(|_| ServerError::PhaseTimeout {
                phase: "handshake",
                peer: peer.clone(),
            })??;

        let hello = match self.codec.decode(&raw) {
            Ok(ControlMessage::ClientHello(hello)) => hello,
            Ok(other) => {
                return Err(ServerError::protocol_violation(
                    &peer,
                    format!("expected ClientHello, got {}", other.name()),
                ))
            }
            Err(e) => return Err(ServerError::protocol_violation(&peer, e.to_string())),
        };

        let (reply, outcome) = match self.handshake.respond(&hello) {
            Ok(pair) => pair,
            Err(e) => {
                if matches!(e, CoreError::UnsupportedVersion { .. }) {
                    let bye = self
                        .codec
                        .encode(&ControlMessage::disconnect(ReasonCode::VersionMismatch));
                    let _ = transport.send(&bye).await;
                }
                debug!(peer = %peer, error = %e, "Handshake rejected");
                return Err(e.into());
            }
        };

        transport
            .send(&self.codec.encode(&ControlMessage::ServerHello(reply)))
            .await?;

        let channel = SealedChannel::from_handshake(&outcome, Role::Server, Arc::clone(&self.clock));
        debug!(peer = %peer, version = %outcome.version(), "Handshake complete");
        Ok((outcome, channel))
    }

    /// Waits for the `AuthRequest` and admits the client.
    ///
    /// # Errors
    /// `PhaseTimeout`, `ProtocolViolation` or any admission error.
    pub async fn authenticate(
        &self,
        transport: &dyn Transport,
        channel: &SealedChannel,
        outcome: &HandshakeOutcome,
    ) -> Result<NewSession> {
        let peer = transport.peer_addr();
        let frame = tokio::time::timeout(self.auth_timeout, transport.recv())
            .await
            .map_err(|_| ServerError::PhaseTimeout {
                phase: "authentication",
                peer: peer.clone(),
            });
        let frame = match frame {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => return Err(e.into()),
            Err(timeout) => {
                self.reject(transport, channel, &timeout).await;
                return Err(timeout);
            }
        };

        let request = match channel.open(&frame) {
            Ok(ControlMessage::AuthRequest(request)) => request,
            Ok(other) => {
                let err = ServerError::protocol_violation(
                    &peer,
                    format!("expected AuthRequest, got {}", other.name()),
                );
                self.reject(transport, channel, &err).await;
                return Err(err);
            }
            Err(e) => {
                let err = ServerError::protocol_violation(&peer, e.to_string());
                self.reject(transport, channel, &err).await;
                return Err(err);
            }
        };

        let admitted = match self.store.create(&request.identity, &request.proof, outcome) {
            Ok(admitted) => admitted,
            Err(e) => {
                self.reject(transport, channel, &e).await;
                return Err(e);
            }
        };

        let session = &admitted.session;
        let lease_seconds =
            u32::try_from(self.store.policy().lease.as_secs()).unwrap_or(u32::MAX);
        let response = ControlMessage::AuthResponse(AuthResponse {
            session_token: session.token,
            virtual_address: session.virtual_address,
            key_seed: admitted.key_seed,
            lease_seconds,
        });
        if let Err(e) = transport.send(&channel.seal(&response)?).await {
            self.store.expire(&session.token);
            return Err(e.into());
        }

        info!(
            peer = %peer,
            session = %session.token,
            identity = %session.identity,
            virtual_ip = %session.virtual_address,
            "Client authenticated"
        );
        Ok(admitted)
    }

    async fn reject(&self, transport: &dyn Transport, channel: &SealedChannel, err: &ServerError) {
        let reason = err.reason_code();
        warn!(peer = %transport.peer_addr(), reason = ?reason, error = %err, "Rejecting client");
        if let Ok(frame) = channel.seal(&ControlMessage::disconnect(reason)) {
            let _ = transport.send(&frame).await;
        }
    }
}

impl std::fmt::Debug for ControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlService")
            .field("identity", &self.handshake.public_key().to_string())
            .field("handshake_timeout", &self.handshake_timeout)
            .field("auth_timeout", &self.auth_timeout)
            .finish_non_exhaustive()
    }
}
