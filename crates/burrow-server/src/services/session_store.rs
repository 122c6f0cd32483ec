// ============================================
// File: crates/burrow-server/src/services/session_store.rs
// ============================================
//! # Session Store
//!
//! ## Creation Reason
//! Owns every authenticated session: admission (credentials and
//! limits), address assignment, per-session key material, lookup,
//! key rotation and teardown.
//!
//! ## Session Lifecycle
//! ```text
//!   AuthRequest ──► create() ──► Active ──┬── expire()  (disconnect,
//!                      │                  │              transport loss)
//!                      │                  ├── cleanup_expired()
//!                      │                  │     (lease or idle timeout)
//!                      ▼                  ▼
//!              rejected with a       address released, route removed,
//!              ServerError           cipher invalidated
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Admission checks and counter updates happen under one mutex so two
//!   concurrent logins cannot both take the last slot
//! - `expire` is idempotent; workers and cleanup may race on it
//! - The key seed returned by `create`/`rotate_keys` is secret and must
//!   only ever travel inside a sealed frame
//!
//! ## Last Modified
//! v0.1.0 - Initial session store

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use burrow_common::time::SharedClock;
use burrow_common::{AtomicInstant, SessionToken, VirtualIp};
use burrow_core::crypto::KEY_SEED_SIZE;
use burrow_core::{CipherConfig, CredentialProof, HandshakeOutcome, SessionCipher};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::services::credentials::CredentialStore;
use crate::services::ip_pool::IpPool;
use crate::services::routing::RoutingTable;

/// Packets buffered per session between the adapter reader and the
/// worker.
pub const INBOX_CAPACITY: usize = 256;

// ============================================
// SessionPolicy
// ============================================

/// Admission and lifetime limits applied by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Maximum concurrent sessions per identity.
    pub max_per_identity: usize,
    /// Session lease.
    pub lease: Duration,
    /// Sessions with no traffic for this long are reaped.
    pub idle_timeout: Duration,
    /// Per-session cipher tunables.
    pub cipher: CipherConfig,
}

impl SessionPolicy {
    /// Extracts the policy from a server configuration.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_sessions: config.limits.max_sessions,
            max_per_identity: config.limits.max_sessions_per_identity,
            lease: config.limits.lease(),
            idle_timeout: config.limits.idle_timeout(),
            cipher: config.cipher_config(),
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

// ============================================
// SessionStats
// ============================================

/// Per-session traffic counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Tunnel bytes sent to the client.
    pub bytes_sent: AtomicU64,
    /// Tunnel bytes received from the client.
    pub bytes_received: AtomicU64,
    /// Packets sent to the client.
    pub packets_sent: AtomicU64,
    /// Packets received from the client.
    pub packets_received: AtomicU64,
    /// Frames rejected as replays.
    pub replays_blocked: AtomicU64,
    /// Frames that failed authentication.
    pub auth_failures: AtomicU64,
    /// Frames dropped for any other per-packet reason.
    pub dropped: AtomicU64,
}

impl SessionStats {
    /// Records one frame sent.
    pub fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one frame received.
    pub fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters out.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            replays_blocked: self.replays_blocked.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub replays_blocked: u64,
    pub auth_failures: u64,
    pub dropped: u64,
}

impl std::ops::AddAssign for StatsSnapshot {
    fn add_assign(&mut self, rhs: Self) {
        self.bytes_sent += rhs.bytes_sent;
        self.bytes_received += rhs.bytes_received;
        self.packets_sent += rhs.packets_sent;
        self.packets_received += rhs.packets_received;
        self.replays_blocked += rhs.replays_blocked;
        self.auth_failures += rhs.auth_failures;
        self.dropped += rhs.dropped;
    }
}

// ============================================
// Session
// ============================================

/// One authenticated client session.
pub struct Session {
    /// Opaque session handle.
    pub token: SessionToken,
    /// Authenticated identity.
    pub identity: String,
    /// Assigned tunnel address.
    pub virtual_address: VirtualIp,
    /// Data plane cipher.
    pub cipher: SessionCipher,
    /// Creation time.
    pub created_at: Instant,
    /// Traffic counters.
    pub stats: SessionStats,
    expires_at: AtomicInstant,
    last_activity: AtomicInstant,
    closed: Notify,
    clock: SharedClock,
}

impl Session {
    /// Marks the session active now.
    pub fn touch(&self) {
        self.last_activity.store(self.clock.now());
    }

    /// Time since the last activity.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed_at(self.clock.now())
    }

    /// Current expiry.
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at.load()
    }

    /// Whether the lease ran out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.clock.now() >= self.expires_at.load()
    }

    /// Completes once the session has been expired.
    pub async fn closed(&self) {
        if self.cipher.is_invalidated() {
            return;
        }
        let notified = self.closed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.cipher.is_invalidated() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token)
            .field("identity", &self.identity)
            .field("virtual_address", &self.virtual_address)
            .field("idle", &self.idle_time())
            .finish_non_exhaustive()
    }
}

/// Everything the control path needs after a successful admission.
pub struct NewSession {
    /// The stored session.
    pub session: Arc<Session>,
    /// Seed the client ratchets its session keys from.
    pub key_seed: [u8; KEY_SEED_SIZE],
    /// Adapter packets routed to this session.
    pub inbox: mpsc::Receiver<Bytes>,
}

impl std::fmt::Debug for NewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewSession")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

// ============================================
// SessionStore
// ============================================

/// Concurrent session table.
pub struct SessionStore {
    policy: SessionPolicy,
    sessions: DashMap<SessionToken, Arc<Session>>,
    /// Live sessions per identity; also serializes create, rotate and
    /// expire.
    per_identity: Mutex<HashMap<String, usize>>,
    pool: Arc<IpPool>,
    routing: Arc<RoutingTable>,
    credentials: Arc<dyn CredentialStore>,
    clock: SharedClock,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(
        policy: SessionPolicy,
        pool: Arc<IpPool>,
        routing: Arc<RoutingTable>,
        credentials: Arc<dyn CredentialStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            policy,
            sessions: DashMap::new(),
            per_identity: Mutex::new(HashMap::new()),
            pool,
            routing,
            credentials,
            clock,
        }
    }

    /// Admits a client that proved `identity` over the handshake in
    /// `handshake`.
    ///
    /// # Errors
    /// - `CredentialsRejected` for a bad, unbound or unknown proof
    /// - `SessionLimitReached` / `IdentityLimitReached` at capacity
    /// - `PoolExhausted` when no address is free
    pub fn create(
        &self,
        identity: &str,
        proof: &CredentialProof,
        handshake: &HandshakeOutcome,
    ) -> Result<NewSession> {
        if !proof.is_bound_to(handshake.transcript_hash())
            || !self.credentials.verify(identity, proof)
        {
            warn!(identity = %identity, "Credentials rejected");
            return Err(ServerError::CredentialsRejected {
                identity: identity.to_string(),
            });
        }

        let mut per_identity = self.per_identity.lock();
        if self.sessions.len() >= self.policy.max_sessions {
            warn!(limit = self.policy.max_sessions, "Session limit reached");
            return Err(ServerError::SessionLimitReached {
                limit: self.policy.max_sessions,
            });
        }
        let live = per_identity.get(identity).copied().unwrap_or(0);
        if live >= self.policy.max_per_identity {
            warn!(identity = %identity, live, "Identity session limit reached");
            return Err(ServerError::IdentityLimitReached {
                identity: identity.to_string(),
                limit: self.policy.max_per_identity,
            });
        }

        let virtual_address = self.pool.allocate()?;
        let mut key_seed = [0u8; KEY_SEED_SIZE];
        OsRng.fill_bytes(&mut key_seed);
        let keys = match handshake.session_keys(&key_seed) {
            Ok(keys) => keys,
            Err(e) => {
                self.pool.release(virtual_address);
                return Err(e.into());
            }
        };

        let mut token = SessionToken::generate();
        while self.sessions.contains_key(&token) {
            token = SessionToken::generate();
        }

        let now = self.clock.now();
        let expires_at = now + self.policy.lease;
        let cipher = SessionCipher::for_server(&keys, Arc::clone(&self.clock), self.policy.cipher);
        cipher.set_expires_at(Some(expires_at));

        let session = Arc::new(Session {
            token,
            identity: identity.to_string(),
            virtual_address,
            cipher,
            created_at: now,
            stats: SessionStats::default(),
            expires_at: AtomicInstant::from_instant(expires_at),
            last_activity: AtomicInstant::from_instant(now),
            closed: Notify::new(),
            clock: Arc::clone(&self.clock),
        });

        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        self.sessions.insert(token, Arc::clone(&session));
        *per_identity.entry(identity.to_string()).or_insert(0) += 1;
        drop(per_identity);
        self.routing.add_route(virtual_address, token, tx);

        info!(
            session = %token,
            identity = %identity,
            virtual_ip = %virtual_address,
            active = self.sessions.len(),
            "Session created"
        );

        Ok(NewSession {
            session,
            key_seed,
            inbox,
        })
    }

    /// Finds a live session.
    ///
    /// # Errors
    /// `SessionNotFound` if unknown or past its lease.
    pub fn lookup(&self, token: &SessionToken) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .get(token)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ServerError::SessionNotFound(*token))?;
        if session.is_expired() {
            return Err(ServerError::SessionNotFound(*token));
        }
        Ok(session)
    }

    /// Stages a key rotation and returns the seed to announce.
    ///
    /// The receive side switches now; the caller seals the `Rekey` under
    /// the old send key and then calls `commit_staged_send` on the cipher.
    ///
    /// # Errors
    /// `SessionNotFound`, or a key derivation failure.
    pub fn rotate_keys(&self, token: &SessionToken) -> Result<[u8; KEY_SEED_SIZE]> {
        let _serialized = self.per_identity.lock();
        let session = self.lookup(token)?;
        let mut seed = [0u8; KEY_SEED_SIZE];
        OsRng.fill_bytes(&mut seed);
        session.cipher.stage_rotation(&seed)?;
        debug!(
            session = %token,
            rotations = session.cipher.rotations(),
            "Session keys rotated"
        );
        Ok(seed)
    }

    /// Extends the lease of a live session.
    ///
    /// # Errors
    /// `SessionNotFound` if unknown or already expired.
    pub fn renew(&self, token: &SessionToken) -> Result<Instant> {
        let session = self.lookup(token)?;
        let expires_at = self.clock.now() + self.policy.lease;
        session.expires_at.store(expires_at);
        session.cipher.set_expires_at(Some(expires_at));
        debug!(session = %token, "Session lease renewed");
        Ok(expires_at)
    }

    /// Tears a session down. Returns it if it was still present.
    pub fn expire(&self, token: &SessionToken) -> Option<Arc<Session>> {
        let mut per_identity = self.per_identity.lock();
        let (_, session) = self.sessions.remove(token)?;
        if let Some(count) = per_identity.get_mut(&session.identity) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                per_identity.remove(&session.identity);
            }
        }
        drop(per_identity);

        self.routing.remove_route(session.virtual_address, token);
        self.pool.release(session.virtual_address);
        session.cipher.invalidate();
        session.closed.notify_waiters();

        let stats = session.stats.snapshot();
        info!(
            session = %token,
            identity = %session.identity,
            virtual_ip = %session.virtual_address,
            duration_secs = self.clock.now().saturating_duration_since(session.created_at).as_secs(),
            bytes_sent = stats.bytes_sent,
            bytes_received = stats.bytes_received,
            replays_blocked = stats.replays_blocked,
            "Session expired"
        );
        Some(session)
    }

    /// Expires every session past its lease or idle for too long.
    pub fn cleanup_expired(&self) -> Vec<SessionToken> {
        let idle_timeout = self.policy.idle_timeout;
        let stale: Vec<SessionToken> = self
            .sessions
            .iter()
            .filter(|entry| {
                let session = entry.value();
                session.is_expired() || session.idle_time() > idle_timeout
            })
            .map(|entry| *entry.key())
            .collect();

        let expired: Vec<SessionToken> = stale
            .into_iter()
            .filter(|token| self.expire(token).is_some())
            .collect();
        if !expired.is_empty() {
            info!(count = expired.len(), "Cleaned up stale sessions");
        }
        expired
    }

    /// Expires everything; used on shutdown.
    pub fn expire_all(&self) -> usize {
        let tokens: Vec<SessionToken> = self.sessions.iter().map(|e| *e.key()).collect();
        tokens.iter().filter(|t| self.expire(t).is_some()).count()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Live sessions held by `identity`.
    #[must_use]
    pub fn identity_count(&self, identity: &str) -> usize {
        self.per_identity.lock().get(identity).copied().unwrap_or(0)
    }

    /// Sum of the counters of every live session.
    #[must_use]
    pub fn aggregate_stats(&self) -> StatsSnapshot {
        let mut total = StatsSnapshot::default();
        for entry in &self.sessions {
            total += entry.value().stats.snapshot();
        }
        total
    }

    /// Policy in force.
    #[must_use]
    pub const fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Clock shared with the sessions.
    #[must_use]
    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.count())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use burrow_common::ManualClock;
    use burrow_core::{
        ClientHandshake, CredentialVerifier, IdentityKeyPair, ProtocolVersion, ServerHandshake,
        TrustedServers,
    };

    use super::*;
    use crate::services::credentials::FileCredentialStore;

    struct Fixture {
        store: SessionStore,
        pool: Arc<IpPool>,
        routing: Arc<RoutingTable>,
        clock: Arc<ManualClock>,
        server: ServerHandshake,
    }

    fn fixture(policy: SessionPolicy) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let pool = Arc::new(
            IpPool::new(Ipv4Addr::new(10, 8, 0, 0), 29, Ipv4Addr::new(10, 8, 0, 1)).unwrap(),
        );
        let routing = Arc::new(RoutingTable::new());
        let credentials = FileCredentialStore::new();
        credentials.insert("alice", CredentialVerifier::derive("alice", "wonderland"));
        credentials.insert("bob", CredentialVerifier::derive("bob", "builder"));
        let store = SessionStore::new(
            policy,
            Arc::clone(&pool),
            Arc::clone(&routing),
            Arc::new(credentials),
            clock.clone(),
        );
        Fixture {
            store,
            pool,
            routing,
            clock,
            server: ServerHandshake::new(Arc::new(IdentityKeyPair::generate())),
        }
    }

    fn handshake(server: &ServerHandshake) -> HandshakeOutcome {
        let client = ClientHandshake::start(ProtocolVersion::current());
        let (_, outcome) = server.respond(client.hello()).unwrap();
        outcome
    }

    fn proof(identity: &str, secret: &str, outcome: &HandshakeOutcome) -> CredentialProof {
        CredentialProof::compute(
            &CredentialVerifier::derive(identity, secret),
            identity,
            outcome.transcript_hash(),
        )
        .unwrap()
    }

    fn login(f: &Fixture, identity: &str, secret: &str) -> Result<NewSession> {
        let outcome = handshake(&f.server);
        f.store
            .create(identity, &proof(identity, secret, &outcome), &outcome)
    }

    #[test]
    fn test_create_assigns_address_and_route() {
        let f = fixture(SessionPolicy::default());
        let new = login(&f, "alice", "wonderland").unwrap();
        let session = &new.session;

        assert_eq!(session.identity, "alice");
        assert!(f.pool.is_allocated(session.virtual_address));
        assert_eq!(f.routing.lookup(session.virtual_address), Some(session.token));
        assert_eq!(f.store.count(), 1);
        assert_eq!(f.store.identity_count("alice"), 1);
        assert!(f.store.lookup(&session.token).is_ok());
    }

    #[test]
    fn test_bad_credentials_rejected() {
        let f = fixture(SessionPolicy::default());
        let err = login(&f, "alice", "looking-glass").unwrap_err();
        assert!(matches!(err, ServerError::CredentialsRejected { .. }));
        let err = login(&f, "mallory", "anything").unwrap_err();
        assert!(matches!(err, ServerError::CredentialsRejected { .. }));
        assert_eq!(f.store.count(), 0);
        assert_eq!(f.pool.allocated_count(), 0);
    }

    #[test]
    fn test_proof_from_other_handshake_rejected() {
        let f = fixture(SessionPolicy::default());
        let first = handshake(&f.server);
        let second = handshake(&f.server);
        let stolen = proof("alice", "wonderland", &first);

        let err = f.store.create("alice", &stolen, &second).unwrap_err();
        assert!(matches!(err, ServerError::CredentialsRejected { .. }));
    }

    #[test]
    fn test_identity_and_global_limits() {
        let policy = SessionPolicy {
            max_sessions: 3,
            max_per_identity: 2,
            ..SessionPolicy::default()
        };
        let f = fixture(policy);
        let _a1 = login(&f, "alice", "wonderland").unwrap();
        let _a2 = login(&f, "alice", "wonderland").unwrap();
        assert!(matches!(
            login(&f, "alice", "wonderland"),
            Err(ServerError::IdentityLimitReached { limit: 2, .. })
        ));

        let _b1 = login(&f, "bob", "builder").unwrap();
        assert!(matches!(
            login(&f, "bob", "builder"),
            Err(ServerError::SessionLimitReached { limit: 3 })
        ));
    }

    #[test]
    fn test_pool_exhaustion() {
        // /29 leaves five client addresses
        let policy = SessionPolicy {
            max_per_identity: 10,
            ..SessionPolicy::default()
        };
        let f = fixture(policy);
        let held: Vec<_> = (0..5).map(|_| login(&f, "alice", "wonderland").unwrap()).collect();
        assert!(matches!(
            login(&f, "alice", "wonderland"),
            Err(ServerError::PoolExhausted)
        ));
        assert_eq!(held.len(), 5);
        assert_eq!(f.store.count(), 5);
    }

    #[tokio::test]
    async fn test_expire_releases_everything() {
        let f = fixture(SessionPolicy::default());
        let new = login(&f, "alice", "wonderland").unwrap();
        let session = Arc::clone(&new.session);
        let token = session.token;

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.closed().await })
        };
        tokio::task::yield_now().await;

        assert!(f.store.expire(&token).is_some());
        assert!(f.store.expire(&token).is_none());
        waiter.await.unwrap();

        assert!(session.cipher.is_invalidated());
        assert!(!f.pool.is_allocated(session.virtual_address));
        assert!(f.routing.lookup(session.virtual_address).is_none());
        assert_eq!(f.store.identity_count("alice"), 0);
        assert!(matches!(
            f.store.lookup(&token),
            Err(ServerError::SessionNotFound(_))
        ));

        // closed() after the fact returns at once
        session.closed().await;
    }

    #[test]
    fn test_lease_expiry_and_renewal() {
        let policy = SessionPolicy {
            lease: Duration::from_secs(100),
            idle_timeout: Duration::from_secs(1000),
            ..SessionPolicy::default()
        };
        let f = fixture(policy);
        let a = login(&f, "alice", "wonderland").unwrap();
        let b = login(&f, "bob", "builder").unwrap();

        f.clock.advance(Duration::from_secs(60));
        f.store.renew(&a.session.token).unwrap();
        f.clock.advance(Duration::from_secs(60));

        assert!(matches!(
            f.store.lookup(&b.session.token),
            Err(ServerError::SessionNotFound(_))
        ));
        assert!(f.store.lookup(&a.session.token).is_ok());

        let reaped = f.store.cleanup_expired();
        assert_eq!(reaped, vec![b.session.token]);
        assert_eq!(f.store.count(), 1);
    }

    #[test]
    fn test_idle_sessions_reaped() {
        let policy = SessionPolicy {
            idle_timeout: Duration::from_secs(30),
            ..SessionPolicy::default()
        };
        let f = fixture(policy);
        let quiet = login(&f, "alice", "wonderland").unwrap();
        let busy = login(&f, "bob", "builder").unwrap();

        f.clock.advance(Duration::from_secs(20));
        busy.session.touch();
        f.clock.advance(Duration::from_secs(20));

        assert_eq!(f.store.cleanup_expired(), vec![quiet.session.token]);
        assert!(f.store.lookup(&busy.session.token).is_ok());
    }

    #[test]
    fn test_rotate_keys_stages_rotation() {
        let f = fixture(SessionPolicy::default());
        let new = login(&f, "alice", "wonderland").unwrap();
        let seed = f.store.rotate_keys(&new.session.token).unwrap();

        assert_ne!(seed, new.key_seed);
        assert_eq!(new.session.cipher.rotations(), 1);
        assert!(f.store.rotate_keys(&SessionToken::generate()).is_err());
    }

    #[test]
    fn test_client_and_server_session_keys_agree() {
        let f = fixture(SessionPolicy::default());
        let client = ClientHandshake::start(ProtocolVersion::current());
        let (hello, server_outcome) = f.server.respond(client.hello()).unwrap();
        let trusted = TrustedServers::new([f.server.public_key()]);
        let client_outcome = client.finish(&hello, &trusted, None).unwrap();

        let new = f
            .store
            .create(
                "alice",
                &proof("alice", "wonderland", &client_outcome),
                &server_outcome,
            )
            .unwrap();

        let keys = client_outcome.session_keys(&new.key_seed).unwrap();
        let client_cipher =
            SessionCipher::for_client(&keys, f.clock.clone(), CipherConfig::default());
        let codec = burrow_core::FrameCodec::new(2048);
        let frame = codec.encode(b"ping", &client_cipher).unwrap();
        assert_eq!(&codec.decode(&frame, &new.session.cipher).unwrap()[..], b"ping");
    }

    #[test]
    fn test_aggregate_stats() {
        let f = fixture(SessionPolicy::default());
        let a = login(&f, "alice", "wonderland").unwrap();
        let b = login(&f, "bob", "builder").unwrap();
        a.session.stats.record_sent(100);
        b.session.stats.record_received(50);

        let total = f.store.aggregate_stats();
        assert_eq!(total.bytes_sent, 100);
        assert_eq!(total.bytes_received, 50);
        assert_eq!(total.packets_sent + total.packets_received, 2);
        assert_eq!(f.store.expire_all(), 2);
    }
}
