// ============================================
// File: crates/burrow-server/src/handlers/worker.rs
// ============================================
//! # Session Worker
//!
//! ## Creation Reason
//! One task per authenticated session moves packets between the client's
//! transport and the shared virtual adapter, runs its own keepalive
//! toward the client and rotates keys on schedule.
//!
//! ## Packet Processing
//!
//! ### Client → Adapter
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  1. Reader task receives a frame from the transport         │
//! │  2. Decode with the session cipher (replay + AEAD)          │
//! │  3. Parse the tunnel record                                 │
//! │       Packet  → source must be the session address          │
//! │                 → write to adapter                          │
//! │       Ping    → reply Pong                                  │
//! │       Rekey   → client asks for a rotation                  │
//! │       Disconnect → end the session                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Adapter → Client
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  1. Adapter reader routes the packet into this inbox        │
//! │  2. Encode as a Packet record with the session cipher       │
//! │  3. Send on the transport                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Timers
//! ```text
//! keepalive tick ──► ping outstanding? ──yes──► missed += 1
//!                          │                      │
//!                          ▼                      ▼
//!                      send Ping           missed == limit ──► KeepaliveLost
//! rotation tick  ──► Rekey under old key, commit new send key
//! ```
//! Authenticated traffic in the second half of the lease renews it.
//!
//! ## ⚠️ Important Note for Next Developer
//! - A `Rekey` is sealed under the old send key; the staged key is
//!   committed right after, before anything else is sealed
//! - Per-packet errors never end the worker; they bump counters
//! - Every exit path expires the session, so the address and route are
//!   always released
//!
//! ## Last Modified
//! v0.1.0 - Initial session worker

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use burrow_core::lifecycle::KeepaliveLedger;
use burrow_core::protocol::Rekey;
use burrow_core::{ControlMessage, CoreError, FrameCodec, ReasonCode, TunnelRecord};
use burrow_transport::{Transport, VirtualAdapter};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::services::routing::ipv4_source;
use crate::services::session_store::{Session, SessionStore};

/// Frames buffered between the transport reader and the worker.
const FRAME_QUEUE: usize = 256;

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Client sent `Disconnect`.
    ClientDisconnect,
    /// Transport closed or failed.
    TransportLost,
    /// The client stopped answering pings.
    KeepaliveLost,
    /// Session was expired elsewhere (cleanup or lease).
    SessionClosed,
    /// Server is shutting down.
    Shutdown,
    /// Unrecoverable error.
    Failed(String),
}

/// Timer settings shared by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSchedule {
    /// Periodic key rotation.
    pub rotation: Duration,
    /// Time between pings to the client.
    pub keepalive: Duration,
    /// Unanswered pings after which the session is torn down.
    pub keepalive_misses: u32,
}

impl WorkerSchedule {
    /// Reads the schedule from a server configuration.
    #[must_use]
    pub const fn from_config(config: &ServerConfig) -> Self {
        Self {
            rotation: config.crypto.key_rotation(),
            keepalive: config.limits.keepalive_interval(),
            keepalive_misses: config.limits.keepalive_misses,
        }
    }
}

impl Default for WorkerSchedule {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Per-session forwarding loop.
pub struct SessionWorker {
    session: Arc<Session>,
    store: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    adapter: Arc<dyn VirtualAdapter>,
    codec: FrameCodec,
    schedule: WorkerSchedule,
    ledger: KeepaliveLedger,
    oversize_logged: bool,
}

impl SessionWorker {
    /// Creates a worker for `session` speaking over `transport`.
    pub fn new(
        session: Arc<Session>,
        store: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        adapter: Arc<dyn VirtualAdapter>,
        schedule: WorkerSchedule,
    ) -> Self {
        let codec = FrameCodec::for_mtu(adapter.mtu());
        Self {
            session,
            store,
            transport,
            adapter,
            codec,
            schedule,
            ledger: KeepaliveLedger::new(),
            oversize_logged: false,
        }
    }

    /// Runs until the session ends, then expires it.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Bytes>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> WorkerExit {
        let token = self.session.token;
        let (frame_tx, mut frames) = mpsc::channel(FRAME_QUEUE);
        let reader = tokio::spawn(read_frames(Arc::clone(&self.transport), frame_tx));

        let now = tokio::time::Instant::now();
        let mut rotation = tokio::time::interval_at(now + self.schedule.rotation, self.schedule.rotation);
        rotation.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut keepalive =
            tokio::time::interval_at(now + self.schedule.keepalive, self.schedule.keepalive);
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let session = Arc::clone(&self.session);
        let exit = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    self.send_control(&ControlMessage::disconnect(ReasonCode::Maintenance)).await;
                    break WorkerExit::Shutdown;
                }
                () = session.closed() => break WorkerExit::SessionClosed,
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        break WorkerExit::TransportLost;
                    };
                    if let Some(exit) = self.handle_frame(&frame).await {
                        break exit;
                    }
                }
                packet = inbox.recv() => {
                    let Some(packet) = packet else {
                        break WorkerExit::SessionClosed;
                    };
                    if let Err(e) = self.forward_to_client(&packet).await {
                        break exit_for(&e);
                    }
                }
                _ = rotation.tick() => {
                    if let Err(e) = self.rotate().await {
                        break exit_for(&e);
                    }
                }
                _ = keepalive.tick() => {
                    if let Some(exit) = self.keepalive_tick().await {
                        break exit;
                    }
                }
            }
        };

        reader.abort();
        let _ = self.transport.close().await;
        self.store.expire(&token);

        let stats = self.session.stats.snapshot();
        info!(
            session = %token,
            exit = ?exit,
            packets_sent = stats.packets_sent,
            packets_received = stats.packets_received,
            "Session worker stopped"
        );
        exit
    }

    /// Handles one frame from the client. Returns an exit reason to stop.
    async fn handle_frame(&mut self, frame: &[u8]) -> Option<WorkerExit> {
        let session = Arc::clone(&self.session);
        let stats = &session.stats;
        let plaintext = match self.codec.decode(frame, &session.cipher) {
            Ok(plaintext) => plaintext,
            Err(e) => return self.on_decode_error(&e),
        };
        session.touch();
        stats.record_received(frame.len());
        self.renew_if_due();

        match TunnelRecord::decode(plaintext) {
            Ok(TunnelRecord::Packet(packet)) => {
                if ipv4_source(&packet) != Some(session.virtual_address.inner()) {
                    trace!(session = %session.token, "Dropping packet with foreign source");
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                if let Err(e) = self.adapter.write_packet(&packet).await {
                    debug!(session = %session.token, error = %e, "Adapter write failed");
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
            Ok(TunnelRecord::Control(message)) => self.handle_control(message).await,
            Err(e) => {
                debug!(session = %session.token, error = %e, "Malformed tunnel record");
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn handle_control(&mut self, message: ControlMessage) -> Option<WorkerExit> {
        match message {
            ControlMessage::Ping => {
                trace!(session = %self.session.token, "Ping");
                self.send_control(&ControlMessage::Pong).await;
                None
            }
            ControlMessage::Pong => {
                self.ledger.on_pong(self.store.clock().now());
                None
            }
            ControlMessage::Rekey(_) => {
                debug!(session = %self.session.token, "Client requested key rotation");
                self.rotate().await.err().map(|e| exit_for(&e))
            }
            ControlMessage::Disconnect(d) => {
                debug!(session = %self.session.token, reason = ?d.reason, "Client disconnected");
                Some(WorkerExit::ClientDisconnect)
            }
            other => {
                debug!(
                    session = %self.session.token,
                    message = other.name(),
                    "Unexpected control message in tunnel"
                );
                self.session.stats.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Pings the client, or gives up once enough pings went unanswered.
    async fn keepalive_tick(&mut self) -> Option<WorkerExit> {
        self.ledger.on_tick(self.store.clock().now());
        let missed = self.ledger.missed_count;
        if missed >= self.schedule.keepalive_misses {
            warn!(session = %self.session.token, missed, "Client stopped answering keepalives");
            return Some(WorkerExit::KeepaliveLost);
        }
        if missed > 0 {
            debug!(session = %self.session.token, missed, "Keepalive unanswered");
        }
        self.send_control(&ControlMessage::Ping).await;
        None
    }

    /// Extends the lease once less than half of it is left.
    fn renew_if_due(&self) {
        let now = self.store.clock().now();
        let remaining = self.session.expires_at().saturating_duration_since(now);
        if remaining >= self.store.policy().lease / 2 {
            return;
        }
        if let Err(e) = self.store.renew(&self.session.token) {
            debug!(session = %self.session.token, error = %e, "Lease renewal failed");
        }
    }

    fn on_decode_error(&mut self, err: &CoreError) -> Option<WorkerExit> {
        let stats = &self.session.stats;
        match err {
            CoreError::ReplayDetected { .. } => {
                stats.replays_blocked.fetch_add(1, Ordering::Relaxed);
            }
            CoreError::AuthenticationFailed => {
                stats.auth_failures.fetch_add(1, Ordering::Relaxed);
            }
            CoreError::OversizedFrame { .. } => {
                if !self.oversize_logged {
                    self.oversize_logged = true;
                    warn!(session = %self.session.token, error = %err, "Oversized frame from client");
                }
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            CoreError::SessionExpired => return Some(WorkerExit::SessionClosed),
            e if e.is_per_packet() => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            e => return Some(WorkerExit::Failed(e.to_string())),
        }
        trace!(session = %self.session.token, error = %err, "Frame dropped");
        None
    }

    async fn forward_to_client(&self, packet: &[u8]) -> Result<()> {
        let record = TunnelRecord::encode_packet(packet);
        let frame = match self.codec.encode(&record, &self.session.cipher) {
            Ok(frame) => frame,
            Err(e) if e.is_per_packet() => {
                self.session.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.transport.send(&frame).await?;
        self.session.stats.record_sent(frame.len());

        if self.session.cipher.needs_rotation() {
            self.rotate().await?;
        }
        Ok(())
    }

    /// Rotates the session keys and announces the new seed.
    async fn rotate(&self) -> Result<()> {
        let seed = self.store.rotate_keys(&self.session.token)?;
        let rekey = ControlMessage::Rekey(Rekey { new_key_seed: seed });
        let frame = self
            .codec
            .encode(&TunnelRecord::Control(rekey).encode(), &self.session.cipher);
        // The frame is sealed; nothing may be sealed under the old key after it.
        self.session.cipher.commit_staged_send();
        self.transport.send(&frame?).await?;
        info!(
            session = %self.session.token,
            rotations = self.session.cipher.rotations(),
            "Session keys rotated"
        );
        Ok(())
    }

    async fn send_control(&self, message: &ControlMessage) {
        let record = TunnelRecord::Control(message.clone()).encode();
        match self.codec.encode(&record, &self.session.cipher) {
            Ok(frame) => {
                if let Err(e) = self.transport.send(&frame).await {
                    debug!(session = %self.session.token, error = %e, "Control send failed");
                } else {
                    self.session.stats.record_sent(frame.len());
                }
            }
            Err(e) => debug!(session = %self.session.token, error = %e, "Control seal failed"),
        }
    }
}

impl std::fmt::Debug for SessionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWorker")
            .field("session", &self.session.token)
            .field("peer", &self.transport.peer_addr())
            .finish_non_exhaustive()
    }
}

fn exit_for(err: &ServerError) -> WorkerExit {
    match err {
        ServerError::Transport(_) => WorkerExit::TransportLost,
        ServerError::SessionNotFound(_) | ServerError::Core(CoreError::SessionExpired) => {
            WorkerExit::SessionClosed
        }
        other => WorkerExit::Failed(other.to_string()),
    }
}

async fn read_frames(transport: Arc<dyn Transport>, frames: mpsc::Sender<Bytes>) {
    loop {
        match transport.recv().await {
            Ok(frame) => {
                if frames.send(frame).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(peer = %transport.peer_addr(), error = %e, "Transport receive ended");
                return;
            }
        }
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
        CipherConfig, ClientHandshake, CredentialProof, CredentialVerifier, IdentityKeyPair,
        ProtocolVersion, ServerHandshake, SessionCipher, TrustedServers,
    };
    use burrow_transport::{MemoryTransport, MockAdapter};

    use super::*;
    use crate::services::credentials::FileCredentialStore;
    use crate::services::ip_pool::IpPool;
    use crate::services::routing::{Dispatch, RoutingTable};
    use crate::services::session_store::SessionPolicy;

    /// A worker running against an in-memory client.
    struct Running {
        handle: tokio::task::JoinHandle<WorkerExit>,
        clock: Arc<ManualClock>,
        client: MemoryTransport,
        cipher: SessionCipher,
        codec: FrameCodec,
        session: Arc<Session>,
        store: Arc<SessionStore>,
        routing: Arc<RoutingTable>,
        pool: Arc<IpPool>,
        adapter: Arc<MockAdapter>,
        shutdown: broadcast::Sender<()>,
    }

    impl Running {
        async fn send_record(&self, record: &TunnelRecord) {
            let frame = self.codec.encode(&record.encode(), &self.cipher).unwrap();
            self.client.send(&frame).await.unwrap();
        }

        async fn recv_record(&self) -> TunnelRecord {
            let frame = self.client.recv().await.unwrap();
            TunnelRecord::decode(self.codec.decode(&frame, &self.cipher).unwrap()).unwrap()
        }

        fn packet_from_client(&self) -> Vec<u8> {
            ipv4(self.session.virtual_address.inner(), Ipv4Addr::new(1, 1, 1, 1))
        }
    }

    fn ipv4(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
        let mut p = vec![0u8; 24];
        p[0] = 0x45;
        p[12..16].copy_from_slice(&src.octets());
        p[16..20].copy_from_slice(&dst.octets());
        p
    }

    fn start() -> Running {
        start_with(SessionPolicy::default())
    }

    fn start_with(policy: SessionPolicy) -> Running {
        let clock = Arc::new(ManualClock::new());
        let credentials = FileCredentialStore::new();
        credentials.insert("alice", CredentialVerifier::derive("alice", "pw"));
        let routing = Arc::new(RoutingTable::new());
        let pool = Arc::new(
            IpPool::new(Ipv4Addr::new(10, 8, 0, 0), 24, Ipv4Addr::new(10, 8, 0, 1)).unwrap(),
        );
        let store = Arc::new(SessionStore::new(
            policy,
            Arc::clone(&pool),
            Arc::clone(&routing),
            Arc::new(credentials),
            clock.clone(),
        ));

        let server = ServerHandshake::new(Arc::new(IdentityKeyPair::generate()));
        let hs = ClientHandshake::start(ProtocolVersion::current());
        let (hello, server_outcome) = server.respond(hs.hello()).unwrap();
        let client_outcome = hs
            .finish(&hello, &TrustedServers::new([server.public_key()]), None)
            .unwrap();
        let proof = CredentialProof::compute(
            &CredentialVerifier::derive("alice", "pw"),
            "alice",
            client_outcome.transcript_hash(),
        )
        .unwrap();
        let new = store.create("alice", &proof, &server_outcome).unwrap();
        let keys = client_outcome.session_keys(&new.key_seed).unwrap();
        let cipher = SessionCipher::for_client(&keys, clock.clone(), CipherConfig::default());

        let (client, server_side) = MemoryTransport::pair();
        let adapter = Arc::new(MockAdapter::default());
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let session = Arc::clone(&new.session);
        let worker = SessionWorker::new(
            Arc::clone(&session),
            Arc::clone(&store),
            Arc::new(server_side),
            adapter.clone(),
            WorkerSchedule::default(),
        );
        let handle = tokio::spawn(worker.run(new.inbox, shutdown_rx));

        Running {
            handle,
            clock,
            client,
            cipher,
            codec: FrameCodec::for_mtu(1420),
            session,
            store,
            routing,
            pool,
            adapter,
            shutdown,
        }
    }

    #[tokio::test]
    async fn test_client_packet_reaches_adapter() {
        let r = start();
        let packet = r.packet_from_client();
        r.send_record(&TunnelRecord::Packet(Bytes::from(packet.clone()))).await;

        assert_eq!(&r.adapter.next_written().await[..], &packet[..]);
        assert_eq!(r.session.stats.snapshot().packets_received, 1);

        r.client.close().await.unwrap();
        assert_eq!(r.handle.await.unwrap(), WorkerExit::TransportLost);
        assert_eq!(r.store.count(), 0);
    }

    #[tokio::test]
    async fn test_spoofed_source_dropped_and_ping_answered() {
        let r = start();
        let spoofed = ipv4(Ipv4Addr::new(10, 8, 0, 77), Ipv4Addr::new(1, 1, 1, 1));
        r.send_record(&TunnelRecord::Packet(Bytes::from(spoofed))).await;
        r.send_record(&TunnelRecord::Control(ControlMessage::Ping)).await;

        assert_eq!(r.recv_record().await, TunnelRecord::Control(ControlMessage::Pong));
        assert_eq!(r.adapter.written_count(), 0);
        assert_eq!(r.session.stats.snapshot().dropped, 1);
    }

    #[tokio::test]
    async fn test_routed_packet_reaches_client() {
        let r = start();
        let inbound = ipv4(Ipv4Addr::new(8, 8, 8, 8), r.session.virtual_address.inner());
        assert_eq!(r.routing.dispatch(Bytes::from(inbound.clone())), Dispatch::Delivered);

        assert_eq!(r.recv_record().await, TunnelRecord::Packet(Bytes::from(inbound)));
        assert_eq!(r.session.stats.snapshot().packets_sent, 1);
    }

    #[tokio::test]
    async fn test_tampered_and_replayed_frames_counted() {
        let r = start();
        let record = TunnelRecord::encode_packet(&r.packet_from_client());
        let frame = r.codec.encode(&record, &r.cipher).unwrap();

        let mut tampered = frame.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        r.client.send(&tampered).await.unwrap();
        r.client.send(&frame).await.unwrap();
        r.client.send(&frame).await.unwrap();

        r.send_record(&TunnelRecord::Control(ControlMessage::Ping)).await;
        r.recv_record().await;

        let stats = r.session.stats.snapshot();
        assert_eq!(stats.auth_failures, 1);
        assert_eq!(stats.replays_blocked, 1);
        assert_eq!(stats.packets_received, 2);
        assert_eq!(r.adapter.written_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_expires_session() {
        let r = start();
        r.send_record(&TunnelRecord::Control(ControlMessage::disconnect(
            ReasonCode::UserRequested,
        )))
        .await;

        assert_eq!(r.handle.await.unwrap(), WorkerExit::ClientDisconnect);
        assert_eq!(r.store.count(), 0);
        assert!(r.session.cipher.is_invalidated());
        assert!(r.routing.is_empty());
    }

    #[tokio::test]
    async fn test_client_rekey_request_rotates() {
        let r = start();
        r.send_record(&TunnelRecord::Control(ControlMessage::Rekey(Rekey {
            new_key_seed: [0; 32],
        })))
        .await;

        let TunnelRecord::Control(ControlMessage::Rekey(rekey)) = r.recv_record().await else {
            panic!("expected Rekey");
        };
        r.cipher.rotate_with_seed(&rekey.new_key_seed).unwrap();
        assert_eq!(r.session.cipher.rotations(), 1);

        // Both ends now speak the new epoch.
        r.send_record(&TunnelRecord::Control(ControlMessage::Ping)).await;
        assert_eq!(r.recv_record().await, TunnelRecord::Control(ControlMessage::Pong));
    }

    #[tokio::test]
    async fn test_shutdown_sends_disconnect() {
        let r = start();
        r.shutdown.send(()).unwrap();
        let record = r.recv_record().await;
        assert_eq!(
            record,
            TunnelRecord::Control(ControlMessage::disconnect(ReasonCode::Maintenance))
        );
        assert_eq!(r.handle.await.unwrap(), WorkerExit::Shutdown);
        assert_eq!(r.store.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_dropped_after_missed_keepalives() {
        let started = tokio::time::Instant::now();
        let r = start();
        assert_eq!(r.recv_record().await, TunnelRecord::Control(ControlMessage::Ping));

        assert_eq!(r.handle.await.unwrap(), WorkerExit::KeepaliveLost);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(60), "gave up after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(75), "gave up after {elapsed:?}");
        assert_eq!(r.store.count(), 0);
        assert!(r.routing.is_empty());
        assert!(!r.pool.is_allocated(r.session.virtual_address));
        assert!(r.session.cipher.is_invalidated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_keepalives_keep_session() {
        let r = start();
        for _ in 0..6 {
            assert_eq!(r.recv_record().await, TunnelRecord::Control(ControlMessage::Ping));
            r.send_record(&TunnelRecord::Control(ControlMessage::Pong)).await;
        }
        assert!(!r.handle.is_finished());
        assert_eq!(r.store.count(), 1);
    }

    #[tokio::test]
    async fn test_traffic_renews_lease() {
        let r = start_with(SessionPolicy {
            lease: Duration::from_secs(10),
            ..SessionPolicy::default()
        });
        let first_expiry = r.session.expires_at();

        r.clock.advance(Duration::from_secs(6));
        r.send_record(&TunnelRecord::Packet(Bytes::from(r.packet_from_client()))).await;
        r.adapter.next_written().await;
        assert!(r.session.expires_at() > first_expiry);

        r.clock.advance(Duration::from_secs(6));
        let packet = r.packet_from_client();
        r.send_record(&TunnelRecord::Packet(Bytes::from(packet.clone()))).await;
        assert_eq!(&r.adapter.next_written().await[..], &packet[..]);
        assert!(r.store.lookup(&r.session.token).is_ok());
        assert!(!r.handle.is_finished());
    }

    #[tokio::test]
    async fn test_cleanup_stops_worker() {
        let r = start();
        r.store.expire(&r.session.token);
        assert_eq!(r.handle.await.unwrap(), WorkerExit::SessionClosed);
    }
}
