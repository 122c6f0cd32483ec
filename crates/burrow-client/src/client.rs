// ============================================
// File: crates/burrow-client/src/client.rs
// ============================================
//! # Connection Driver
//!
//! ## Creation Reason
//! Executes the actions of the reconnect state machine: dial,
//! authenticate, pump packets, ping, back off, close. The machine itself
//! (`burrow_core::lifecycle::transition`) is pure; every side effect
//! lives here.
//!
//! ## Main Functionality
//! ```text
//!              ┌──────────── Action::Dial ◄───────────────┐
//!              ▼                                          │
//!   Connecting ──► Authenticating ──► Tunneling ◄──► Degraded
//!       │               │                 │              │
//!       └───────────────┴──── failure ────┴──────────────┘
//!                               ▼
//!                         Reconnecting ── backoff + jitter ──► (Dial)
//!
//!   credentials / certificate rejected ──► Closed (run() returns)
//! ```
//!
//! ## Tasks
//! - Adapter reader: lives as long as `run()`, feeds outbound packets
//! - Frame reader: one per connection, feeds inbound frames; aborted on
//!   teardown because transport receives are not cancel-safe
//! - The driver loop itself: owns the buffer, pump and monitor
//!
//! ## ⚠️ Important Note for Next Developer
//! - Outbound packets read while the tunnel is down go to the
//!   `OutboundBuffer` and are flushed on `EnterTunnel`
//! - Every phase also watches `close()`; a close in `Tunneling` sends
//!   `Disconnect{UserRequested}` first
//! - The cipher of a torn-down connection is invalidated before the
//!   transport is closed
//!
//! ## Last Modified
//! v0.1.0 - Initial connection driver

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use burrow_common::time::{SharedClock, SystemClock};
use burrow_common::{SessionToken, VirtualIp};
use burrow_core::lifecycle::{CloseReason, MonitorVerdict};
use burrow_core::protocol::Rekey;
use burrow_core::{
    transition, Action, AuthFailureMonitor, ConnectionState, ControlMessage, Event,
    IdentityPublicKey, LifecycleConfig, MachineState, ReasonCode, SessionCipher,
};
use burrow_transport::{Connector, Transport, VirtualAdapter};

use crate::buffer::OutboundBuffer;
use crate::config::ClientConfig;
use crate::control::{ControlClient, Credentials, SessionDescriptor};
use crate::error::{ClientError, Result};
use crate::pump::{Inbound, Pump};
use crate::stats::{ClientStats, Statistics};

/// Packets queued between the adapter reader and the driver.
const OUTBOUND_QUEUE: usize = 256;

/// Frames queued between the transport reader and the driver.
const INBOUND_QUEUE: usize = 256;

type FailureHook = Arc<dyn Fn(u32) + Send + Sync>;

// ============================================
// SessionInfo
// ============================================

/// Public view of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Opaque session handle.
    pub token: SessionToken,
    /// Address assigned inside the tunnel.
    pub virtual_address: VirtualIp,
    /// Lease granted by the server.
    pub lease: Duration,
    /// Verified server identity.
    pub server_identity: IdentityPublicKey,
}

impl From<&SessionDescriptor> for SessionInfo {
    fn from(session: &SessionDescriptor) -> Self {
        Self {
            token: session.token,
            virtual_address: session.virtual_address,
            lease: session.lease,
            server_identity: session.server_identity,
        }
    }
}

// ============================================
// Client
// ============================================

/// Tunnel client.
///
/// # Example
/// ```ignore
/// let client = Arc::new(Client::new(&config, connector, adapter));
/// let runner = tokio::spawn({
///     let client = Arc::clone(&client);
///     async move { client.run().await }
/// });
/// // ...
/// client.close();
/// runner.await??;
/// ```
pub struct Client {
    server_address: String,
    connect_timeout: Duration,
    lifecycle: LifecycleConfig,
    control: ControlClient,
    connector: Arc<dyn Connector>,
    adapter: Arc<dyn VirtualAdapter>,
    clock: SharedClock,
    stats: Arc<ClientStats>,
    monitor_template: AuthFailureMonitor,
    buffer_capacity: usize,
    buffer_window: Duration,
    machine: Mutex<MachineState>,
    state_tx: watch::Sender<ConnectionState>,
    session: Mutex<Option<SessionInfo>>,
    close_flag: AtomicBool,
    close_notify: Notify,
    failure_hook: Mutex<Option<FailureHook>>,
}

impl Client {
    /// Creates a client. `config` is assumed validated.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        adapter: Arc<dyn VirtualAdapter>,
    ) -> Self {
        let clock = SystemClock::shared();
        let credentials = Credentials::new(
            config.credentials.identity.clone(),
            &config.credentials.secret,
        );
        let control = ControlClient::new(
            config.trusted_servers(),
            credentials,
            config.timeouts.auth(),
            Arc::clone(&clock),
        );
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            server_address: config.server.address.clone(),
            connect_timeout: config.timeouts.connect(),
            lifecycle: config.lifecycle_config(),
            control,
            connector,
            adapter,
            clock,
            stats: Arc::new(ClientStats::default()),
            monitor_template: config.auth_failure_monitor(),
            buffer_capacity: config.reconnect.buffer_packets,
            buffer_window: config.reconnect.buffer_window(),
            machine: Mutex::new(MachineState::new()),
            state_tx,
            session: Mutex::new(None),
            close_flag: AtomicBool::new(false),
            close_notify: Notify::new(),
            failure_hook: Mutex::new(None),
        }
    }

    // ========================================
    // Public API
    // ========================================

    /// Connects and keeps the tunnel up until closed.
    ///
    /// Calling `run` again after it returned reconnects from scratch.
    ///
    /// # Errors
    /// `Closed` with a fatal reason if the credentials or the server
    /// certificate were rejected. A user close returns `Ok`.
    pub async fn run(&self) -> Result<()> {
        let start = if self.current_state() == ConnectionState::Closed {
            self.close_flag.store(false, Ordering::Release);
            Event::UserConnect
        } else {
            Event::Start
        };

        info!(
            version = env!("CARGO_PKG_VERSION"),
            server = %self.server_address,
            adapter = self.adapter.name(),
            "Starting Burrow client"
        );

        let (packet_tx, packets) = mpsc::channel(OUTBOUND_QUEUE);
        let adapter_reader = tokio::spawn(read_adapter(Arc::clone(&self.adapter), packet_tx));

        let mut driver = Driver {
            client: self,
            packets,
            buffer: OutboundBuffer::new(self.buffer_capacity, self.buffer_window),
            pump: Pump::new(Arc::clone(&self.adapter), Arc::clone(&self.stats)),
            monitor: self.monitor_template.clone(),
            conn: None,
        };
        let result = driver.drive(start).await;

        adapter_reader.abort();
        result
    }

    /// Asks the running client to disconnect and stop.
    pub fn close(&self) {
        self.close_flag.store(true, Ordering::Release);
        self.close_notify.notify_waiters();
    }

    /// Current connection phase.
    #[must_use]
    pub fn current_state(&self) -> ConnectionState {
        self.machine.lock().phase
    }

    /// Whether packets currently flow through the tunnel.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.current_state().is_tunnel_up()
    }

    /// Full state machine snapshot, including the keepalive ledger.
    #[must_use]
    pub fn machine_state(&self) -> MachineState {
        *self.machine.lock()
    }

    /// Watches phase changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Traffic counters and session age.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.stats.snapshot(self.clock.now())
    }

    /// Current session, if the tunnel is up.
    #[must_use]
    pub fn session(&self) -> Option<SessionInfo> {
        self.session.lock().clone()
    }

    /// Registers a callback invoked with the cycle count whenever the
    /// reconnect budget is exceeded.
    pub fn on_persistent_failure(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
        *self.failure_hook.lock() = Some(Arc::new(hook));
    }

    // ========================================
    // Internals
    // ========================================

    fn apply(&self, event: Event) -> Action {
        let mut machine = self.machine.lock();
        let before = machine.phase;
        let (next, action) = transition(*machine, event, &self.lifecycle);
        *machine = next;
        drop(machine);

        if next.phase != before {
            debug!(from = %before, to = %next.phase, event = ?event, "State change");
            self.state_tx.send_replace(next.phase);
        }
        action
    }

    async fn close_requested(&self) {
        let notified = self.close_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.close_flag.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    fn report_persistent_failure(&self) {
        let cycles = self.machine.lock().consecutive_cycles;
        error!(
            cycles,
            server = %self.server_address,
            "Server unreachable after repeated reconnect attempts"
        );
        let hook = self.failure_hook.lock().clone();
        if let Some(hook) = hook {
            hook(cycles);
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server", &self.server_address)
            .field("state", &self.current_state())
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

// ============================================
// Driver
// ============================================

/// One live transport and, once authenticated, its session.
struct Connection {
    transport: Arc<dyn Transport>,
    session: Option<SessionDescriptor>,
    reader: Option<JoinHandle<()>>,
}

/// What woke the driver up.
enum Wake<T> {
    Done(T),
    Close,
    Outbound(Bytes),
}

/// State owned by one `run()` call.
struct Driver<'a> {
    client: &'a Client,
    packets: mpsc::Receiver<Bytes>,
    buffer: OutboundBuffer,
    pump: Pump,
    monitor: AuthFailureMonitor,
    conn: Option<Connection>,
}

impl Driver<'_> {
    async fn drive(&mut self, start: Event) -> Result<()> {
        let client = self.client;
        let mut action = client.apply(start);

        loop {
            action = match action {
                Action::Dial => self.dial().await,
                Action::Authenticate => self.authenticate().await,
                Action::EnterTunnel => self.tunnel().await,
                Action::ScheduleReconnect {
                    delay,
                    teardown,
                    persistent_failure,
                } => self.backoff(delay, teardown, persistent_failure).await,
                Action::Shutdown { reason } => {
                    self.teardown().await;
                    return match reason {
                        CloseReason::UserRequested => {
                            info!("Client closed");
                            Ok(())
                        }
                        reason => {
                            error!(reason = %reason, "Client stopped");
                            Err(ClientError::Closed { reason })
                        }
                    };
                }
                Action::SendPing | Action::None => {
                    warn!(state = %client.current_state(), "Driver stalled; closing");
                    client.apply(Event::UserClose)
                }
            };
        }
    }

    // ========================================
    // Phases
    // ========================================

    async fn dial(&mut self) -> Action {
        let client = self.client;
        debug!(server = %client.server_address, "Dialing");
        let attempt = tokio::time::timeout(
            client.connect_timeout,
            client.connector.dial(&client.server_address),
        );

        let Some(result) = self.guarded(attempt).await else {
            return client.apply(Event::UserClose);
        };
        let event = match result {
            Ok(Ok(transport)) => {
                self.conn = Some(Connection {
                    transport: Arc::from(transport),
                    session: None,
                    reader: None,
                });
                Event::TransportEstablished
            }
            Ok(Err(e)) => {
                warn!(server = %client.server_address, error = %e, "Dial failed");
                Event::TransportFailed
            }
            Err(_) => {
                warn!(server = %client.server_address, "Dial timed out");
                Event::TransportFailed
            }
        };
        client.apply(event)
    }

    async fn authenticate(&mut self) -> Action {
        let client = self.client;
        let Some(transport) = self.conn.as_ref().map(|c| Arc::clone(&c.transport)) else {
            return client.apply(Event::TransportFailed);
        };

        let Some(result) = self.guarded(client.control.establish(transport.as_ref())).await else {
            return client.apply(Event::UserClose);
        };
        match result {
            Ok(session) => {
                info!(
                    session = %session.token,
                    virtual_ip = %session.virtual_address,
                    server = %session.server_identity,
                    lease_secs = session.lease.as_secs(),
                    "Session established"
                );
                *client.session.lock() = Some(SessionInfo::from(&session));
                if let Some(conn) = self.conn.as_mut() {
                    conn.session = Some(session);
                }
                client.apply(Event::AuthSucceeded)
            }
            Err(e) => {
                if e.is_fatal() {
                    error!(error = %e, "Authentication failed");
                } else {
                    warn!(error = %e, "Authentication attempt failed");
                }
                client.apply(e.lifecycle_event())
            }
        }
    }

    async fn tunnel(&mut self) -> Action {
        let client = self.client;
        let Some((transport, cipher)) = self.conn.as_ref().and_then(|c| {
            c.session
                .as_ref()
                .map(|s| (Arc::clone(&c.transport), Arc::clone(&s.cipher)))
        }) else {
            return client.apply(Event::TransportFailed);
        };

        let (frame_tx, mut frames) = mpsc::channel(INBOUND_QUEUE);
        let reader = tokio::spawn(read_frames(Arc::clone(&transport), frame_tx));
        if let Some(conn) = self.conn.as_mut() {
            conn.reader = Some(reader);
        }

        client.stats.session_started(client.clock.now());
        self.monitor.reset();
        self.pump.reset();
        let mut rekey_requested = false;

        let (fresh, stale) = self.buffer.drain(client.clock.now());
        if stale > 0 {
            client.stats.record_dropped(stale);
            debug!(stale, "Discarded stale buffered packets");
        }
        if !fresh.is_empty() {
            debug!(count = fresh.len(), "Flushing buffered packets");
        }
        for packet in fresh {
            if let Err(e) = self.pump.send_packet(transport.as_ref(), &cipher, &packet).await {
                warn!(error = %e, "Flush failed");
                return client.apply(e.lifecycle_event());
            }
        }

        let interval = client.lifecycle.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                () = client.close_requested() => TunnelWake::Close,
                frame = frames.recv() => TunnelWake::Frame(frame),
                Some(packet) = self.packets.recv() => TunnelWake::Outbound(packet),
                _ = keepalive.tick() => TunnelWake::Tick,
            };

            let action = match wake {
                TunnelWake::Close => {
                    let bye = ControlMessage::disconnect(ReasonCode::UserRequested);
                    let _ = self.pump.send_control(transport.as_ref(), &cipher, &bye).await;
                    client.apply(Event::UserClose)
                }
                TunnelWake::Frame(None) => {
                    warn!("Connection lost");
                    client.apply(Event::TransportFailed)
                }
                TunnelWake::Frame(Some(frame)) => {
                    self.on_frame(&frame, transport.as_ref(), &cipher, &mut rekey_requested)
                        .await
                }
                TunnelWake::Outbound(packet) => {
                    match self.pump.send_packet(transport.as_ref(), &cipher, &packet).await {
                        Ok(()) if cipher.needs_rotation() && !rekey_requested => {
                            rekey_requested = true;
                            self.request_rekey(transport.as_ref(), &cipher).await
                        }
                        Ok(()) => Action::None,
                        Err(e) => {
                            warn!(error = %e, "Send failed");
                            client.apply(e.lifecycle_event())
                        }
                    }
                }
                TunnelWake::Tick => {
                    match client.apply(Event::KeepaliveTick {
                        now: client.clock.now(),
                    }) {
                        Action::SendPing => {
                            let ping = ControlMessage::Ping;
                            match self.pump.send_control(transport.as_ref(), &cipher, &ping).await {
                                Ok(()) => Action::None,
                                Err(e) => {
                                    warn!(error = %e, "Keepalive send failed");
                                    client.apply(e.lifecycle_event())
                                }
                            }
                        }
                        other => {
                            if matches!(other, Action::ScheduleReconnect { .. }) {
                                warn!("Keepalive lost; reconnecting");
                            }
                            other
                        }
                    }
                }
            };

            if !matches!(action, Action::None | Action::SendPing) {
                return action;
            }
        }
    }

    async fn backoff(&mut self, delay: Duration, teardown: bool, persistent_failure: bool) -> Action {
        let client = self.client;
        if teardown {
            self.teardown().await;
        }
        client.stats.record_reconnect();
        if persistent_failure {
            client.report_persistent_failure();
        }

        let wait = client.lifecycle.backoff.with_jitter(delay, &mut rand::thread_rng());
        info!(delay_ms = wait.as_millis(), "Reconnecting after backoff");

        match self.guarded(tokio::time::sleep(wait)).await {
            Some(()) => client.apply(Event::BackoffElapsed),
            None => client.apply(Event::UserClose),
        }
    }

    // ========================================
    // Tunnel Helpers
    // ========================================

    async fn on_frame(
        &mut self,
        frame: &[u8],
        transport: &dyn Transport,
        cipher: &SessionCipher,
        rekey_requested: &mut bool,
    ) -> Action {
        let client = self.client;
        match self.pump.receive(frame, cipher).await {
            Inbound::Delivered | Inbound::Dropped => Action::None,
            Inbound::SessionExpired => {
                warn!("Session cipher expired");
                client.apply(Event::SessionExpired)
            }
            Inbound::AuthFailure => match self.monitor.record(client.clock.now()) {
                MonitorVerdict::Quiet => Action::None,
                MonitorVerdict::Alert { failures } => {
                    warn!(failures, "Burst of undecryptable frames");
                    Action::None
                }
                MonitorVerdict::ForceReconnect { failures } => {
                    warn!(failures, "Burst of undecryptable frames; re-authenticating");
                    client.apply(Event::KeyDesync)
                }
            },
            Inbound::Control(message) => match message {
                ControlMessage::Ping => {
                    match self.pump.send_control(transport, cipher, &ControlMessage::Pong).await {
                        Ok(()) => Action::None,
                        Err(e) => client.apply(e.lifecycle_event()),
                    }
                }
                ControlMessage::Pong => client.apply(Event::PongReceived {
                    now: client.clock.now(),
                }),
                ControlMessage::Rekey(rekey) => match cipher.rotate_with_seed(&rekey.new_key_seed) {
                    Ok(()) => {
                        *rekey_requested = false;
                        info!(rotations = cipher.rotations(), "Session keys rotated");
                        Action::None
                    }
                    Err(e) => {
                        warn!(error = %e, "Key rotation failed");
                        client.apply(Event::KeyDesync)
                    }
                },
                ControlMessage::Disconnect(bye) => {
                    info!(reason = %bye.reason, "Server ended the session");
                    client.apply(Event::SessionExpired)
                }
                other => {
                    debug!(message = other.name(), "Unexpected control message ignored");
                    Action::None
                }
            },
        }
    }

    async fn request_rekey(&self, transport: &dyn Transport, cipher: &SessionCipher) -> Action {
        debug!(counter = cipher.send_counter(), "Send counter near limit; requesting rotation");
        let request = ControlMessage::Rekey(Rekey {
            new_key_seed: rand::random(),
        });
        match self.pump.send_control(transport, cipher, &request).await {
            Ok(()) => Action::None,
            Err(e) => self.client.apply(e.lifecycle_event()),
        }
    }

    // ========================================
    // Plumbing
    // ========================================

    /// Runs `fut` while parking outbound packets, or returns `None` if
    /// close was requested first.
    async fn guarded<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        let client = self.client;
        tokio::pin!(fut);
        loop {
            let wake = tokio::select! {
                out = &mut fut => Wake::Done(out),
                () = client.close_requested() => Wake::Close,
                Some(packet) = self.packets.recv() => Wake::Outbound(packet),
            };
            match wake {
                Wake::Done(out) => return Some(out),
                Wake::Close => return None,
                Wake::Outbound(packet) => {
                    let dropped = self.buffer.push(packet, client.clock.now());
                    if dropped > 0 {
                        client.stats.record_dropped(dropped);
                    }
                }
            }
        }
    }

    async fn teardown(&mut self) {
        let client = self.client;
        if let Some(conn) = self.conn.take() {
            if let Some(reader) = conn.reader {
                reader.abort();
            }
            if let Some(session) = &conn.session {
                session.cipher.invalidate();
                debug!(session = %session.token, "Session torn down");
            }
            let _ = conn.transport.close().await;
        }
        *client.session.lock() = None;
        client.stats.session_ended();
    }
}

/// What woke the tunnel loop up.
enum TunnelWake {
    Close,
    Frame(Option<Bytes>),
    Outbound(Bytes),
    Tick,
}

// ============================================
// Reader Tasks
// ============================================

async fn read_adapter(adapter: Arc<dyn VirtualAdapter>, tx: mpsc::Sender<Bytes>) {
    loop {
        match adapter.read_packet().await {
            Ok(packet) => {
                if tx.send(packet).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(adapter = adapter.name(), error = %e, "Adapter read failed; outbound traffic stopped");
                return;
            }
        }
    }
}

async fn read_frames(transport: Arc<dyn Transport>, tx: mpsc::Sender<Bytes>) {
    loop {
        match transport.recv().await {
            Ok(frame) => {
                if tx.send(frame).await.is_err() {
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
