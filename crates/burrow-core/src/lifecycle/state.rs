// ============================================
// File: crates/burrow-core/src/lifecycle/state.rs
// ============================================
//! # Connection State Machine
//!
//! ## Creation Reason
//! Reconnect and keepalive logic as one pure function, so every
//! transition is testable without sockets or timers.
//!
//! ## Transitions
//! ```text
//!                 Start / UserConnect
//!  Disconnected ───────────────────────► Connecting ◄────────────┐
//!                                          │     │               │
//!                       TransportEstablished     TransportFailed │
//!                                          ▼     ▼               │
//!                                Authenticating ──► Reconnecting │
//!                                 │   │   transient   │  BackoffElapsed
//!                    AuthSucceeded│   │AuthRejected   └──────────┘
//!                                 ▼   ▼
//!                         Tunneling   Closed ◄── CertificateRejected
//!                          ▲    │                    UserClose
//!                     Pong │    │ 2 misses
//!                          │    ▼
//!                         Degraded ──3 misses──► Reconnecting
//! ```
//!
//! `TransportFailed`, `SessionExpired` and `KeyDesync` while tunneling
//! all lead to `Reconnecting` with transport teardown.
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Closed` is terminal; only `UserConnect` leaves it
//! - Events that make no sense in a state are ignored, not errors
//!
//! ## Last Modified
//! v0.1.0 - Initial state machine

use std::fmt;
use std::time::{Duration, Instant};

use super::ledger::KeepaliveLedger;
use super::LifecycleConfig;

// ============================================
// ConnectionState
// ============================================

/// Externally visible connection phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started.
    #[default]
    Disconnected,
    /// Dialing the transport.
    Connecting,
    /// Handshake and credential exchange in progress.
    Authenticating,
    /// Tunnel up.
    Tunneling,
    /// Tunnel up but keepalives going unanswered.
    Degraded,
    /// Waiting out the backoff delay.
    Reconnecting,
    /// Stopped; needs explicit user action.
    Closed,
}

impl ConnectionState {
    /// Whether packets can flow.
    #[must_use]
    pub const fn is_tunnel_up(self) -> bool {
        matches!(self, Self::Tunneling | Self::Degraded)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Tunneling => "tunneling",
            Self::Degraded => "degraded",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================
// Events and Actions
// ============================================

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// First start.
    Start,
    /// Transport connected.
    TransportEstablished,
    /// Transport failed, timed out or was reset.
    TransportFailed,
    /// Session issued and keys installed.
    AuthSucceeded,
    /// Credentials definitively rejected.
    AuthRejected,
    /// Server identity could not be verified.
    CertificateRejected,
    /// Authentication failed for a network reason.
    AuthTransientFailure,
    /// Keepalive interval elapsed.
    KeepaliveTick {
        /// Tick time
        now: Instant,
    },
    /// Pong received.
    PongReceived {
        /// Arrival time
        now: Instant,
    },
    /// Backoff timer fired.
    BackoffElapsed,
    /// Server reported the session gone.
    SessionExpired,
    /// Decode failures suggest the keys diverged.
    KeyDesync,
    /// User asked to stop.
    UserClose,
    /// User asked to (re)connect.
    UserConnect,
}

/// Why the machine closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// User asked for it.
    UserRequested,
    /// Server rejected the credentials.
    CredentialsRejected,
    /// Server identity could not be verified.
    CertificateRejected,
}

impl CloseReason {
    /// Whether this should be surfaced as a failure.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::UserRequested)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::UserRequested => "closed by user",
            Self::CredentialsRejected => "credentials rejected",
            Self::CertificateRejected => "server certificate rejected",
        };
        f.write_str(text)
    }
}

/// Side effect the driver must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing.
    None,
    /// Dial the transport.
    Dial,
    /// Run handshake and authentication.
    Authenticate,
    /// Start the data plane and flush buffered packets.
    EnterTunnel,
    /// Send a keepalive ping.
    SendPing,
    /// Wait `delay` (plus jitter), then feed `BackoffElapsed`.
    ScheduleReconnect {
        /// Nominal backoff delay
        delay: Duration,
        /// Whether the current transport must be torn down
        teardown: bool,
        /// Too many consecutive cycles without reaching `Tunneling`
        persistent_failure: bool,
    },
    /// Stop everything.
    Shutdown {
        /// Why
        reason: CloseReason,
    },
}

// ============================================
// MachineState
// ============================================

/// Full state carried between transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineState {
    /// Current phase.
    pub phase: ConnectionState,
    /// Keepalive bookkeeping.
    pub ledger: KeepaliveLedger,
    /// Zero-based backoff attempt for the next reconnect.
    pub backoff_attempt: u32,
    /// Reconnect cycles since `Tunneling` was last reached.
    pub consecutive_cycles: u32,
    /// Set once `Closed`.
    pub close_reason: Option<CloseReason>,
}

impl MachineState {
    /// Initial state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_phase(mut self, phase: ConnectionState) -> Self {
        self.phase = phase;
        self
    }

    fn connecting(mut self) -> (Self, Action) {
        self.ledger.reset();
        self.close_reason = None;
        (self.with_phase(ConnectionState::Connecting), Action::Dial)
    }

    fn reconnecting(mut self, teardown: bool, config: &LifecycleConfig) -> (Self, Action) {
        let delay = config.backoff.delay(self.backoff_attempt);
        self.backoff_attempt = self.backoff_attempt.saturating_add(1);
        self.consecutive_cycles = self.consecutive_cycles.saturating_add(1);
        let persistent_failure = self.consecutive_cycles > config.max_consecutive_cycles;
        (
            self.with_phase(ConnectionState::Reconnecting),
            Action::ScheduleReconnect {
                delay,
                teardown,
                persistent_failure,
            },
        )
    }

    fn closed(mut self, reason: CloseReason) -> (Self, Action) {
        self.close_reason = Some(reason);
        (
            self.with_phase(ConnectionState::Closed),
            Action::Shutdown { reason },
        )
    }
}

// ============================================
// Transition Function
// ============================================

/// Computes the next state and the action to perform.
#[must_use]
pub fn transition(state: MachineState, event: Event, config: &LifecycleConfig) -> (MachineState, Action) {
    use ConnectionState as S;

    match (state.phase, event) {
        (S::Closed, Event::UserConnect) => {
            let fresh = MachineState::new();
            fresh.connecting()
        }
        (S::Closed, _) => (state, Action::None),

        (_, Event::UserClose) => state.closed(CloseReason::UserRequested),
        (_, Event::CertificateRejected) => state.closed(CloseReason::CertificateRejected),

        (S::Disconnected, Event::Start | Event::UserConnect)
        | (S::Reconnecting, Event::BackoffElapsed) => state.connecting(),

        (S::Connecting, Event::TransportEstablished) => {
            (state.with_phase(S::Authenticating), Action::Authenticate)
        }
        (S::Connecting, Event::TransportFailed | Event::SessionExpired) => {
            state.reconnecting(false, config)
        }

        (S::Authenticating, Event::AuthSucceeded) => {
            let mut next = state.with_phase(S::Tunneling);
            next.backoff_attempt = 0;
            next.consecutive_cycles = 0;
            next.ledger.reset();
            (next, Action::EnterTunnel)
        }
        (S::Authenticating, Event::AuthRejected) => state.closed(CloseReason::CredentialsRejected),
        (
            S::Authenticating,
            Event::AuthTransientFailure | Event::TransportFailed | Event::SessionExpired,
        ) => state.reconnecting(true, config),

        (S::Tunneling | S::Degraded, Event::KeepaliveTick { now }) => {
            let mut next = state;
            next.ledger.on_tick(now);
            let missed = next.ledger.missed_count;
            if missed >= config.reconnect_after_misses {
                next.reconnecting(true, config)
            } else if missed >= config.degrade_after_misses {
                (next.with_phase(S::Degraded), Action::SendPing)
            } else {
                (next, Action::SendPing)
            }
        }
        (S::Tunneling | S::Degraded, Event::PongReceived { now }) => {
            let mut next = state.with_phase(S::Tunneling);
            next.ledger.on_pong(now);
            (next, Action::None)
        }
        (
            S::Tunneling | S::Degraded,
            Event::TransportFailed | Event::SessionExpired | Event::KeyDesync,
        ) => state.reconnecting(true, config),

        _ => (state, Action::None),
    }
}

// ============================================
// Tests
// ============================================
