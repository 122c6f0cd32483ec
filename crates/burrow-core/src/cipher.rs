// ============================================
// File: crates/burrow-core/src/cipher.rs
// ============================================
//! # Session Cipher State
//!
//! ## Creation Reason
//! Holds the live keys of one session (or one control channel) and the
//! per-direction state that must be mutated atomically with them: the
//! send counter and the receive replay guards.
//!
//! ## Main Functionality
//! - `KeyRing`: fixed-capacity (2) ordered list of key epochs
//! - `SessionCipher`: send ring + receive ring, each behind its own lock
//! - Rotation with a grace window for in-flight frames
//!
//! ## Key Ring During Rotation
//! ```text
//!   before           after rotate(seed) at t
//!   ┌───────────┐    ┌────────────────────────┐
//!   │ current K0│    │ current  K1 = HKDF(K0)  │
//!   └───────────┘    │ previous K0 until t+30s │
//!                    └────────────────────────┘
//!
//!   receive: try K1, then K0 while t < valid_until
//!   send:    always the current epoch
//! ```
//!
//! The send counter is per session and carries on across epochs, so the
//! sequences of two epochs never overlap. A sequence any live epoch has
//! already seen is a replay; no key is tried for it.
//!
//! ## Server Rotation Sequence
//! The `Rekey` frame must be sealed under the old send key, otherwise the
//! peer could not read it. The server therefore stages the rotation
//! (receive side switches immediately), seals `Rekey`, then commits the
//! staged send key. The client applies both halves at once on receipt.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The send lock covers counter increment AND sealing; never split them
//! - The receive lock covers check, open and mark; never split them
//! - Rotation bounds the frames sealed under one key, not the counter;
//!   `NonceExhausted` ends the session
//! - Never log anything from an epoch
//!
//! ## Last Modified
//! v0.1.0 - Initial key ring and session cipher

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use burrow_common::time::{coarse_timestamp, SharedClock};

use crate::crypto::aead::{self, FrameNonce, MAX_FRAME_COUNTER};
use crate::crypto::kdf::{ratchet_key, DirectionKeys};
use crate::crypto::keys::SessionKey;
use crate::crypto::KEY_SEED_SIZE;
use crate::error::{CoreError, Result};
use crate::replay::ReplayGuard;

// ============================================
// Configuration
// ============================================

/// Default grace window for the previous key after a rotation.
pub const DEFAULT_ROTATION_GRACE: Duration = Duration::from_secs(30);

/// Default number of frames sealed under one send key before a rotation
/// is requested.
pub const DEFAULT_ROTATION_SOFT_LIMIT: u64 = 1 << 32;

/// Tunables for a [`SessionCipher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherConfig {
    /// How long the previous receive key stays valid after a rotation.
    pub rotation_grace: Duration,
    /// Frames under one send key at which [`SessionCipher::needs_rotation`]
    /// turns true.
    pub rotation_soft_limit: u64,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            rotation_grace: DEFAULT_ROTATION_GRACE,
            rotation_soft_limit: DEFAULT_ROTATION_SOFT_LIMIT,
        }
    }
}

// ============================================
// KeyRing
// ============================================

/// One key epoch with its direction-specific state.
#[derive(Debug)]
pub struct KeyEpoch<S> {
    key: SessionKey,
    valid_from: Instant,
    valid_until: Option<Instant>,
    state: S,
}

impl<S> KeyEpoch<S> {
    fn new(key: SessionKey, valid_from: Instant, state: S) -> Self {
        Self {
            key,
            valid_from,
            valid_until: None,
            state,
        }
    }

    /// When this epoch became current.
    #[must_use]
    pub const fn valid_from(&self) -> Instant {
        self.valid_from
    }

    /// End of the grace window, `None` while current.
    #[must_use]
    pub const fn valid_until(&self) -> Option<Instant> {
        self.valid_until
    }

    fn is_live(&self, now: Instant) -> bool {
        self.valid_until.map_or(true, |until| now < until)
    }
}

/// Fixed-capacity ordered list of key epochs: current first, then at most
/// one previous epoch inside its grace window.
#[derive(Debug)]
pub struct KeyRing<S> {
    current: KeyEpoch<S>,
    previous: Option<KeyEpoch<S>>,
}

impl<S> KeyRing<S> {
    fn new(key: SessionKey, now: Instant, state: S) -> Self {
        Self {
            current: KeyEpoch::new(key, now, state),
            previous: None,
        }
    }

    /// Installs `key` as current; the old current epoch stays live until
    /// `now + grace`. Any older epoch falls off the ring.
    fn install(&mut self, key: SessionKey, now: Instant, grace: Duration, state: S) {
        let mut old = std::mem::replace(&mut self.current, KeyEpoch::new(key, now, state));
        old.valid_until = Some(now + grace);
        self.previous = Some(old);
    }

    fn prune(&mut self, now: Instant) {
        if self.previous.as_ref().is_some_and(|p| !p.is_live(now)) {
            self.previous = None;
        }
    }

    /// Number of epochs held (1 or 2).
    #[must_use]
    pub fn len(&self) -> usize {
        1 + usize::from(self.previous.is_some())
    }

    /// Always false; a ring holds at least its current epoch.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The current epoch.
    #[must_use]
    pub const fn current(&self) -> &KeyEpoch<S> {
        &self.current
    }

    /// The previous epoch, if still held.
    #[must_use]
    pub const fn previous(&self) -> Option<&KeyEpoch<S>> {
        self.previous.as_ref()
    }
}

/// Send side of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendState {
    /// Counter of the next frame.
    next: u64,
    /// Counter of the first frame under this key.
    first: u64,
}

impl SendState {
    const fn starting_at(counter: u64) -> Self {
        Self {
            next: counter,
            first: counter,
        }
    }

    const fn sealed(&self) -> u64 {
        self.next - self.first
    }
}

// ============================================
// SessionCipher
// ============================================

/// Cipher state shared by everything that encodes or decodes frames for
/// one session.
#[derive(Debug)]
pub struct SessionCipher {
    send: Mutex<KeyRing<SendState>>,
    recv: Mutex<KeyRing<ReplayGuard>>,
    staged_send: Mutex<Option<SessionKey>>,
    clock: SharedClock,
    config: CipherConfig,
    invalidated: AtomicBool,
    expires_at: Mutex<Option<Instant>>,
    rotations: AtomicU32,
}

impl SessionCipher {
    /// Creates a cipher from explicit send/receive keys.
    #[must_use]
    pub fn new(send: SessionKey, recv: SessionKey, clock: SharedClock, config: CipherConfig) -> Self {
        let now = clock.now();
        Self {
            send: Mutex::new(KeyRing::new(send, now, SendState::starting_at(0))),
            recv: Mutex::new(KeyRing::new(recv, now, ReplayGuard::new())),
            staged_send: Mutex::new(None),
            clock,
            config,
            invalidated: AtomicBool::new(false),
            expires_at: Mutex::new(None),
            rotations: AtomicU32::new(0),
        }
    }

    /// Client-side cipher over a key pair.
    #[must_use]
    pub fn for_client(keys: &DirectionKeys, clock: SharedClock, config: CipherConfig) -> Self {
        let (send, recv) = keys.for_client();
        Self::new(send, recv, clock, config)
    }

    /// Server-side cipher over a key pair.
    #[must_use]
    pub fn for_server(keys: &DirectionKeys, clock: SharedClock, config: CipherConfig) -> Self {
        let (send, recv) = keys.for_server();
        Self::new(send, recv, clock, config)
    }

    // ========================================
    // Lifetime
    // ========================================

    /// Makes every later seal/open fail with `SessionExpired`.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    /// Whether [`invalidate`](Self::invalidate) was called.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    /// Sets (or clears) the hard expiry of the cipher.
    pub fn set_expires_at(&self, at: Option<Instant>) {
        *self.expires_at.lock() = at;
    }

    fn ensure_live(&self, now: Instant) -> Result<()> {
        if self.is_invalidated() {
            return Err(CoreError::SessionExpired);
        }
        if self.expires_at.lock().is_some_and(|at| now >= at) {
            return Err(CoreError::SessionExpired);
        }
        Ok(())
    }

    // ========================================
    // Rotation
    // ========================================

    /// Rotates both directions with `seed` at once.
    ///
    /// # Errors
    /// Returns `KeyDerivation` if HKDF fails.
    pub fn rotate_with_seed(&self, seed: &[u8; KEY_SEED_SIZE]) -> Result<()> {
        self.stage_rotation(seed)?;
        self.commit_staged_send();
        Ok(())
    }

    /// Rotates the receive direction now and stages the next send key
    /// until [`commit_staged_send`](Self::commit_staged_send).
    ///
    /// A rotation staged while another is pending commits the pending one
    /// first so both peers ratchet the same number of times.
    ///
    /// # Errors
    /// Returns `KeyDerivation` if HKDF fails.
    pub fn stage_rotation(&self, seed: &[u8; KEY_SEED_SIZE]) -> Result<()> {
        self.commit_staged_send();
        let now = self.clock.now();
        let grace = self.config.rotation_grace;

        let next_send = ratchet_key(&self.send.lock().current.key, seed)?;
        {
            let mut recv = self.recv.lock();
            let next_recv = ratchet_key(&recv.current.key, seed)?;
            recv.install(next_recv, now, grace, ReplayGuard::new());
        }
        *self.staged_send.lock() = Some(next_send);
        let rotations = self.rotations.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(rotations, "Receive key ratcheted, send key staged");
        Ok(())
    }

    /// Switches sealing to the staged send key, if any. The counter
    /// carries on from the old key.
    pub fn commit_staged_send(&self) {
        if let Some(key) = self.staged_send.lock().take() {
            let now = self.clock.now();
            let mut send = self.send.lock();
            let state = SendState::starting_at(send.current.state.next);
            send.install(key, now, self.config.rotation_grace, state);
            trace!(counter = state.next, "Staged send key committed");
        }
    }

    /// Whether the current send key sealed as many frames as the soft
    /// limit allows.
    #[must_use]
    pub fn needs_rotation(&self) -> bool {
        self.send.lock().current.state.sealed() >= self.config.rotation_soft_limit
    }

    /// Counter of the next frame to be sealed.
    #[must_use]
    pub fn send_counter(&self) -> u64 {
        self.send.lock().current.state.next
    }

    /// Number of rotations applied so far.
    #[must_use]
    pub fn rotations(&self) -> u32 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Number of live receive epochs.
    #[must_use]
    pub fn live_receive_epochs(&self) -> usize {
        let now = self.clock.now();
        let mut recv = self.recv.lock();
        recv.prune(now);
        recv.len()
    }

    // ========================================
    // Seal / Open
    // ========================================

    /// Seals `plaintext` with the next nonce of the current send epoch.
    ///
    /// # Errors
    /// - `SessionExpired`: invalidated or expired cipher
    /// - `NonceExhausted`: the 40-bit counter is used up
    pub(crate) fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<(FrameNonce, Vec<u8>)> {
        let now = self.clock.now();
        self.ensure_live(now)?;
        let coarse = coarse_timestamp(self.clock.unix_secs());

        let mut send = self.send.lock();
        let counter = send.current.state.next;
        if counter > MAX_FRAME_COUNTER {
            return Err(CoreError::NonceExhausted);
        }
        let nonce = FrameNonce::new(counter, coarse);
        let sealed = aead::seal(&send.current.key, nonce, aad, plaintext)?;
        send.current.state.next = counter + 1;
        Ok((nonce, sealed))
    }

    /// Opens a frame body, trying the current receive epoch then the
    /// previous one while its grace window lasts.
    ///
    /// # Errors
    /// - `SessionExpired`: invalidated or expired cipher
    /// - `ReplayDetected`: a live epoch has seen the sequence or finds it
    ///   too old; nothing is decrypted
    /// - `AuthenticationFailed`: no live key opens the frame
    pub(crate) fn open(&self, aad: &[u8], nonce: FrameNonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let now = self.clock.now();
        self.ensure_live(now)?;
        let sequence = nonce.counter();

        let mut recv = self.recv.lock();
        recv.prune(now);

        // after prune every epoch on the ring is live
        let KeyRing { current, previous } = &mut *recv;
        let seen = !current.state.check(sequence)
            || previous.as_ref().is_some_and(|p| !p.state.check(sequence));
        if seen {
            return Err(CoreError::ReplayDetected { sequence });
        }

        for epoch in std::iter::once(current).chain(previous.as_mut()) {
            if let Ok(plaintext) = aead::open(&epoch.key, nonce, aad, ciphertext) {
                epoch.state.accept(sequence);
                return Ok(plaintext);
            }
        }
        Err(CoreError::AuthenticationFailed)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use burrow_common::time::{Clock, ManualClock};

    use super::*;

    fn keys() -> DirectionKeys {
        DirectionKeys {
            client_to_server: SessionKey::from_bytes([1; 32]),
            server_to_client: SessionKey::from_bytes([2; 32]),
        }
    }

    fn pair() -> (Arc<ManualClock>, SessionCipher, SessionCipher) {
        let clock = Arc::new(ManualClock::new());
        let client = SessionCipher::for_client(&keys(), clock.clone(), CipherConfig::default());
        let server = SessionCipher::for_server(&keys(), clock.clone(), CipherConfig::default());
        (clock, client, server)
    }

    #[test]
    fn test_seal_open_between_peers() {
        let (_, client, server) = pair();
        let (nonce, ct) = client.seal(b"hd", b"ping").unwrap();
        assert_eq!(nonce.counter(), 0);
        assert_eq!(server.open(b"hd", nonce, &ct).unwrap(), b"ping");
        assert_eq!(client.send_counter(), 1);
    }

    #[test]
    fn test_reflection_fails() {
        let (_, client, _) = pair();
        let (nonce, ct) = client.seal(b"", b"x").unwrap();
        assert!(matches!(
            client.open(b"", nonce, &ct),
            Err(CoreError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_replay_rejected_without_decryption() {
        let (_, client, server) = pair();
        let (nonce, ct) = client.seal(b"", b"x").unwrap();
        server.open(b"", nonce, &ct).unwrap();
        assert!(matches!(
            server.open(b"", nonce, &ct),
            Err(CoreError::ReplayDetected { sequence: 0 })
        ));
    }

    #[test]
    fn test_forged_frame_does_not_advance_window() {
        let (_, client, server) = pair();
        let (nonce, ct) = client.seal(b"", b"x").unwrap();
        let forged = FrameNonce::new(500, 0);
        assert!(server.open(b"", forged, &ct).is_err());
        assert_eq!(server.open(b"", nonce, &ct).unwrap(), b"x");
    }

    #[test]
    fn test_rotation_grace_window() {
        let (clock, client, server) = pair();
        let (old_nonce, old_ct) = client.seal(b"", b"in flight").unwrap();

        let seed = [7u8; 32];
        server.stage_rotation(&seed).unwrap();
        server.commit_staged_send();
        client.rotate_with_seed(&seed).unwrap();
        assert_eq!(server.rotations(), 1);
        assert_eq!(client.send_counter(), 1);

        let (nonce, ct) = client.seal(b"", b"fresh").unwrap();
        assert_eq!(server.open(b"", nonce, &ct).unwrap(), b"fresh");

        clock.advance(Duration::from_secs(10));
        assert_eq!(server.open(b"", old_nonce, &old_ct).unwrap(), b"in flight");
        assert_eq!(server.live_receive_epochs(), 2);

        let (late_nonce, late_ct) = {
            // an old-key frame with a sequence nobody has seen yet
            let stale = SessionCipher::for_client(&keys(), clock.clone(), CipherConfig::default());
            for _ in 0..2 {
                stale.seal(b"", b"late").unwrap();
            }
            stale.seal(b"", b"late").unwrap()
        };
        clock.advance(Duration::from_secs(21));
        assert_eq!(server.live_receive_epochs(), 1);
        assert!(matches!(
            server.open(b"", late_nonce, &late_ct),
            Err(CoreError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_sequence_seen_by_one_epoch_refused_by_the_other() {
        let (clock, client, server) = pair();
        let stale = SessionCipher::for_client(&keys(), clock.clone(), CipherConfig::default());

        let seed = [3u8; 32];
        server.rotate_with_seed(&seed).unwrap();
        client.rotate_with_seed(&seed).unwrap();
        let (nonce, ct) = client.seal(b"", b"new key").unwrap();
        assert_eq!(server.open(b"", nonce, &ct).unwrap(), b"new key");

        // valid under the previous key, but its sequence is already taken
        let (old_nonce, old_ct) = stale.seal(b"", b"old key").unwrap();
        assert_eq!(old_nonce.counter(), nonce.counter());
        assert!(matches!(
            server.open(b"", old_nonce, &old_ct),
            Err(CoreError::ReplayDetected { sequence: 0 })
        ));
        assert!(matches!(
            server.open(b"", nonce, &ct),
            Err(CoreError::ReplayDetected { sequence: 0 })
        ));
    }

    #[test]
    fn test_counter_carries_on_across_rotation() {
        let (_, client, server) = pair();
        client.seal(b"", b"a").unwrap();
        client.seal(b"", b"b").unwrap();
        client.rotate_with_seed(&[4; 32]).unwrap();
        server.rotate_with_seed(&[4; 32]).unwrap();

        let (nonce, ct) = client.seal(b"", b"c").unwrap();
        assert_eq!(nonce.counter(), 2);
        assert_eq!(server.open(b"", nonce, &ct).unwrap(), b"c");
    }

    #[test]
    fn test_staged_rotation_keeps_old_send_key() {
        let (_, client, server) = pair();
        let seed = [9u8; 32];
        server.stage_rotation(&seed).unwrap();

        let (nonce, ct) = server.seal(b"", b"rekey").unwrap();
        assert_eq!(client.open(b"", nonce, &ct).unwrap(), b"rekey");

        client.rotate_with_seed(&seed).unwrap();
        server.commit_staged_send();
        let (nonce, ct) = server.seal(b"", b"after").unwrap();
        assert_eq!(client.open(b"", nonce, &ct).unwrap(), b"after");
        let (nonce, ct) = client.seal(b"", b"up").unwrap();
        assert_eq!(server.open(b"", nonce, &ct).unwrap(), b"up");
    }

    #[test]
    fn test_invalidate_and_expiry() {
        let (clock, client, server) = pair();
        let (nonce, ct) = client.seal(b"", b"x").unwrap();
        server.invalidate();
        assert!(matches!(
            server.open(b"", nonce, &ct),
            Err(CoreError::SessionExpired)
        ));

        client.set_expires_at(Some(clock.now() + Duration::from_secs(5)));
        assert!(client.seal(b"", b"y").is_ok());
        clock.advance(Duration::from_secs(5));
        assert!(matches!(client.seal(b"", b"y"), Err(CoreError::SessionExpired)));
    }

    #[test]
    fn test_needs_rotation_at_soft_limit() {
        let clock = Arc::new(ManualClock::new());
        let config = CipherConfig {
            rotation_soft_limit: 2,
            ..CipherConfig::default()
        };
        let cipher = SessionCipher::for_client(&keys(), clock, config);
        assert!(!cipher.needs_rotation());
        cipher.seal(b"", b"").unwrap();
        cipher.seal(b"", b"").unwrap();
        assert!(cipher.needs_rotation());
        cipher.rotate_with_seed(&[1; 32]).unwrap();
        assert!(!cipher.needs_rotation());
    }
}
