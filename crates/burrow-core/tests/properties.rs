//! Property-based tests for the frame codec, replay guard, key rotation
//! and reconnect backoff.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use burrow_common::time::ManualClock;
use burrow_core::lifecycle::{
    transition, Action, BackoffPolicy, Event, LifecycleConfig, MachineState,
};
use burrow_core::{
    CipherConfig, CoreError, DirectionKeys, FrameCodec, ReplayGuard, SessionCipher, SessionKey,
};
use proptest::prelude::*;

const MTU: usize = 1420;

fn cipher_pair(
    c2s: [u8; 32],
    s2c: [u8; 32],
) -> (Arc<ManualClock>, SessionCipher, SessionCipher) {
    let keys = DirectionKeys {
        client_to_server: SessionKey::from_bytes(c2s),
        server_to_client: SessionKey::from_bytes(s2c),
    };
    let clock = Arc::new(ManualClock::new());
    let client = SessionCipher::for_client(&keys, clock.clone(), CipherConfig::default());
    let server = SessionCipher::for_server(&keys, clock.clone(), CipherConfig::default());
    (clock, client, server)
}

proptest! {
    #[test]
    fn prop_codec_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..=MTU),
        c2s in prop::array::uniform32(any::<u8>()),
        s2c in prop::array::uniform32(any::<u8>()),
    ) {
        let codec = FrameCodec::new(MTU);
        let (_, client, server) = cipher_pair(c2s, s2c);
        let frame = codec.encode(&plaintext, &client).unwrap();
        prop_assert_eq!(frame.len(), 2 + 8 + plaintext.len() + 16);
        let decoded = codec.decode(&frame, &server).unwrap();
        prop_assert_eq!(&decoded[..], &plaintext[..]);
    }

    #[test]
    fn prop_bit_flip_fails_authentication(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        bit in 0usize..8,
        offset in any::<prop::sample::Index>(),
    ) {
        let codec = FrameCodec::new(MTU);
        let (_, client, server) = cipher_pair([1; 32], [2; 32]);
        let mut frame = codec.encode(&plaintext, &client).unwrap().to_vec();
        let body_start = 2 + 8;
        let i = body_start + offset.index(frame.len() - body_start);
        frame[i] ^= 1 << bit;
        prop_assert!(matches!(
            codec.decode(&frame, &server),
            Err(CoreError::AuthenticationFailed)
        ));
    }

    #[test]
    fn prop_replay_accept_once(sequences in prop::collection::vec(0u64..10_000, 1..200)) {
        let mut guard = ReplayGuard::new();
        let mut accepted = HashSet::new();
        for seq in sequences {
            if guard.accept(seq) {
                prop_assert!(accepted.insert(seq), "sequence {} accepted twice", seq);
            }
            prop_assert!(!guard.accept(seq));
        }
    }

    #[test]
    fn prop_replay_too_old_rejected(highest in 64u64..1_000_000, age in 64u64..10_000) {
        let mut guard = ReplayGuard::new();
        prop_assert!(guard.accept(highest));
        let old = highest.saturating_sub(age);
        prop_assert!(!guard.check(old));
        prop_assert!(!guard.accept(old));
    }

    #[test]
    fn prop_nonces_unique(count in 1usize..500) {
        let codec = FrameCodec::new(MTU);
        let (_, client, _) = cipher_pair([5; 32], [6; 32]);
        let mut nonces = HashSet::new();
        for i in 0..count {
            if i == count / 2 {
                client.rotate_with_seed(&[9; 32]).unwrap();
            }
            let frame = codec.encode(b"x", &client).unwrap();
            prop_assert!(nonces.insert(frame[2..10].to_vec()));
        }
    }

    #[test]
    fn prop_backoff_non_decreasing_and_bounded(
        initial_ms in 1u64..5_000,
        ceiling_ms in 1u64..60_000,
        attempts in 1u32..40,
    ) {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(initial_ms),
            ceiling: Duration::from_millis(ceiling_ms),
            jitter_ratio: 0.2,
        };
        let mut previous = Duration::ZERO;
        for attempt in 0..attempts {
            let delay = policy.delay(attempt);
            prop_assert!(delay >= previous);
            prop_assert!(delay <= policy.ceiling);
            previous = delay;
        }
    }

    #[test]
    fn prop_rotation_continuity(seed in prop::array::uniform32(any::<u8>()), wait in 0u64..30) {
        let codec = FrameCodec::new(MTU);
        let (clock, client, server) = cipher_pair([7; 32], [8; 32]);
        let in_flight = codec.encode(b"before rotation", &client).unwrap();

        server.rotate_with_seed(&seed).unwrap();
        client.rotate_with_seed(&seed).unwrap();

        clock.advance(Duration::from_secs(wait));
        let decoded = codec.decode(&in_flight, &server).unwrap();
        prop_assert_eq!(&decoded[..], b"before rotation");

        let fresh = codec.encode(b"after rotation", &client).unwrap();
        prop_assert_eq!(&codec.decode(&fresh, &server).unwrap()[..], b"after rotation");
    }
}

#[test]
fn test_rotation_grace_expires() {
    let codec = FrameCodec::new(MTU);
    let (clock, client, server) = cipher_pair([7; 32], [8; 32]);
    let first = codec.encode(b"one", &client).unwrap();
    let second = codec.encode(b"two", &client).unwrap();

    server.rotate_with_seed(&[3; 32]).unwrap();
    codec.decode(&first, &server).unwrap();

    clock.advance(Duration::from_secs(31));
    assert!(matches!(
        codec.decode(&second, &server),
        Err(CoreError::AuthenticationFailed)
    ));
}

#[test]
fn test_backoff_sequence_through_machine() {
    let config = LifecycleConfig::default();
    let mut state = transition(MachineState::new(), Event::Start, &config).0;
    let mut delays = Vec::new();
    for _ in 0..7 {
        let (next, action) = transition(state, Event::TransportFailed, &config);
        if let Action::ScheduleReconnect { delay, .. } = action {
            delays.push(delay);
        }
        state = transition(next, Event::BackoffElapsed, &config).0;
    }
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert!(delays.iter().all(|d| *d <= config.backoff.ceiling));
    assert_eq!(delays[0], config.backoff.initial);
}
