// ============================================
// File: crates/burrow-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes all cryptographic operations of the tunnel engine, using
//! audited RustCrypto / dalek implementations.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`keys`]: Ed25519 identity, X25519 ephemeral, symmetric keys
//! - [`handshake`]: signed key agreement and server identity pinning
//! - [`aead`]: ChaCha20-Poly1305 seal/open with frame nonces
//! - [`kdf`]: HKDF-SHA256 derivations (channel, session, rekey)
//! - [`proof`]: salted pre-hashed credential proofs
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Handshake Phase                          │
//! │  Client                                        Server       │
//! │    │  ClientHello{version, X25519 eph} ─────────►│          │
//! │    │ ◄── ServerHello{version, Ed25519 id,        │          │
//! │    │                 X25519 eph, sig(transcript)}│          │
//! │    │                                             │          │
//! │    │  pin check + signature check (fail closed)  │          │
//! │    │  X25519 ──► HKDF(salt = transcript) ──► channel keys   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Authentication Phase                     │
//! │    │  AuthRequest{identity, HMAC proof} ════════►│          │
//! │    │ ◄════ AuthResponse{token, address, key_seed}│          │
//! │    │  HKDF(shared secret, salt = key_seed) ──► session keys │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Transport Phase                          │
//! │   session key + frame nonce ──► ChaCha20-Poly1305           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER roll your own primitives
//! - ALL secret types zeroize on drop
//! - NEVER log keys, shared secrets, proofs or verifiers
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod aead;
pub mod handshake;
pub mod kdf;
pub mod keys;
pub mod proof;

pub use handshake::{ClientHandshake, HandshakeOutcome, ServerHandshake, TrustedServers};
pub use kdf::DirectionKeys;
pub use keys::{EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, SessionKey, SharedSecret};
pub use proof::{CredentialProof, CredentialVerifier};

// ============================================
// Constants
// ============================================

/// Size of an Ed25519 public key in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Size of an X25519 public key in bytes.
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of a ChaCha20-Poly1305 key in bytes.
pub const CHACHA20_KEY_SIZE: usize = 32;

/// Size of a ChaCha20-Poly1305 nonce in bytes.
pub const CHACHA20_NONCE_SIZE: usize = 12;

/// Size of the nonce carried in a packet frame.
pub const FRAME_NONCE_SIZE: usize = 8;

/// Size of a Poly1305 authentication tag in bytes.
pub const POLY1305_TAG_SIZE: usize = 16;

/// Size of key seeds and salts exchanged on the wire.
pub const KEY_SEED_SIZE: usize = 32;

/// SHA-256 digest size.
pub const DIGEST_SIZE: usize = 32;
