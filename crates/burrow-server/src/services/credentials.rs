// ============================================
// File: crates/burrow-server/src/services/credentials.rs
// ============================================
//! # Credential Store
//!
//! ## Creation Reason
//! Answers one question for the session store: does this proof come
//! from a holder of the identity's secret?
//!
//! ## File Format
//! ```text
//! # identity      verifier (base64 of SHA-256(salt || secret))
//! alice           3q2+7w...
//! bob             q83vEj...
//! ```
//! Blank lines and `#` comments are ignored. Verifiers are produced by
//! `burrow-server hash-credential`; raw secrets never touch the server.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Unknown identities and bad proofs are indistinguishable to callers
//! - Verification is constant time in the proof

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use tracing::info;

use burrow_core::{CredentialProof, CredentialVerifier};

use crate::error::{Result, ServerError};

// ============================================
// CredentialStore
// ============================================

/// Source of truth for client credentials.
pub trait CredentialStore: Send + Sync {
    /// Whether `proof` is valid for `identity`.
    fn verify(&self, identity: &str, proof: &CredentialProof) -> bool;
}

// ============================================
// FileCredentialStore
// ============================================

/// In-memory verifier table, usually loaded from a credential file.
#[derive(Default)]
pub struct FileCredentialStore {
    verifiers: RwLock<HashMap<String, CredentialVerifier>>,
}

impl FileCredentialStore {
    /// Creates an empty store; every proof is rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a credential file.
    ///
    /// # Errors
    /// `CredentialFile` on I/O failure or a malformed line.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::CredentialFile {
                path: path_str.clone(),
                line: 0,
                reason: e.to_string(),
            })?;
        let store = Self::parse(&path_str, &content)?;
        info!(path = %path_str, identities = store.len(), "Credentials loaded");
        Ok(store)
    }

    /// Parses credential file contents.
    ///
    /// # Errors
    /// `CredentialFile` naming the first malformed line.
    pub fn parse(source: &str, content: &str) -> Result<Self> {
        let mut verifiers = HashMap::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let bad = |reason: &str| ServerError::CredentialFile {
                path: source.to_string(),
                line: index + 1,
                reason: reason.to_string(),
            };

            let mut fields = line.split_whitespace();
            let (Some(identity), Some(verifier), None) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(bad("expected `identity verifier`"));
            };
            let verifier = CredentialVerifier::from_base64(verifier)
                .map_err(|_| bad("verifier must be 32 bytes of base64"))?;
            if verifiers.insert(identity.to_string(), verifier).is_some() {
                return Err(bad("duplicate identity"));
            }
        }
        Ok(Self {
            verifiers: RwLock::new(verifiers),
        })
    }

    /// Adds or replaces one identity.
    pub fn insert(&self, identity: impl Into<String>, verifier: CredentialVerifier) {
        self.verifiers.write().insert(identity.into(), verifier);
    }

    /// Removes one identity. Existing sessions are not affected.
    pub fn remove(&self, identity: &str) -> bool {
        self.verifiers.write().remove(identity).is_some()
    }

    /// Number of identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.verifiers.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verifiers.read().is_empty()
    }
}

impl CredentialStore for FileCredentialStore {
    fn verify(&self, identity: &str, proof: &CredentialProof) -> bool {
        self.verifiers
            .read()
            .get(identity)
            .is_some_and(|verifier| proof.verify(verifier, identity))
    }
}

impl std::fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("identities", &self.len())
            .finish()
    }
}
