// ============================================
// File: crates/burrow-server/src/key_file.rs
// ============================================
//! # Identity Key File
//!
//! The server's Ed25519 identity lives in a small JSON file:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "key_type": "ed25519",
//!   "public_key": "<base64>",
//!   "private_key": "<base64 seed>",
//!   "created_at": "1700000000Z"
//! }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Files are written with mode `0o600` on Unix
//! - `load` cross-checks `public_key` against the seed

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use burrow_common::time::unix_timestamp;
use burrow_core::IdentityKeyPair;

use crate::error::{Result, ServerError};

const KEY_FILE_VERSION: &str = "1.0";
const KEY_TYPE: &str = "ed25519";

/// On-disk key file format.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: String,
    key_type: String,
    public_key: String,
    private_key: String,
    created_at: String,
}

/// Loads the identity stored at `path`.
///
/// # Errors
/// `KeyFile` if the file is unreadable, malformed, or inconsistent.
pub async fn load(path: impl AsRef<Path>) -> Result<IdentityKeyPair> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ServerError::key_file(&path_str, e.to_string()))?;
    let mut data: KeyFile = serde_json::from_str(&content)
        .map_err(|e| ServerError::key_file(&path_str, e.to_string()))?;

    if data.key_type != KEY_TYPE {
        return Err(ServerError::key_file(
            &path_str,
            format!("unsupported key type '{}'", data.key_type),
        ));
    }

    let mut seed = BASE64
        .decode(data.private_key.trim())
        .map_err(|_| ServerError::key_file(&path_str, "private_key is not valid base64"))?;
    data.private_key.zeroize();
    let identity = IdentityKeyPair::from_bytes(&seed);
    seed.zeroize();
    let identity = identity.map_err(|e| ServerError::key_file(&path_str, e.to_string()))?;

    if identity.public_key().to_string() != data.public_key.trim() {
        return Err(ServerError::key_file(
            &path_str,
            "public_key does not match private_key",
        ));
    }
    Ok(identity)
}

/// Writes `identity` to `path`, creating parent directories.
///
/// # Errors
/// `KeyFile` on any I/O failure.
pub async fn save(identity: &IdentityKeyPair, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    let io_err = |e: std::io::Error| ServerError::key_file(&path_str, e.to_string());

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
    }

    let mut seed = identity.to_bytes();
    let mut data = KeyFile {
        version: KEY_FILE_VERSION.to_string(),
        key_type: KEY_TYPE.to_string(),
        public_key: identity.public_key().to_string(),
        private_key: BASE64.encode(seed),
        created_at: format!("{}Z", unix_timestamp()),
    };
    seed.zeroize();

    let content = serde_json::to_string_pretty(&data)
        .map_err(|e| ServerError::key_file(&path_str, e.to_string()));
    data.private_key.zeroize();
    let mut content = content?;

    let written = tokio::fs::write(path, &content).await;
    content.zeroize();
    written.map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await.map_err(io_err)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("server_key.json");
        let identity = IdentityKeyPair::generate();

        save(&identity, &path).await.unwrap();
        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_mismatched_public_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_key.json");
        save(&IdentityKeyPair::generate(), &path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&text).unwrap();
        json["public_key"] = IdentityKeyPair::generate().public_key().to_string().into();
        std::fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(load(&path).await, Err(ServerError::KeyFile { .. })));
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(load("/nonexistent/server_key.json").await.is_err());
    }
}
