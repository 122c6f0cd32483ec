// ============================================
// File: crates/burrow-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! TOML configuration for the Burrow server, with a default for every
//! field so a minimal file (or none at all) works.
//!
//! ## Configuration Sections
//! - `network`: listen address and per-phase timeouts
//! - `tunnel`: virtual address pool, gateway, adapter name and MTU
//! - `server_key`: identity key file path
//! - `credentials`: credential file path
//! - `limits`: session limits, lease, idle timeout, cleanup cadence,
//!   keepalive toward clients
//! - `crypto`: key rotation interval and grace window
//! - `logging`: log level and statistics cadence
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:8443"
//!
//! [tunnel]
//! ip_range = "10.8.0.0/24"
//! gateway_ip = "10.8.0.1"
//! adapter_name = "burrow0"
//! mtu = 1420
//!
//! [limits]
//! max_sessions = 100
//! max_sessions_per_identity = 3
//! keepalive_interval_secs = 15
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The adapter must already exist with the gateway address assigned;
//!   the server never configures it
//! - All config changes require a restart
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use burrow_core::cipher::CipherConfig;
use burrow_core::lifecycle::{DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_RECONNECT_AFTER_MISSES};

use crate::error::{Result, ServerError};

// ============================================
// ServerConfig
// ============================================

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Virtual network settings.
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Identity key settings.
    #[serde(default)]
    pub server_key: ServerKeyConfig,

    /// Credential store settings.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Key rotation settings.
    #[serde(default)]
    pub crypto: CryptoConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    /// `ConfigLoad` if the file cannot be read or parsed, `ConfigInvalid`
    /// if a value is out of range.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!(path = %path_str, "Loading configuration");

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;
        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Parses and validates configuration from a string.
    ///
    /// # Errors
    /// Same as [`ServerConfig::load`].
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    /// `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.tunnel.validate()?;
        self.limits.validate()?;
        self.crypto.validate()?;
        Ok(())
    }

    /// Serializes configuration to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Cipher parameters for new sessions.
    #[must_use]
    pub fn cipher_config(&self) -> CipherConfig {
        CipherConfig {
            rotation_grace: Duration::from_secs(self.crypto.rotation_grace_secs),
            ..CipherConfig::default()
        }
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Listener configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Time allowed from accept to a valid `ClientHello`.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Time allowed from `ServerHello` to `AuthRequest`.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8443))
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_auth_timeout() -> u64 {
    5
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.listen_addr.port() == 0 {
            return Err(ServerError::config_invalid(
                "network.listen_addr",
                "port cannot be 0",
            ));
        }
        if self.handshake_timeout_secs == 0 || self.auth_timeout_secs == 0 {
            return Err(ServerError::config_invalid(
                "network.*_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Handshake deadline.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Authentication deadline.
    #[must_use]
    pub const fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            handshake_timeout_secs: default_handshake_timeout(),
            auth_timeout_secs: default_auth_timeout(),
        }
    }
}

// ============================================
// TunnelConfig
// ============================================

/// Virtual network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Client address range (CIDR notation).
    #[serde(default = "default_ip_range")]
    pub ip_range: String,

    /// Server's own address inside the tunnel.
    #[serde(default = "default_gateway_ip")]
    pub gateway_ip: Ipv4Addr,

    /// Name of the pre-created TUN interface.
    #[serde(default = "default_adapter_name")]
    pub adapter_name: String,

    /// Adapter MTU.
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

fn default_ip_range() -> String {
    "10.8.0.0/24".to_string()
}

fn default_gateway_ip() -> Ipv4Addr {
    Ipv4Addr::new(10, 8, 0, 1)
}

fn default_adapter_name() -> String {
    "burrow0".to_string()
}

fn default_mtu() -> u16 {
    1420
}

impl TunnelConfig {
    fn validate(&self) -> Result<()> {
        let (network, prefix) = self.parse_ip_range()?;
        if prefix > 30 {
            return Err(ServerError::config_invalid(
                "tunnel.ip_range",
                "prefix length must be <= 30",
            ));
        }
        let mask = !0u32 << (32 - prefix);
        if u32::from(self.gateway_ip) & mask != u32::from(network) & mask {
            return Err(ServerError::config_invalid(
                "tunnel.gateway_ip",
                "gateway is outside ip_range",
            ));
        }
        if self.adapter_name.is_empty() || self.adapter_name.len() > 15 {
            return Err(ServerError::config_invalid(
                "tunnel.adapter_name",
                "must be 1 to 15 characters",
            ));
        }
        if !(576..=9000).contains(&self.mtu) {
            return Err(ServerError::config_invalid(
                "tunnel.mtu",
                "must be between 576 and 9000",
            ));
        }
        Ok(())
    }

    /// Parses the range into `(network, prefix_len)`.
    ///
    /// # Errors
    /// `ConfigInvalid` if the range is not `a.b.c.d/n`.
    pub fn parse_ip_range(&self) -> Result<(Ipv4Addr, u8)> {
        let (addr, prefix) = self.ip_range.split_once('/').ok_or_else(|| {
            ServerError::config_invalid(
                "tunnel.ip_range",
                "must be in CIDR notation (e.g., 10.8.0.0/24)",
            )
        })?;

        let network: Ipv4Addr = addr.parse().map_err(|_| {
            ServerError::config_invalid("tunnel.ip_range", "invalid network address")
        })?;
        let prefix: u8 = prefix.parse().map_err(|_| {
            ServerError::config_invalid("tunnel.ip_range", "invalid prefix length")
        })?;
        if prefix > 32 {
            return Err(ServerError::config_invalid(
                "tunnel.ip_range",
                "prefix length cannot exceed 32",
            ));
        }

        Ok((network, prefix))
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ip_range: default_ip_range(),
            gateway_ip: default_gateway_ip(),
            adapter_name: default_adapter_name(),
            mtu: default_mtu(),
        }
    }
}

// ============================================
// ServerKeyConfig / CredentialsConfig
// ============================================

/// Identity key configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerKeyConfig {
    /// Path to the JSON key file.
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

fn default_key_file() -> String {
    "/etc/burrow/server_key.json".to_string()
}

impl Default for ServerKeyConfig {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
        }
    }
}

/// Credential store configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Path to the credential file (`identity verifier` per line).
    #[serde(default = "default_credentials_file")]
    pub file: String,
}

fn default_credentials_file() -> String {
    "/etc/burrow/credentials".to_string()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            file: default_credentials_file(),
        }
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Resource limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Maximum concurrent sessions per identity.
    #[serde(default = "default_max_sessions_per_identity")]
    pub max_sessions_per_identity: usize,

    /// Session lease in seconds.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,

    /// Idle time after which a session is reclaimed.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Expiry sweep interval.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Seconds between pings to each client.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// Unanswered pings after which a session is torn down.
    #[serde(default = "default_keepalive_misses")]
    pub keepalive_misses: u32,
}

fn default_max_sessions() -> usize {
    100
}

fn default_max_sessions_per_identity() -> usize {
    3
}

fn default_lease() -> u64 {
    86_400
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_keepalive_interval() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL.as_secs()
}

fn default_keepalive_misses() -> u32 {
    DEFAULT_RECONNECT_AFTER_MISSES
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(ServerError::config_invalid(
                "limits.max_sessions",
                "must be greater than 0",
            ));
        }
        if self.max_sessions_per_identity == 0 {
            return Err(ServerError::config_invalid(
                "limits.max_sessions_per_identity",
                "must be greater than 0",
            ));
        }
        if self.lease_secs == 0 || self.lease_secs > u64::from(u32::MAX) {
            return Err(ServerError::config_invalid(
                "limits.lease_secs",
                "must be between 1 and 2^32-1",
            ));
        }
        if self.idle_timeout_secs == 0 || self.cleanup_interval_secs == 0 {
            return Err(ServerError::config_invalid(
                "limits.idle_timeout_secs",
                "timeouts must be greater than 0",
            ));
        }
        if self.keepalive_interval_secs == 0 || self.keepalive_misses == 0 {
            return Err(ServerError::config_invalid(
                "limits.keepalive_interval_secs",
                "keepalive interval and misses must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Session lease.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    /// Idle timeout.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Cleanup interval.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Keepalive interval.
    #[must_use]
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_sessions_per_identity: default_max_sessions_per_identity(),
            lease_secs: default_lease(),
            idle_timeout_secs: default_idle_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_misses: default_keepalive_misses(),
        }
    }
}

// ============================================
// CryptoConfig
// ============================================

/// Key rotation configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Periodic rotation interval.
    #[serde(default = "default_key_rotation")]
    pub key_rotation_secs: u64,

    /// How long the previous key stays valid after a rotation.
    #[serde(default = "default_rotation_grace")]
    pub rotation_grace_secs: u64,
}

fn default_key_rotation() -> u64 {
    14_400
}

fn default_rotation_grace() -> u64 {
    30
}

impl CryptoConfig {
    fn validate(&self) -> Result<()> {
        if self.key_rotation_secs == 0 {
            return Err(ServerError::config_invalid(
                "crypto.key_rotation_secs",
                "must be greater than 0",
            ));
        }
        if self.rotation_grace_secs >= self.key_rotation_secs {
            return Err(ServerError::config_invalid(
                "crypto.rotation_grace_secs",
                "must be shorter than the rotation interval",
            ));
        }
        Ok(())
    }

    /// Periodic rotation interval.
    #[must_use]
    pub const fn key_rotation(&self) -> Duration {
        Duration::from_secs(self.key_rotation_secs)
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_rotation_secs: default_key_rotation(),
            rotation_grace_secs: default_rotation_grace(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Interval of the statistics summary log line.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval() -> u64 {
    300
}

impl LoggingConfig {
    /// Statistics log interval.
    #[must_use]
    pub const fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.listen_addr.port(), 8443);
        assert_eq!(config.tunnel.gateway_ip, Ipv4Addr::new(10, 8, 0, 1));
        assert_eq!(config.limits.max_sessions, 100);
        assert_eq!(config.limits.max_sessions_per_identity, 3);
        assert_eq!(config.limits.lease(), Duration::from_secs(86_400));
        assert_eq!(config.crypto.key_rotation(), Duration::from_secs(14_400));
        assert_eq!(config.limits.keepalive_interval(), Duration::from_secs(15));
        assert_eq!(config.limits.keepalive_misses, 3);
        assert_eq!(config.logging.stats_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
            [network]
            listen_addr = "127.0.0.1:9000"

            [limits]
            max_sessions = 10
        "#;

        let config = ServerConfig::from_str(toml).unwrap();
        assert_eq!(config.network.listen_addr.port(), 9000);
        assert_eq!(config.network.auth_timeout(), Duration::from_secs(5));
        assert_eq!(config.limits.max_sessions, 10);
        assert_eq!(config.limits.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.tunnel.mtu, 1420);
    }

    #[test]
    fn test_parse_ip_range() {
        let (network, prefix) = TunnelConfig::default().parse_ip_range().unwrap();
        assert_eq!(network, Ipv4Addr::new(10, 8, 0, 0));
        assert_eq!(prefix, 24);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            "[network]\nlisten_addr = \"0.0.0.0:0\"",
            "[tunnel]\nip_range = \"10.8.0.0\"",
            "[tunnel]\ngateway_ip = \"192.168.1.1\"",
            "[tunnel]\nmtu = 100",
            "[limits]\nmax_sessions_per_identity = 0",
            "[limits]\nkeepalive_misses = 0",
            "[crypto]\nrotation_grace_secs = 20000",
        ];
        for case in cases {
            let err = ServerConfig::from_str(case).unwrap_err();
            assert!(err.is_config_error(), "{case} should be rejected");
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ServerConfig::default();
        let reparsed = ServerConfig::from_str(&config.to_toml()).unwrap();
        assert_eq!(reparsed.tunnel.ip_range, config.tunnel.ip_range);
        assert_eq!(reparsed.limits.lease_secs, config.limits.lease_secs);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        let config = ServerConfig::load(file.path()).await.unwrap();
        assert_eq!(config.logging.level, "debug");

        let missing = ServerConfig::load("/nonexistent/burrow.toml").await;
        assert!(matches!(missing, Err(ServerError::ConfigLoad { .. })));
    }
}
