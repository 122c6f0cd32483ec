// ============================================
// File: crates/burrow-client/src/config.rs
// ============================================
//! # Client Configuration
//!
//! ## Creation Reason
//! TOML configuration for the Burrow client. Everything except the
//! server address, pinned keys and credentials has a working default.
//!
//! ## Configuration Sections
//! - `server`: address and pinned identity keys
//! - `credentials`: identity and secret
//! - `tunnel`: adapter name and MTU
//! - `keepalive`: ping cadence and miss thresholds
//! - `reconnect`: backoff schedule and outbound buffering
//! - `timeouts`: dial and authentication deadlines
//! - `security`: reaction to bursts of undecryptable frames
//! - `logging`: log level
//!
//! ## Example Configuration
//! ```toml
//! [server]
//! address = "vpn.example.net:8443"
//! trusted_keys = ["q0k4mX8...="]
//!
//! [credentials]
//! identity = "alice"
//! secret = "correct horse battery staple"
//!
//! [reconnect]
//! backoff_ceiling_secs = 30
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Debug` never prints the secret
//! - An empty `trusted_keys` list is a configuration error: the client
//!   refuses to talk to an unverified server
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use burrow_core::lifecycle::BackoffPolicy;
use burrow_core::{
    AuthFailureMonitor, AuthFailurePolicy, IdentityPublicKey, LifecycleConfig, TrustedServers,
};

use crate::error::{ClientError, Result};

// ============================================
// ClientConfig
// ============================================

/// Main client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server to connect to.
    #[serde(default)]
    pub server: ServerSection,

    /// Account credentials.
    #[serde(default)]
    pub credentials: CredentialsSection,

    /// Local adapter.
    #[serde(default)]
    pub tunnel: TunnelSection,

    /// Keepalive settings.
    #[serde(default)]
    pub keepalive: KeepaliveSection,

    /// Reconnect settings.
    #[serde(default)]
    pub reconnect: ReconnectSection,

    /// Phase deadlines.
    #[serde(default)]
    pub timeouts: TimeoutSection,

    /// Decode failure handling.
    #[serde(default)]
    pub security: SecuritySection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ClientConfig {
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
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;
        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Parses and validates configuration from a string.
    ///
    /// # Errors
    /// Same as [`ClientConfig::load`].
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ClientError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    /// `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.credentials.validate()?;
        self.tunnel.validate()?;
        self.keepalive.validate()?;
        self.reconnect.validate()?;
        self.timeouts.validate()?;
        self.security.validate()?;
        Ok(())
    }

    /// Constants for the reconnect state machine.
    #[must_use]
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            keepalive_interval: self.keepalive.interval(),
            degrade_after_misses: self.keepalive.degrade_after_misses,
            reconnect_after_misses: self.keepalive.reconnect_after_misses,
            backoff: BackoffPolicy {
                initial: Duration::from_millis(self.reconnect.backoff_initial_ms),
                ceiling: Duration::from_secs(self.reconnect.backoff_ceiling_secs),
                jitter_ratio: self.reconnect.jitter_ratio,
            },
            max_consecutive_cycles: self.reconnect.max_consecutive_cycles,
        }
    }

    /// Pinned server identities.
    #[must_use]
    pub fn trusted_servers(&self) -> TrustedServers {
        TrustedServers::new(self.server.trusted_keys.iter().copied())
    }

    /// Fresh decode failure monitor.
    #[must_use]
    pub fn auth_failure_monitor(&self) -> AuthFailureMonitor {
        AuthFailureMonitor::new(
            self.security.on_auth_failure.into(),
            self.security.auth_failure_threshold,
            Duration::from_secs(self.security.auth_failure_window_secs),
        )
    }
}

// ============================================
// ServerSection
// ============================================

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// `host:port` of the server.
    #[serde(default = "default_server_address")]
    pub address: String,

    /// Base64 Ed25519 identities the server may present.
    #[serde(default)]
    pub trusted_keys: Vec<IdentityPublicKey>,
}

fn default_server_address() -> String {
    "127.0.0.1:8443".to_string()
}

impl ServerSection {
    fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(ClientError::config_invalid("server.address", "cannot be empty"));
        }
        if self.trusted_keys.is_empty() {
            return Err(ClientError::config_invalid(
                "server.trusted_keys",
                "at least one pinned server key is required",
            ));
        }
        Ok(())
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            trusted_keys: Vec::new(),
        }
    }
}

// ============================================
// CredentialsSection
// ============================================

/// Credentials configuration section.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsSection {
    /// Account identity.
    #[serde(default)]
    pub identity: String,

    /// Account secret. Only a proof derived from it is ever sent.
    #[serde(default)]
    pub secret: String,
}

impl CredentialsSection {
    fn validate(&self) -> Result<()> {
        if self.identity.is_empty() || self.identity.len() > 255 {
            return Err(ClientError::config_invalid(
                "credentials.identity",
                "must be 1 to 255 bytes",
            ));
        }
        if self.secret.is_empty() {
            return Err(ClientError::config_invalid("credentials.secret", "cannot be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for CredentialsSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsSection")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// ============================================
// TunnelSection
// ============================================

/// Local adapter configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSection {
    /// Adapter to attach to.
    #[serde(default = "default_adapter_name")]
    pub adapter_name: String,

    /// Adapter MTU.
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

fn default_adapter_name() -> String {
    "burrow0".to_string()
}

fn default_mtu() -> u16 {
    1420
}

impl TunnelSection {
    fn validate(&self) -> Result<()> {
        if self.adapter_name.is_empty() || self.adapter_name.len() > 15 {
            return Err(ClientError::config_invalid(
                "tunnel.adapter_name",
                "must be 1 to 15 characters",
            ));
        }
        if !(576..=9000).contains(&self.mtu) {
            return Err(ClientError::config_invalid(
                "tunnel.mtu",
                "must be between 576 and 9000",
            ));
        }
        Ok(())
    }
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self {
            adapter_name: default_adapter_name(),
            mtu: default_mtu(),
        }
    }
}

// ============================================
// KeepaliveSection
// ============================================

/// Keepalive configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveSection {
    /// Seconds between pings.
    #[serde(default = "default_keepalive_interval")]
    pub interval_secs: u64,

    /// Missed pongs before the tunnel counts as degraded.
    #[serde(default = "default_degrade_after")]
    pub degrade_after_misses: u32,

    /// Missed pongs before reconnecting.
    #[serde(default = "default_reconnect_after")]
    pub reconnect_after_misses: u32,
}

fn default_keepalive_interval() -> u64 {
    15
}

fn default_degrade_after() -> u32 {
    2
}

fn default_reconnect_after() -> u32 {
    3
}

impl KeepaliveSection {
    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(ClientError::config_invalid(
                "keepalive.interval_secs",
                "must be greater than 0",
            ));
        }
        if self.degrade_after_misses == 0 || self.reconnect_after_misses <= self.degrade_after_misses
        {
            return Err(ClientError::config_invalid(
                "keepalive.reconnect_after_misses",
                "must be greater than degrade_after_misses, which must be at least 1",
            ));
        }
        Ok(())
    }

    /// Ping cadence.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for KeepaliveSection {
    fn default() -> Self {
        Self {
            interval_secs: default_keepalive_interval(),
            degrade_after_misses: default_degrade_after(),
            reconnect_after_misses: default_reconnect_after(),
        }
    }
}

// ============================================
// ReconnectSection
// ============================================

/// Reconnect configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSection {
    /// First backoff delay in milliseconds.
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,

    /// Backoff ceiling in seconds.
    #[serde(default = "default_backoff_ceiling")]
    pub backoff_ceiling_secs: u64,

    /// Maximum extra random delay as a fraction of the nominal delay.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// How long outbound packets are held while reconnecting.
    #[serde(default = "default_buffer_secs")]
    pub buffer_secs: u64,

    /// How many outbound packets are held while reconnecting.
    #[serde(default = "default_buffer_packets")]
    pub buffer_packets: usize,

    /// Reconnect cycles before a persistent failure is reported.
    #[serde(default = "default_max_cycles")]
    pub max_consecutive_cycles: u32,
}

fn default_backoff_initial() -> u64 {
    1000
}

fn default_backoff_ceiling() -> u64 {
    15
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_buffer_secs() -> u64 {
    5
}

fn default_buffer_packets() -> usize {
    512
}

fn default_max_cycles() -> u32 {
    5
}

impl ReconnectSection {
    fn validate(&self) -> Result<()> {
        if self.backoff_initial_ms == 0 {
            return Err(ClientError::config_invalid(
                "reconnect.backoff_initial_ms",
                "must be greater than 0",
            ));
        }
        if self.backoff_ceiling_secs.saturating_mul(1000) < self.backoff_initial_ms {
            return Err(ClientError::config_invalid(
                "reconnect.backoff_ceiling_secs",
                "must not be below the initial delay",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ClientError::config_invalid(
                "reconnect.jitter_ratio",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.buffer_packets == 0 {
            return Err(ClientError::config_invalid(
                "reconnect.buffer_packets",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Maximum age of a buffered outbound packet.
    #[must_use]
    pub const fn buffer_window(&self) -> Duration {
        Duration::from_secs(self.buffer_secs)
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            backoff_initial_ms: default_backoff_initial(),
            backoff_ceiling_secs: default_backoff_ceiling(),
            jitter_ratio: default_jitter_ratio(),
            buffer_secs: default_buffer_secs(),
            buffer_packets: default_buffer_packets(),
            max_consecutive_cycles: default_max_cycles(),
        }
    }
}

// ============================================
// TimeoutSection
// ============================================

/// Phase deadline configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSection {
    /// Dial deadline.
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Deadline for each of the handshake and authentication replies.
    #[serde(default = "default_auth_timeout")]
    pub auth_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_auth_timeout() -> u64 {
    5
}

impl TimeoutSection {
    fn validate(&self) -> Result<()> {
        if self.connect_secs == 0 || self.auth_secs == 0 {
            return Err(ClientError::config_invalid(
                "timeouts.*_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Dial deadline.
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Reply deadline during setup.
    #[must_use]
    pub const fn auth(&self) -> Duration {
        Duration::from_secs(self.auth_secs)
    }
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            auth_secs: default_auth_timeout(),
        }
    }
}

// ============================================
// SecuritySection
// ============================================

/// What to do when undecryptable frames pile up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnAuthFailure {
    /// Log a warning.
    #[default]
    AlertOnly,
    /// Drop the connection and authenticate again.
    ForceReconnect,
}

impl From<OnAuthFailure> for AuthFailurePolicy {
    fn from(mode: OnAuthFailure) -> Self {
        match mode {
            OnAuthFailure::AlertOnly => Self::AlertOnly,
            OnAuthFailure::ForceReconnect => Self::ForceReconnect,
        }
    }
}

/// Decode failure configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySection {
    /// Reaction once the threshold is crossed.
    #[serde(default)]
    pub on_auth_failure: OnAuthFailure,

    /// Failures inside the window that trigger the reaction.
    #[serde(default = "default_auth_failure_threshold")]
    pub auth_failure_threshold: u32,

    /// Sliding window length in seconds.
    #[serde(default = "default_auth_failure_window")]
    pub auth_failure_window_secs: u64,
}

fn default_auth_failure_threshold() -> u32 {
    16
}

fn default_auth_failure_window() -> u64 {
    10
}

impl SecuritySection {
    fn validate(&self) -> Result<()> {
        if self.auth_failure_threshold == 0 || self.auth_failure_window_secs == 0 {
            return Err(ClientError::config_invalid(
                "security.auth_failure_*",
                "threshold and window must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            on_auth_failure: OnAuthFailure::default(),
            auth_failure_threshold: default_auth_failure_threshold(),
            auth_failure_window_secs: default_auth_failure_window(),
        }
    }
}

// ============================================
// LoggingSection
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::io::Write;

    use burrow_core::IdentityKeyPair;

    use super::*;

    fn minimal(extra: &str) -> String {
        let key = IdentityKeyPair::generate().public_key();
        format!(
            "[server]\naddress = \"vpn.example.net:8443\"\ntrusted_keys = [\"{key}\"]\n\n\
             [credentials]\nidentity = \"alice\"\nsecret = \"wonderland\"\n\n{extra}"
        )
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ClientConfig::from_str(&minimal("")).unwrap();
        let lifecycle = config.lifecycle_config();
        assert_eq!(lifecycle.keepalive_interval, Duration::from_secs(15));
        assert_eq!(lifecycle.degrade_after_misses, 2);
        assert_eq!(lifecycle.reconnect_after_misses, 3);
        assert_eq!(lifecycle.backoff.initial, Duration::from_secs(1));
        assert_eq!(lifecycle.backoff.ceiling, Duration::from_secs(15));
        assert!((lifecycle.backoff.jitter_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(lifecycle.max_consecutive_cycles, 5);
        assert_eq!(config.reconnect.buffer_window(), Duration::from_secs(5));
        assert_eq!(config.timeouts.connect(), Duration::from_secs(10));
        assert_eq!(config.timeouts.auth(), Duration::from_secs(5));
        assert_eq!(config.trusted_servers().len(), 1);
        assert_eq!(
            config.auth_failure_monitor().policy(),
            AuthFailurePolicy::AlertOnly
        );
    }

    #[test]
    fn test_missing_trust_anchor_rejected() {
        let toml = "[credentials]\nidentity = \"alice\"\nsecret = \"x\"";
        let err = ClientConfig::from_str(toml).unwrap_err();
        assert!(matches!(err, ClientError::ConfigInvalid { ref field, .. } if field == "server.trusted_keys"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            "[keepalive]\ninterval_secs = 0",
            "[keepalive]\ndegrade_after_misses = 3\nreconnect_after_misses = 3",
            "[reconnect]\njitter_ratio = 1.5",
            "[reconnect]\nbackoff_initial_ms = 20000\nbackoff_ceiling_secs = 15",
            "[tunnel]\nmtu = 100",
            "[security]\nauth_failure_threshold = 0",
        ];
        for case in cases {
            let err = ClientConfig::from_str(&minimal(case)).unwrap_err();
            assert!(err.is_config_error(), "{case} should be rejected");
        }
    }

    #[test]
    fn test_force_reconnect_policy_parses() {
        let config =
            ClientConfig::from_str(&minimal("[security]\non_auth_failure = \"force-reconnect\""))
                .unwrap();
        assert_eq!(
            config.auth_failure_monitor().policy(),
            AuthFailurePolicy::ForceReconnect
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ClientConfig::from_str(&minimal("")).unwrap();
        let printed = format!("{config:?}");
        assert!(printed.contains("alice"));
        assert!(!printed.contains("wonderland"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", minimal("[logging]\nlevel = \"debug\"")).unwrap();

        let config = ClientConfig::load(file.path()).await.unwrap();
        assert_eq!(config.logging.level, "debug");

        let missing = ClientConfig::load("/nonexistent/client.toml").await;
        assert!(matches!(missing, Err(ClientError::ConfigLoad { .. })));
    }
}
