// ============================================
// File: crates/burrow-server/src/main.rs
// ============================================
//! # Burrow Server Entry Point
//!
//! ## Creation Reason
//! CLI for running and provisioning a Burrow server.
//!
//! ## Usage
//! ```bash
//! # Step 1: Create the server identity (pin the printed key on clients)
//! burrow-server keygen
//!
//! # Step 2: Add client credentials
//! burrow-server hash-credential --identity alice --secret '...' >> /etc/burrow/credentials
//!
//! # Step 3: Start server
//! burrow-server start
//!
//! # Other commands
//! burrow-server validate            # Validate config file
//! burrow-server pubkey              # Show server public key
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `start` requires root or CAP_NET_ADMIN to attach the adapter
//! - `hash-credential` is the only place a raw secret is accepted; it
//!   prints the verifier and nothing else
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use burrow_core::{CredentialVerifier, IdentityKeyPair};
use burrow_server::{key_file, FileCredentialStore, Server, ServerConfig};

const DEFAULT_CONFIG: &str = "/etc/burrow/server.toml";

// ============================================
// CLI Definition
// ============================================

/// Burrow tunnel server
#[derive(Parser, Debug)]
#[command(name = "burrow-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Generate the server identity key
    Keygen {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Show the server public key
    Pubkey {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = KeyFormat::Base64)]
        format: KeyFormat,
    },

    /// Print a credential file line for an identity
    HashCredential {
        /// Client identity
        #[arg(short, long)]
        identity: String,

        /// Client secret
        #[arg(short, long)]
        secret: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyFormat {
    Base64,
    Hex,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging("info");

    let result = match cli.command {
        Commands::Start { config } => cmd_start(&config).await,
        Commands::Validate { config } => cmd_validate(&config).await,
        Commands::Keygen { config, force } => cmd_keygen(&config, force).await,
        Commands::Pubkey { config, format } => cmd_pubkey(&config, format).await,
        Commands::HashCredential { identity, secret } => {
            cmd_hash_credential(&identity, &secret);
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the server.
async fn cmd_start(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    init_logging(&config.logging.level);

    let identity = key_file::load(&config.server_key.key_file)
        .await
        .context("server key unavailable; run `burrow-server keygen` first")?;
    let credentials = FileCredentialStore::load(&config.credentials.file).await?;
    if credentials.is_empty() {
        info!("Credential file is empty; every client will be rejected");
    }

    let server = Arc::new(Server::new(config, identity, Arc::new(credentials)));
    info!(identity = %server.public_key(), "Server identity loaded");
    server.run().await?;
    Ok(())
}

/// Validates the configuration file.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("Config file not found: {}", config_path.display());
        println!("   Server will use default values.");
        return Ok(());
    }

    let config = ServerConfig::load(config_path).await?;

    println!("Configuration is valid");
    println!();
    println!("Network:");
    println!("   Listen:         {}", config.network.listen_addr);
    println!("   Handshake:      {}s", config.network.handshake_timeout_secs);
    println!("   Auth:           {}s", config.network.auth_timeout_secs);
    println!();
    println!("Tunnel:");
    println!("   IP Range:       {}", config.tunnel.ip_range);
    println!("   Gateway:        {}", config.tunnel.gateway_ip);
    println!("   Adapter:        {}", config.tunnel.adapter_name);
    println!("   MTU:            {}", config.tunnel.mtu);
    println!();
    println!("Limits:");
    println!("   Max Sessions:   {}", config.limits.max_sessions);
    println!("   Per Identity:   {}", config.limits.max_sessions_per_identity);
    println!("   Lease:          {}s", config.limits.lease_secs);
    println!("   Idle Timeout:   {}s", config.limits.idle_timeout_secs);
    println!();
    println!("Crypto:");
    println!("   Key Rotation:   {}s", config.crypto.key_rotation_secs);
    println!("   Rotation Grace: {}s", config.crypto.rotation_grace_secs);
    println!();

    Ok(())
}

/// Generates and stores a new identity key.
async fn cmd_keygen(config_path: &Path, force: bool) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    let key_path = PathBuf::from(&config.server_key.key_file);

    if key_path.exists() && !force {
        anyhow::bail!(
            "key file {} already exists (use --force to replace it)",
            key_path.display()
        );
    }

    let identity = IdentityKeyPair::generate();
    key_file::save(&identity, &key_path).await?;

    println!("Server key written to {}", key_path.display());
    println!("Public key (pin this on clients):");
    println!("   {}", identity.public_key());
    Ok(())
}

/// Prints the server public key.
async fn cmd_pubkey(config_path: &Path, format: KeyFormat) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    let identity = key_file::load(&config.server_key.key_file).await?;

    match format {
        KeyFormat::Base64 => println!("{}", identity.public_key()),
        KeyFormat::Hex => println!("{}", hex::encode(identity.public_key().to_bytes())),
    }
    Ok(())
}

/// Prints `identity verifier` for the credential file.
fn cmd_hash_credential(identity: &str, secret: &str) {
    let verifier = CredentialVerifier::derive(identity, secret);
    println!("{identity} {}", verifier.to_base64());
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

/// Loads the config file, or defaults if it does not exist.
async fn load_or_default_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if path.exists() {
        Ok(ServerConfig::load(path).await?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(ServerConfig::default())
    }
}
