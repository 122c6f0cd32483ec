// ============================================
// File: crates/burrow-client/src/main.rs
// ============================================
//! # Burrow Client Entry Point
//!
//! ## Usage
//! ```bash
//! # Connect and stay connected until Ctrl-C
//! burrow-client connect --config /etc/burrow/client.toml
//!
//! # Check a config file
//! burrow-client validate --config /etc/burrow/client.toml
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `connect` needs CAP_NET_ADMIN to attach the adapter
//! - The adapter must be addressed with the assigned virtual IP by
//!   external tooling; the address is logged once the session is up
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use burrow_client::{Client, ClientConfig};
use burrow_transport::{TcpConnector, VirtualAdapter};

const DEFAULT_CONFIG: &str = "/etc/burrow/client.toml";

// ============================================
// CLI Definition
// ============================================

/// Burrow tunnel client
#[derive(Parser, Debug)]
#[command(name = "burrow-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the configured server
    Connect {
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
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Connect { config } => cmd_connect(&config).await,
        Commands::Validate { config } => cmd_validate(&config).await,
    };

    if let Err(e) = result {
        init_logging("info");
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Runs the tunnel until Ctrl-C or a fatal rejection.
async fn cmd_connect(config_path: &Path) -> anyhow::Result<()> {
    let config = ClientConfig::load(config_path)
        .await
        .with_context(|| format!("cannot use {}", config_path.display()))?;
    init_logging(&config.logging.level);

    let adapter = attach_adapter(&config)?;
    let connector = Arc::new(TcpConnector::new(config.timeouts.connect()));
    let client = Arc::new(Client::new(&config, connector, adapter));

    client.on_persistent_failure(|cycles| {
        warn!(cycles, "Still unable to reach the server; check the network or server address");
    });

    let watcher = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, disconnecting");
                client.close();
            }
        }
    });

    let result = client.run().await;
    watcher.abort();

    let stats = client.statistics();
    info!(
        sent = stats.packets_sent,
        received = stats.packets_received,
        dropped = stats.packets_dropped,
        reconnects = stats.total_reconnects,
        "Client stopped"
    );
    result.map_err(Into::into)
}

/// Validates the configuration file.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    let config = ClientConfig::load(config_path).await?;

    println!("Configuration is valid");
    println!();
    println!("Server:");
    println!("   Address:        {}", config.server.address);
    println!("   Pinned Keys:    {}", config.server.trusted_keys.len());
    println!("   Identity:       {}", config.credentials.identity);
    println!();
    println!("Tunnel:");
    println!("   Adapter:        {}", config.tunnel.adapter_name);
    println!("   MTU:            {}", config.tunnel.mtu);
    println!();
    println!("Keepalive:");
    println!("   Interval:       {}s", config.keepalive.interval_secs);
    println!("   Degrade After:  {} misses", config.keepalive.degrade_after_misses);
    println!("   Reconnect After:{} misses", config.keepalive.reconnect_after_misses);
    println!();
    println!("Reconnect:");
    println!("   Backoff:        {}ms .. {}s", config.reconnect.backoff_initial_ms, config.reconnect.backoff_ceiling_secs);
    println!("   Buffer:         {} packets / {}s", config.reconnect.buffer_packets, config.reconnect.buffer_secs);
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

#[cfg(target_os = "linux")]
fn attach_adapter(config: &ClientConfig) -> anyhow::Result<Arc<dyn VirtualAdapter>> {
    let adapter = burrow_transport::TunAdapter::attach(&config.tunnel.adapter_name, config.tunnel.mtu)
        .with_context(|| format!("cannot attach adapter {}", config.tunnel.adapter_name))?;
    Ok(Arc::new(adapter))
}

#[cfg(not(target_os = "linux"))]
fn attach_adapter(_config: &ClientConfig) -> anyhow::Result<Arc<dyn VirtualAdapter>> {
    anyhow::bail!("virtual adapters are only supported on Linux")
}

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
