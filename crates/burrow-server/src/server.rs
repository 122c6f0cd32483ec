// ============================================
// File: crates/burrow-server/src/server.rs
// ============================================
//! # Server Orchestrator
//!
//! ## Creation Reason
//! Wires the services together and owns the long-running tasks of one
//! server instance.
//!
//! ## Server Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Server                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────┐   per connection   ┌──────────────────┐   │
//! │  │ Accept loop  │ ─────────────────► │ ControlService   │   │
//! │  └──────────────┘                    │ (handshake+auth) │   │
//! │                                      └────────┬─────────┘   │
//! │                                               ▼             │
//! │  ┌──────────────┐   RoutingTable     ┌──────────────────┐   │
//! │  │ Adapter task │ ─────────────────► │ SessionWorker ×N │   │
//! │  └──────────────┘   (by dst IPv4)    └──────────────────┘   │
//! │                                                             │
//! │  ┌──────────────┐                    ┌──────────────────┐   │
//! │  │ Cleanup task │                    │ Stats task       │   │
//! │  └──────────────┘                    └──────────────────┘   │
//! │                                                             │
//! │  Services: SessionStore · IpPool · RoutingTable ·           │
//! │            CredentialStore                                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `run` needs the adapter to exist already (root or CAP_NET_ADMIN)
//! - `run_with` takes any listener and adapter; tests use the in-memory
//!   network and the mock adapter
//! - Shutdown tells every worker first, then waits up to
//!   `SHUTDOWN_GRACE` before aborting what is left
//!
//! ## Last Modified
//! v0.1.0 - Initial server implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use burrow_common::time::SharedClock;
use burrow_common::SystemClock;
use burrow_core::{IdentityKeyPair, IdentityPublicKey};
use burrow_transport::{Listener, TcpTransportListener, Transport, VirtualAdapter};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handlers::{SessionWorker, WorkerSchedule};
use crate::services::{
    ControlService, CredentialStore, Dispatch, IpPool, RoutingTable, SessionPolicy, SessionStore,
};

/// How long shutdown waits for tasks before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pause after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

// ============================================
// Server
// ============================================

/// Burrow tunnel server.
///
/// # Lifecycle
/// 1. Create with `Server::new(config, identity, credentials)`
/// 2. Start with `server.run().await` (or `run_with` for custom I/O)
/// 3. Stop with Ctrl+C or `server.shutdown()`
pub struct Server {
    config: ServerConfig,
    identity: Arc<IdentityKeyPair>,
    credentials: Arc<dyn CredentialStore>,
    clock: SharedClock,
    shutdown: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared state handed to every connection task.
struct ConnectionContext {
    control: ControlService,
    store: Arc<SessionStore>,
    adapter: Arc<dyn VirtualAdapter>,
    schedule: WorkerSchedule,
}

impl Server {
    /// Creates a server instance.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        identity: IdentityKeyPair,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            identity: Arc::new(identity),
            credentials,
            clock: SystemClock::shared(),
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Server identity public key, for pinning on clients.
    #[must_use]
    pub fn public_key(&self) -> IdentityPublicKey {
        self.identity.public_key()
    }

    /// Binds the configured TCP address, attaches the adapter and runs
    /// until Ctrl+C.
    ///
    /// # Errors
    /// `StartupFailed` if the listener or adapter cannot be set up.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listen_addr = self.config.network.listen_addr;
        let listener = TcpTransportListener::bind(listen_addr)
            .await
            .map_err(|e| ServerError::startup_failed(format!("bind {listen_addr}: {e}")))?;
        let adapter = self.attach_adapter()?;

        let signal_watch = {
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
                }
                server.shutdown();
            })
        };

        let result = self.run_with(Arc::new(listener), adapter).await;
        signal_watch.abort();
        result
    }

    #[cfg(target_os = "linux")]
    fn attach_adapter(&self) -> Result<Arc<dyn VirtualAdapter>> {
        let tunnel = &self.config.tunnel;
        let adapter = burrow_transport::TunAdapter::attach(&tunnel.adapter_name, tunnel.mtu)
            .map_err(|e| {
                ServerError::startup_failed(format!(
                    "attach adapter '{}': {e}",
                    tunnel.adapter_name
                ))
            })?;
        Ok(Arc::new(adapter))
    }

    #[cfg(not(target_os = "linux"))]
    fn attach_adapter(&self) -> Result<Arc<dyn VirtualAdapter>> {
        Err(ServerError::startup_failed(
            "attaching a virtual adapter is only supported on Linux",
        ))
    }

    /// Runs the server on the given listener and adapter until shutdown.
    ///
    /// # Errors
    /// `ConfigInvalid` if the address pool cannot be built.
    pub async fn run_with(
        &self,
        listener: Arc<dyn Listener>,
        adapter: Arc<dyn VirtualAdapter>,
    ) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(
            version = env!("CARGO_PKG_VERSION"),
            listen = %listener.local_addr(),
            adapter = adapter.name(),
            identity = %self.identity.public_key(),
            "Starting Burrow server"
        );

        let (store, routing, pool) = self.init_services()?;
        let ctx = Arc::new(ConnectionContext {
            control: ControlService::new(
                Arc::clone(&self.identity),
                Arc::clone(&store),
                self.config.network.handshake_timeout(),
                self.config.network.auth_timeout(),
            ),
            store: Arc::clone(&store),
            adapter: Arc::clone(&adapter),
            schedule: WorkerSchedule::from_config(&self.config),
        });

        let tasks = vec![
            ("adapter", self.spawn_adapter_task(Arc::clone(&adapter), Arc::clone(&routing))),
            ("cleanup", self.spawn_cleanup_task(Arc::clone(&store))),
            ("stats", self.spawn_stats_task(Arc::clone(&store), Arc::clone(&pool))),
        ];

        info!("Server started successfully");

        let mut connections = JoinSet::new();
        if !self.shutdown.load(Ordering::SeqCst) {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(transport) => {
                            let ctx = Arc::clone(&ctx);
                            let shutdown = self.shutdown_tx.subscribe();
                            connections.spawn(serve_connection(ctx, transport, shutdown));
                        }
                        Err(e) => {
                            if self.shutdown.load(Ordering::SeqCst) {
                                break;
                            }
                            warn!(error = %e, "Accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    },
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                }
            }
        }

        info!("Shutting down server...");
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(remaining = connections.len(), "Aborting connections after grace period");
            connections.shutdown().await;
        }

        for (name, task) in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => debug!(task = name, "Task completed"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Task failed"),
                Err(_) => warn!(task = name, "Task timed out during shutdown"),
            }
        }

        let leftover = store.expire_all();
        info!(expired = leftover, "Server shutdown complete");
        Ok(())
    }

    /// Triggers shutdown programmatically.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Builds the address pool, routing table and session store.
    fn init_services(&self) -> Result<(Arc<SessionStore>, Arc<RoutingTable>, Arc<IpPool>)> {
        let (network, prefix) = self.config.tunnel.parse_ip_range()?;
        let pool = Arc::new(IpPool::new(network, prefix, self.config.tunnel.gateway_ip)?);
        let routing = Arc::new(RoutingTable::new());
        let policy = SessionPolicy::from_config(&self.config);
        let store = Arc::new(SessionStore::new(
            policy,
            Arc::clone(&pool),
            Arc::clone(&routing),
            Arc::clone(&self.credentials),
            Arc::clone(&self.clock),
        ));

        info!(
            pool_capacity = pool.capacity(),
            max_sessions = policy.max_sessions,
            max_per_identity = policy.max_per_identity,
            "Services initialized"
        );
        Ok((store, routing, pool))
    }

    /// Reads the adapter and hands each packet to its session worker.
    fn spawn_adapter_task(
        &self,
        adapter: Arc<dyn VirtualAdapter>,
        routing: Arc<RoutingTable>,
    ) -> JoinHandle<()> {
        let shutdown = Arc::clone(&self.shutdown);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Adapter task received shutdown signal");
                        break;
                    }
                    result = adapter.read_packet() => match result {
                        Ok(packet) => match routing.dispatch(packet) {
                            Dispatch::Delivered => {}
                            other => debug!(outcome = ?other, "Adapter packet not delivered"),
                        },
                        Err(e) => {
                            if !shutdown.load(Ordering::SeqCst) {
                                error!(adapter = adapter.name(), error = %e, "Adapter read failed");
                            }
                            break;
                        }
                    },
                }
            }
            debug!("Adapter task exiting");
        })
    }

    /// Periodically expires stale sessions.
    fn spawn_cleanup_task(&self, store: Arc<SessionStore>) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = self.config.limits.cleanup_interval();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = timer.tick() => {
                        let expired = store.cleanup_expired();
                        debug!(
                            expired = expired.len(),
                            sessions = store.count(),
                            "Cleanup cycle complete"
                        );
                    }
                }
            }
            debug!("Cleanup task exiting");
        })
    }

    /// Periodically logs aggregate statistics.
    fn spawn_stats_task(&self, store: Arc<SessionStore>, pool: Arc<IpPool>) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = self.config.logging.stats_interval();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = timer.tick() => {
                        let totals = store.aggregate_stats();
                        info!(
                            sessions = store.count(),
                            addresses_in_use = pool.allocated_count(),
                            addresses_free = pool.available_count(),
                            bytes_sent = totals.bytes_sent,
                            bytes_received = totals.bytes_received,
                            replays_blocked = totals.replays_blocked,
                            auth_failures = totals.auth_failures,
                            "Server statistics"
                        );
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_addr", &self.config.network.listen_addr)
            .field("adapter", &self.config.tunnel.adapter_name)
            .finish_non_exhaustive()
    }
}

/// Admits one connection and runs its session worker.
async fn serve_connection(
    ctx: Arc<ConnectionContext>,
    transport: Box<dyn Transport>,
    shutdown: broadcast::Receiver<()>,
) {
    let transport: Arc<dyn Transport> = Arc::from(transport);
    let peer = transport.peer_addr();
    debug!(peer = %peer, "Connection accepted");

    match ctx.control.admit(transport.as_ref()).await {
        Ok(admitted) => {
            let worker = SessionWorker::new(
                admitted.session,
                Arc::clone(&ctx.store),
                transport,
                Arc::clone(&ctx.adapter),
                ctx.schedule,
            );
            worker.run(admitted.inbox, shutdown).await;
        }
        Err(e) => {
            if e.is_admission_error() {
                info!(peer = %peer, error = %e, "Connection refused");
            } else {
                debug!(peer = %peer, error = %e, "Connection dropped before admission");
            }
            let _ = transport.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use burrow_core::CredentialVerifier;
    use burrow_transport::{MemoryNetwork, MockAdapter};

    use super::*;
    use crate::services::FileCredentialStore;

    fn server() -> Arc<Server> {
        let credentials = FileCredentialStore::new();
        credentials.insert("alice", CredentialVerifier::derive("alice", "pw"));
        Arc::new(Server::new(
            ServerConfig::default(),
            IdentityKeyPair::generate(),
            Arc::new(credentials),
        ))
    }

    #[tokio::test]
    async fn test_run_with_stops_on_shutdown() {
        let server = server();
        let network = MemoryNetwork::new();
        let listener = Arc::new(network.listen("server:8443"));
        let adapter = Arc::new(MockAdapter::default());

        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run_with(listener, adapter).await })
        };
        tokio::task::yield_now().await;
        server.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(10), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_before_start_returns() {
        let server = server();
        server.shutdown();
        let network = MemoryNetwork::new();
        let result = server
            .run_with(
                Arc::new(network.listen("server:8443")),
                Arc::new(MockAdapter::default()),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bad_pool_config_fails() {
        let mut config = ServerConfig::default();
        config.tunnel.ip_range = "10.8.0.0/31".to_string();
        let server = Server::new(
            config,
            IdentityKeyPair::generate(),
            Arc::new(FileCredentialStore::new()),
        );
        let network = MemoryNetwork::new();
        let result = server
            .run_with(
                Arc::new(network.listen("server:8443")),
                Arc::new(MockAdapter::default()),
            )
            .await;
        assert!(result.is_err());
    }
}
