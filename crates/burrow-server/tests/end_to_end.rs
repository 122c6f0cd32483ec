// ============================================
// File: crates/burrow-server/tests/end_to_end.rs
// ============================================
//! Client and server wired together over the in-memory network.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use burrow_client::{Client, ClientConfig, ClientError};
use burrow_core::lifecycle::CloseReason;
use burrow_core::{ConnectionState, CredentialVerifier, IdentityKeyPair};
use burrow_server::{FileCredentialStore, Server, ServerConfig};
use burrow_transport::{Connector, Listener, MemoryNetwork, MockAdapter, Transport, VirtualAdapter};

const SERVER_ADDR: &str = "srv";
const STEP: Duration = Duration::from_secs(5);

// ============================================
// Harness
// ============================================

struct Harness {
    network: MemoryNetwork,
    server: Arc<Server>,
    server_adapter: Arc<MockAdapter>,
    server_task: JoinHandle<burrow_server::Result<()>>,
}

impl Harness {
    fn start() -> Self {
        let network = MemoryNetwork::new();
        let credentials = FileCredentialStore::new();
        credentials.insert("alice", CredentialVerifier::derive("alice", "wonderland"));

        let server = Arc::new(Server::new(
            ServerConfig::default(),
            IdentityKeyPair::generate(),
            Arc::new(credentials),
        ));
        let server_adapter = Arc::new(MockAdapter::default());
        let listener: Arc<dyn Listener> = Arc::new(network.listen(SERVER_ADDR));

        let server_task = tokio::spawn({
            let server = Arc::clone(&server);
            let adapter = Arc::clone(&server_adapter);
            async move { server.run_with(listener, adapter).await }
        });

        Self {
            network,
            server,
            server_adapter,
            server_task,
        }
    }

    fn client(&self, address: &str, secret: &str) -> (Arc<Client>, Arc<MockAdapter>) {
        let mut config = ClientConfig::default();
        config.server.address = address.into();
        config.server.trusted_keys = vec![self.server.public_key()];
        config.credentials.identity = "alice".into();
        config.credentials.secret = secret.into();

        let adapter = Arc::new(MockAdapter::default());
        let client = Arc::new(Client::new(
            &config,
            Arc::new(self.network.connector()),
            Arc::clone(&adapter) as Arc<dyn VirtualAdapter>,
        ));
        (client, adapter)
    }

    async fn stop(self) {
        self.server.shutdown();
        self.server_task.await.unwrap().unwrap();
    }
}

fn spawn_run(client: &Arc<Client>) -> JoinHandle<burrow_client::Result<()>> {
    let client = Arc::clone(client);
    tokio::spawn(async move { client.run().await })
}

async fn wait_for_state(client: &Client, target: ConnectionState) {
    let mut states = client.subscribe();
    tokio::time::timeout(STEP, states.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {target}"))
        .unwrap();
}

fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Bytes {
    let mut packet = vec![0u8; 20];
    packet[0] = 0x45;
    packet[12..16].copy_from_slice(&src.octets());
    packet[16..20].copy_from_slice(&dst.octets());
    packet.extend_from_slice(payload);
    Bytes::from(packet)
}

/// Forwards one client connection to the server, flipping a bit in the
/// next server frame whenever `tamper` is set.
fn spawn_relay(network: &MemoryNetwork, address: &str, tamper: Arc<AtomicBool>) {
    let listener = network.listen(address);
    let connector = network.connector();
    tokio::spawn(async move {
        let client_side: Arc<dyn Transport> = Arc::from(listener.accept().await.unwrap());
        let server_side: Arc<dyn Transport> = Arc::from(connector.dial(SERVER_ADDR).await.unwrap());

        let upstream = {
            let (from, to) = (Arc::clone(&client_side), Arc::clone(&server_side));
            tokio::spawn(async move {
                while let Ok(frame) = from.recv().await {
                    if to.send(&frame).await.is_err() {
                        break;
                    }
                }
            })
        };

        while let Ok(frame) = server_side.recv().await {
            let mut frame = frame.to_vec();
            if tamper.swap(false, Ordering::AcqRel) {
                let last = frame.len() - 1;
                frame[last] ^= 0x01;
            }
            if client_side.send(&frame).await.is_err() {
                break;
            }
        }
        upstream.abort();
    });
}

// ============================================
// Scenarios
// ============================================

#[tokio::test]
async fn test_cold_start_moves_packets_both_ways() {
    let harness = Harness::start();
    let (client, adapter) = harness.client(SERVER_ADDR, "wonderland");
    let runner = spawn_run(&client);

    wait_for_state(&client, ConnectionState::Tunneling).await;
    assert!(client.is_connected());
    let session = client.session().expect("session installed");
    let vip = session.virtual_address.inner();
    assert!(vip.octets()[..3] == [10, 8, 0] && vip != Ipv4Addr::new(10, 8, 0, 1));
    assert_eq!(session.server_identity, harness.server.public_key());

    let outbound = ipv4(vip, Ipv4Addr::new(93, 184, 216, 34), b"hello");
    assert!(adapter.inject_packet(outbound.clone()));
    let seen = tokio::time::timeout(STEP, harness.server_adapter.next_written())
        .await
        .unwrap();
    assert_eq!(seen, outbound);

    let inbound = ipv4(Ipv4Addr::new(93, 184, 216, 34), vip, b"world");
    assert!(harness.server_adapter.inject_packet(inbound.clone()));
    let delivered = tokio::time::timeout(STEP, adapter.next_written()).await.unwrap();
    assert_eq!(delivered, inbound);

    let stats = client.statistics();
    assert_eq!(stats.packets_sent, 1);
    assert_eq!(stats.packets_received, 1);
    assert!(stats.session_age.is_some());

    client.close();
    runner.await.unwrap().unwrap();
    assert_eq!(client.current_state(), ConnectionState::Closed);
    assert!(!client.is_connected());
    assert!(client.session().is_none());

    harness.stop().await;
}

#[tokio::test]
async fn test_bad_credentials_close_the_client() {
    let harness = Harness::start();
    let (client, _adapter) = harness.client(SERVER_ADDR, "looking-glass");

    let err = tokio::time::timeout(STEP, client.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Closed {
            reason: CloseReason::CredentialsRejected
        }
    ));
    assert_eq!(client.current_state(), ConnectionState::Closed);
    assert_eq!(harness.network.dial_count(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_tampered_frame_dropped_session_survives() {
    let harness = Harness::start();
    let tamper = Arc::new(AtomicBool::new(false));
    spawn_relay(&harness.network, "relay", Arc::clone(&tamper));

    let (client, adapter) = harness.client("relay", "wonderland");
    let runner = spawn_run(&client);
    wait_for_state(&client, ConnectionState::Tunneling).await;
    let vip = client.session().unwrap().virtual_address.inner();
    let remote = Ipv4Addr::new(1, 1, 1, 1);

    tamper.store(true, Ordering::Release);
    assert!(harness.server_adapter.inject_packet(ipv4(remote, vip, b"bent")));
    tokio::time::timeout(STEP, async {
        while client.statistics().auth_failures == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let intact = ipv4(remote, vip, b"straight");
    assert!(harness.server_adapter.inject_packet(intact.clone()));
    let delivered = tokio::time::timeout(STEP, adapter.next_written()).await.unwrap();
    assert_eq!(delivered, intact);

    let stats = client.statistics();
    assert_eq!(stats.auth_failures, 1);
    assert_eq!(stats.packets_received, 1);
    assert_eq!(client.current_state(), ConnectionState::Tunneling);

    client.close();
    runner.await.unwrap().unwrap();
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_lost_keepalive_degrades_then_reconnects() {
    let harness = Harness::start();
    let (client, _adapter) = harness.client(SERVER_ADDR, "wonderland");
    let runner = spawn_run(&client);
    let mut states = client.subscribe();

    states
        .wait_for(|s| *s == ConnectionState::Tunneling)
        .await
        .unwrap();
    harness.network.set_blackhole(true);

    states
        .wait_for(|s| *s == ConnectionState::Degraded)
        .await
        .unwrap();
    assert_eq!(client.machine_state().ledger.missed_count, 2);
    assert!(client.is_connected());

    states
        .wait_for(|s| *s == ConnectionState::Reconnecting)
        .await
        .unwrap();
    assert_eq!(client.machine_state().ledger.missed_count, 3);
    assert!(client.session().is_none());

    states
        .wait_for(|s| *s != ConnectionState::Reconnecting)
        .await
        .unwrap();
    let machine = client.machine_state();
    assert!(matches!(
        machine.phase,
        ConnectionState::Connecting | ConnectionState::Authenticating
    ));
    assert_eq!(machine.ledger.missed_count, 0);
    assert_eq!(harness.network.dial_count(), 2);
    assert_eq!(client.statistics().total_reconnects, 1);

    client.close();
    runner.await.unwrap().unwrap();
    harness.network.set_blackhole(false);
    harness.stop().await;
}
