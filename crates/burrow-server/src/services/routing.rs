// ============================================
// File: crates/burrow-server/src/services/routing.rs
// ============================================
//! # Routing Table
//!
//! ## Creation Reason
//! Maps virtual addresses to the inbox of the session worker owning
//! them, so the single adapter reader can hand each packet to the right
//! session without touching its cipher.
//!
//! ## Routing Table Structure
//! ```text
//! ┌─────────────────┬───────────────────┬──────────────────────┐
//! │  Virtual IP     │  Session token    │  Worker inbox        │
//! ├─────────────────┼───────────────────┼──────────────────────┤
//! │  10.8.0.2       │  q83vEj...        │  mpsc::Sender<Bytes> │
//! │  10.8.0.3       │  3q2+7w...        │  mpsc::Sender<Bytes> │
//! └─────────────────┴───────────────────┴──────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Removal is keyed by address *and* token so a stale worker cannot
//!   remove the route of a newer session that reused the address
//! - Dispatch never blocks; a full inbox drops the packet
//!
//! ## Last Modified
//! v0.1.0 - Initial routing table

use std::net::Ipv4Addr;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use burrow_common::{SessionToken, VirtualIp};

/// Offset of the destination address in an IPv4 header.
const IPV4_DST_OFFSET: usize = 16;

/// Minimum IPv4 header length.
const IPV4_MIN_HEADER: usize = 20;

/// Extracts the destination of an IPv4 packet.
#[must_use]
pub fn ipv4_destination(packet: &[u8]) -> Option<Ipv4Addr> {
    if packet.len() < IPV4_MIN_HEADER || packet[0] >> 4 != 4 {
        return None;
    }
    let dst: [u8; 4] = packet[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4].try_into().ok()?;
    Some(Ipv4Addr::from(dst))
}

/// Extracts the source of an IPv4 packet.
#[must_use]
pub fn ipv4_source(packet: &[u8]) -> Option<Ipv4Addr> {
    if packet.len() < IPV4_MIN_HEADER || packet[0] >> 4 != 4 {
        return None;
    }
    let src: [u8; 4] = packet[12..16].try_into().ok()?;
    Some(Ipv4Addr::from(src))
}

/// Result of routing one adapter packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Queued for the owning worker.
    Delivered,
    /// Not an IPv4 packet.
    NotIpv4,
    /// No session owns the destination.
    NoRoute,
    /// Worker inbox full or gone.
    Dropped,
}

#[derive(Debug, Clone)]
struct Route {
    token: SessionToken,
    inbox: mpsc::Sender<Bytes>,
}

/// Virtual address to worker routing table.
#[derive(Default)]
pub struct RoutingTable {
    routes: DashMap<VirtualIp, Route>,
}

impl RoutingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the route for `vip`, replacing any previous one.
    pub fn add_route(&self, vip: VirtualIp, token: SessionToken, inbox: mpsc::Sender<Bytes>) {
        let previous = self.routes.insert(vip, Route { token, inbox });
        debug!(
            virtual_ip = %vip,
            session = %token,
            replaced = previous.is_some(),
            "Route added"
        );
    }

    /// Removes the route for `vip` if it still belongs to `token`.
    pub fn remove_route(&self, vip: VirtualIp, token: &SessionToken) -> bool {
        let removed = self
            .routes
            .remove_if(&vip, |_, route| route.token == *token)
            .is_some();
        if removed {
            debug!(virtual_ip = %vip, session = %token, "Route removed");
        }
        removed
    }

    /// Session owning `vip`.
    #[must_use]
    pub fn lookup(&self, vip: VirtualIp) -> Option<SessionToken> {
        self.routes.get(&vip).map(|r| r.token)
    }

    /// Hands an adapter packet to the worker owning its destination.
    pub fn dispatch(&self, packet: Bytes) -> Dispatch {
        let Some(dst) = ipv4_destination(&packet) else {
            return Dispatch::NotIpv4;
        };
        let inbox = match self.routes.get(&VirtualIp::new(dst)) {
            Some(route) => route.inbox.clone(),
            None => {
                trace!(destination = %dst, "No route");
                return Dispatch::NoRoute;
            }
        };
        match inbox.try_send(packet) {
            Ok(()) => Dispatch::Delivered,
            Err(_) => Dispatch::Dropped,
        }
    }

    /// Number of routes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("routes", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_packet(src: [u8; 4], dst: [u8; 4]) -> Bytes {
        let mut p = vec![0u8; 28];
        p[0] = 0x45;
        p[12..16].copy_from_slice(&src);
        p[16..20].copy_from_slice(&dst);
        Bytes::from(p)
    }

    fn vip(last: u8) -> VirtualIp {
        VirtualIp::new(Ipv4Addr::new(10, 8, 0, last))
    }

    #[test]
    fn test_header_parsing() {
        let p = ipv4_packet([10, 8, 0, 2], [1, 1, 1, 1]);
        assert_eq!(ipv4_source(&p), Some(Ipv4Addr::new(10, 8, 0, 2)));
        assert_eq!(ipv4_destination(&p), Some(Ipv4Addr::new(1, 1, 1, 1)));
        assert_eq!(ipv4_destination(&[0x60; 40]), None);
        assert_eq!(ipv4_destination(&[0x45; 10]), None);
    }

    #[tokio::test]
    async fn test_dispatch_to_owner() {
        let table = RoutingTable::new();
        let token = SessionToken::generate();
        let (tx, mut rx) = mpsc::channel(4);
        table.add_route(vip(2), token, tx);
        assert_eq!(table.lookup(vip(2)), Some(token));

        let packet = ipv4_packet([8, 8, 8, 8], [10, 8, 0, 2]);
        assert_eq!(table.dispatch(packet.clone()), Dispatch::Delivered);
        assert_eq!(rx.recv().await.unwrap(), packet);

        let stray = ipv4_packet([8, 8, 8, 8], [10, 8, 0, 9]);
        assert_eq!(table.dispatch(stray), Dispatch::NoRoute);
        assert_eq!(table.dispatch(Bytes::from_static(b"junk")), Dispatch::NotIpv4);
    }

    #[test]
    fn test_full_inbox_drops() {
        let table = RoutingTable::new();
        let (tx, _rx) = mpsc::channel(1);
        table.add_route(vip(3), SessionToken::generate(), tx);
        let packet = ipv4_packet([1, 1, 1, 1], [10, 8, 0, 3]);
        assert_eq!(table.dispatch(packet.clone()), Dispatch::Delivered);
        assert_eq!(table.dispatch(packet), Dispatch::Dropped);
    }

    #[test]
    fn test_stale_removal_ignored() {
        let table = RoutingTable::new();
        let old = SessionToken::generate();
        let new = SessionToken::generate();
        let (tx, _rx) = mpsc::channel(1);
        table.add_route(vip(4), old, tx.clone());
        table.add_route(vip(4), new, tx);

        assert!(!table.remove_route(vip(4), &old));
        assert_eq!(table.lookup(vip(4)), Some(new));
        assert!(table.remove_route(vip(4), &new));
        assert!(table.is_empty());
    }
}
