// ============================================
// File: crates/burrow-server/src/services/ip_pool.rs
// ============================================
//! # Virtual Address Pool
//!
//! ## Creation Reason
//! Hands out tunnel addresses so that no two live sessions ever share
//! one.
//!
//! ## Allocation Strategy
//! - Network address, broadcast address and gateway are reserved
//! - Next-fit from a rotating cursor so a just-released address is not
//!   immediately handed to the next client
//! - O(n) allocation, O(1) release
//!
//! ```text
//!  10.8.0.0  10.8.0.1  10.8.0.2  10.8.0.3  ...  10.8.0.254  10.8.0.255
//!  network   gateway   ◄──────── client addresses ────────►  broadcast
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only the session store allocates and releases; anything else
//!   racing it would break address uniqueness
//!
//! ## Last Modified
//! v0.1.0 - Initial address pool

use std::collections::HashSet;
use std::net::Ipv4Addr;

use parking_lot::Mutex;
use tracing::{debug, warn};

use burrow_common::VirtualIp;

use crate::error::{Result, ServerError};

#[derive(Debug)]
struct PoolState {
    allocated: HashSet<VirtualIp>,
    /// Offset where the next search starts.
    cursor: u32,
}

/// Virtual address pool.
pub struct IpPool {
    network: Ipv4Addr,
    prefix_len: u8,
    gateway: Ipv4Addr,
    first_usable: u32,
    last_usable: u32,
    state: Mutex<PoolState>,
}

impl IpPool {
    /// Creates a pool over `network/prefix_len`, reserving `gateway`.
    ///
    /// # Errors
    /// `ConfigInvalid` if the prefix leaves no client addresses or the
    /// gateway lies outside the range.
    pub fn new(network: Ipv4Addr, prefix_len: u8, gateway: Ipv4Addr) -> Result<Self> {
        if prefix_len > 30 {
            return Err(ServerError::config_invalid(
                "tunnel.ip_range",
                "prefix length must be <= 30 for usable addresses",
            ));
        }

        let total = 1u32 << (32 - u32::from(prefix_len));
        let mask = !(total - 1);
        let network = Ipv4Addr::from(u32::from(network) & mask);
        let gateway_offset = u32::from(gateway).wrapping_sub(u32::from(network));
        if gateway_offset >= total {
            return Err(ServerError::config_invalid(
                "tunnel.gateway_ip",
                "gateway address is not in network range",
            ));
        }

        let pool = Self {
            network,
            prefix_len,
            gateway,
            first_usable: 1,
            last_usable: total - 2,
            state: Mutex::new(PoolState {
                allocated: HashSet::new(),
                cursor: 1,
            }),
        };
        debug!(
            range = %format!("{network}/{prefix_len}"),
            gateway = %gateway,
            capacity = pool.capacity(),
            "Address pool initialized"
        );
        Ok(pool)
    }

    /// Allocates a free address.
    ///
    /// # Errors
    /// `PoolExhausted` if every address is taken.
    pub fn allocate(&self) -> Result<VirtualIp> {
        let mut state = self.state.lock();
        let span = self.last_usable - self.first_usable + 1;
        let base = u32::from(self.network);

        for step in 0..span {
            let offset = self.first_usable + (state.cursor - self.first_usable + step) % span;
            let vip = VirtualIp::new(Ipv4Addr::from(base + offset));
            if vip.inner() == self.gateway || state.allocated.contains(&vip) {
                continue;
            }
            state.allocated.insert(vip);
            state.cursor = if offset == self.last_usable {
                self.first_usable
            } else {
                offset + 1
            };
            debug!(virtual_ip = %vip, in_use = state.allocated.len(), "Address allocated");
            return Ok(vip);
        }

        warn!(in_use = state.allocated.len(), "Address pool exhausted");
        Err(ServerError::PoolExhausted)
    }

    /// Returns an address to the pool.
    ///
    /// Returns `false` if it was not allocated.
    pub fn release(&self, vip: VirtualIp) -> bool {
        let mut state = self.state.lock();
        let removed = state.allocated.remove(&vip);
        if removed {
            debug!(virtual_ip = %vip, in_use = state.allocated.len(), "Address released");
        } else {
            warn!(virtual_ip = %vip, "Release of unallocated address");
        }
        removed
    }

    /// Whether `vip` is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, vip: VirtualIp) -> bool {
        self.state.lock().allocated.contains(&vip)
    }

    /// Addresses in use.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.state.lock().allocated.len()
    }

    /// Addresses that can be handed out in total.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let usable = (self.last_usable - self.first_usable + 1) as usize;
        if self.contains_offset(u32::from(self.gateway).wrapping_sub(u32::from(self.network))) {
            usable - 1
        } else {
            usable
        }
    }

    /// Free addresses.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.capacity().saturating_sub(self.allocated_count())
    }

    /// Gateway address.
    #[must_use]
    pub const fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// Whether `ip` is a client address of this pool.
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        ip != self.gateway && self.contains_offset(u32::from(ip).wrapping_sub(u32::from(self.network)))
    }

    fn contains_offset(&self, offset: u32) -> bool {
        (self.first_usable..=self.last_usable).contains(&offset)
    }
}

impl std::fmt::Debug for IpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpPool")
            .field("network", &format!("{}/{}", self.network, self.prefix_len))
            .field("gateway", &self.gateway)
            .field("allocated", &self.allocated_count())
            .field("capacity", &self.capacity())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> IpPool {
        IpPool::new(Ipv4Addr::new(10, 8, 0, 0), 24, Ipv4Addr::new(10, 8, 0, 1)).unwrap()
    }

    fn vip(last: u8) -> VirtualIp {
        VirtualIp::new(Ipv4Addr::new(10, 8, 0, last))
    }

    #[test]
    fn test_first_allocations_start_after_gateway() {
        let pool = pool();
        assert_eq!(pool.capacity(), 253);
        assert_eq!(pool.allocate().unwrap(), vip(2));
        assert_eq!(pool.allocate().unwrap(), vip(3));
        assert_eq!(pool.allocated_count(), 2);
        assert_eq!(pool.available_count(), 251);
    }

    #[test]
    fn test_release_and_reuse() {
        let pool = pool();
        let a = pool.allocate().unwrap();
        assert!(pool.release(a));
        assert!(!pool.is_allocated(a));
        assert!(!pool.release(a));

        // Next-fit: the released address is not reused right away.
        assert_eq!(pool.allocate().unwrap(), vip(3));
    }

    #[test]
    fn test_exhaustion_and_wraparound() {
        let pool = IpPool::new(Ipv4Addr::new(10, 0, 0, 0), 29, Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        // /29: .1 gateway, .2-.6 usable
        let got: Vec<_> = (0..5).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(got.len(), 5);
        assert!(matches!(pool.allocate(), Err(ServerError::PoolExhausted)));

        pool.release(got[1]);
        assert_eq!(pool.allocate().unwrap(), got[1]);
    }

    #[test]
    fn test_contains() {
        let pool = pool();
        assert!(pool.contains(Ipv4Addr::new(10, 8, 0, 2)));
        assert!(pool.contains(Ipv4Addr::new(10, 8, 0, 254)));
        assert!(!pool.contains(Ipv4Addr::new(10, 8, 0, 1)));
        assert!(!pool.contains(Ipv4Addr::new(10, 8, 0, 255)));
        assert!(!pool.contains(Ipv4Addr::new(10, 8, 1, 2)));
    }

    #[test]
    fn test_invalid_construction() {
        assert!(IpPool::new(Ipv4Addr::new(10, 0, 0, 0), 31, Ipv4Addr::new(10, 0, 0, 1)).is_err());
        assert!(IpPool::new(Ipv4Addr::new(10, 0, 0, 0), 24, Ipv4Addr::new(192, 168, 0, 1)).is_err());
    }
}
