// ============================================
// File: crates/burrow-transport/src/adapter/linux.rs
// ============================================
//! # Linux TUN Adapter
//!
//! ## Creation Reason
//! Attaches to a TUN interface through `/dev/net/tun` and moves raw IP
//! packets with Tokio's `AsyncFd`.
//!
//! ## Attach Sequence
//! 1. Open `/dev/net/tun`
//! 2. `TUNSETIFF` with `IFF_TUN | IFF_NO_PI` and the interface name
//! 3. Switch the descriptor to non-blocking
//! 4. Register with the reactor
//!
//! Addressing, routes and link state belong to external tooling (for
//! example a pre-created persistent interface); nothing here runs `ip`.
//!
//! ## Required Capabilities
//! - `CAP_NET_ADMIN`, or an interface owned by the running user
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always keep `IFF_NO_PI`; the engine expects bare IP packets
//! - Interface names are limited to 15 bytes
//!
//! ## Last Modified
//! v0.1.0 - Initial TUN attach adapter

#![cfg(target_os = "linux")]

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use nix::libc;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::VirtualAdapter;

// ============================================
// Constants
// ============================================

/// Path to the TUN clone device.
const TUN_DEVICE_PATH: &str = "/dev/net/tun";

/// TUN device (no Ethernet headers).
const IFF_TUN: libc::c_short = 0x0001;

/// Do not prepend packet information.
const IFF_NO_PI: libc::c_short = 0x1000;

/// TUNSETIFF ioctl number.
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

/// Extra room read beyond the MTU so oversized packets are seen whole.
const READ_HEADROOM: usize = 64;

// ============================================
// ifreq
// ============================================

#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_flags: libc::c_short,
    _padding: [u8; 22],
}

impl IfReq {
    fn new(name: &str, flags: libc::c_short) -> Self {
        let mut ifr = Self {
            ifr_name: [0; libc::IFNAMSIZ],
            ifr_flags: flags,
            _padding: [0; 22],
        };
        let copy_len = name.len().min(libc::IFNAMSIZ - 1);
        for (slot, &byte) in ifr.ifr_name.iter_mut().zip(&name.as_bytes()[..copy_len]) {
            *slot = byte as libc::c_char;
        }
        ifr
    }

    fn name(&self) -> String {
        let bytes: Vec<u8> = self
            .ifr_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

// ============================================
// TunAdapter
// ============================================

/// Virtual adapter backed by a Linux TUN interface.
#[derive(Debug)]
pub struct TunAdapter {
    fd: AsyncFd<File>,
    name: String,
    mtu: u16,
}

impl TunAdapter {
    /// Attaches to the TUN interface `name`.
    ///
    /// # Errors
    /// - `PermissionDenied`: `/dev/net/tun` cannot be opened
    /// - `AdapterAttachFailed`: the ioctl or descriptor setup failed
    pub fn attach(name: &str, mtu: u16) -> Result<Self> {
        if name.is_empty() || name.len() >= libc::IFNAMSIZ {
            return Err(TransportError::invalid_config(
                "adapter.name",
                format!("must be 1..{} bytes", libc::IFNAMSIZ),
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(TUN_DEVICE_PATH)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    TransportError::PermissionDenied {
                        operation: format!("open {TUN_DEVICE_PATH}"),
                    }
                } else {
                    TransportError::attach_failed(name, e.to_string())
                }
            })?;
        let raw = file.as_raw_fd();

        let mut ifr = IfReq::new(name, IFF_TUN | IFF_NO_PI);
        // SAFETY: `raw` is an open descriptor and `ifr` outlives the call.
        let rc = unsafe { libc::ioctl(raw, TUNSETIFF, &mut ifr) };
        if rc < 0 {
            return Err(TransportError::attach_failed(
                name,
                format!("TUNSETIFF failed: {}", std::io::Error::last_os_error()),
            ));
        }

        // SAFETY: plain fcntl on a descriptor we own.
        let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
        // SAFETY: as above.
        if flags < 0 || unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(TransportError::attach_failed(
                name,
                "failed to set non-blocking mode",
            ));
        }

        let fd = register(file, name)?;
        let name = ifr.name();
        info!(adapter = %name, mtu, "Attached to TUN interface");
        Ok(Self { fd, name, mtu })
    }
}

#[async_trait]
impl VirtualAdapter for TunAdapter {
    async fn read_packet(&self) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(usize::from(self.mtu) + READ_HEADROOM);
        loop {
            let mut guard = self
                .fd
                .ready(Interest::READABLE)
                .await
                .map_err(|e| TransportError::AdapterReadFailed {
                    reason: e.to_string(),
                })?;

            match guard.try_io(|inner| {
                let raw = inner.get_ref().as_raw_fd();
                // SAFETY: `buf` is valid for `buf.len()` bytes of writes.
                let n = unsafe { libc::read(raw, buf.as_mut_ptr().cast(), buf.len()) };
                usize::try_from(n).map_err(|_| std::io::Error::last_os_error())
            }) {
                Ok(Ok(len)) => {
                    buf.truncate(len);
                    return Ok(buf.freeze());
                }
                Ok(Err(e)) => {
                    return Err(TransportError::AdapterReadFailed {
                        reason: e.to_string(),
                    })
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn write_packet(&self, packet: &[u8]) -> Result<()> {
        loop {
            let mut guard = self
                .fd
                .ready(Interest::WRITABLE)
                .await
                .map_err(|e| TransportError::AdapterWriteFailed {
                    reason: e.to_string(),
                })?;

            match guard.try_io(|inner| {
                let raw = inner.get_ref().as_raw_fd();
                // SAFETY: `packet` is valid for `packet.len()` bytes of reads.
                let n = unsafe { libc::write(raw, packet.as_ptr().cast(), packet.len()) };
                usize::try_from(n).map_err(|_| std::io::Error::last_os_error())
            }) {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => {
                    return Err(TransportError::AdapterWriteFailed {
                        reason: e.to_string(),
                    })
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mtu(&self) -> u16 {
        self.mtu
    }
}

/// Registers a non-blocking descriptor with the reactor for both
/// directions.
fn register(file: File, name: &str) -> Result<AsyncFd<File>> {
    AsyncFd::with_interest(file, Interest::READABLE | Interest::WRITABLE)
        .map_err(|e| TransportError::attach_failed(name, format!("reactor registration: {e}")))
}

impl Drop for TunAdapter {
    fn drop(&mut self) {
        debug!(adapter = %self.name, "Detaching from TUN interface");
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    // Attaching needs CAP_NET_ADMIN; only the pure parts are tested here.

    #[test]
    fn test_ifreq_name_and_flags() {
        let ifr = IfReq::new("burrow0", IFF_TUN | IFF_NO_PI);
        assert_eq!(ifr.name(), "burrow0");
        assert_eq!(ifr.ifr_flags, IFF_TUN | IFF_NO_PI);
    }

    #[test]
    fn test_ifreq_truncates_long_names() {
        let ifr = IfReq::new(&"a".repeat(20), 0);
        assert_eq!(ifr.name().len(), libc::IFNAMSIZ - 1);
    }

    #[tokio::test]
    async fn test_registered_descriptor_reports_readiness() {
        use std::io::Write;
        use std::os::fd::OwnedFd;
        use std::os::unix::net::UnixStream;

        let (near, mut far) = UnixStream::pair().unwrap();
        near.set_nonblocking(true).unwrap();
        let fd = register(File::from(OwnedFd::from(near)), "pair").unwrap();

        drop(fd.writable().await.unwrap());
        far.write_all(b"x").unwrap();
        let guard = fd.readable().await.unwrap();
        assert!(guard.ready().is_readable());
    }

    #[test]
    fn test_attach_rejects_bad_names() {
        assert!(matches!(
            TunAdapter::attach("", 1420),
            Err(TransportError::InvalidConfig { .. })
        ));
        assert!(matches!(
            TunAdapter::attach(&"x".repeat(16), 1420),
            Err(TransportError::InvalidConfig { .. })
        ));
    }
}
