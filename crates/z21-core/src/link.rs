//! Transport seams for the session core.
//!
//! The [`DatagramLink`] trait abstracts the UDP socket to the command
//! station. The session core operates on a `dyn DatagramLink`, enabling
//! both real network control and deterministic unit testing with the
//! in-memory link from the `z21-test-harness` crate.
//!
//! [`LivenessProbe`] abstracts the ICMP echo used before connecting and by
//! the watchdog; raw-socket ping needs privileges that unit tests do not
//! have, so it sits behind the same kind of seam.

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous datagram channel to a command station.
///
/// A link is bound to one local port and one remote endpoint. `send`
/// always targets the remote; `recv_from` reports the actual source so
/// the session can filter by station IP (the source port may differ on
/// broadcast replies).
#[async_trait]
pub trait DatagramLink: Send + Sync {
    /// Send one datagram to the remote endpoint.
    async fn send(&self, data: &[u8]) -> Result<()>;

    /// Receive one datagram. Waits until a datagram arrives or the link
    /// is closed; returns the byte count and the source address.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// The local address the link is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Close the link. Pending and subsequent receives fail with
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&self) -> Result<()>;
}

/// Opens [`DatagramLink`]s.
///
/// The session asks the factory for a fresh link on every connect, so a
/// test can hand out pre-wired in-memory links while production code
/// binds real UDP sockets.
#[async_trait]
pub trait LinkFactory: Send + Sync {
    /// Open a link bound to `local_port` and targeting `remote`.
    async fn open(&self, local_port: u16, remote: SocketAddr) -> Result<Arc<dyn DatagramLink>>;
}

/// Host liveness check used before connecting and by the watchdog.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Whether `target` answered an echo within `timeout`.
    async fn probe(&self, target: IpAddr, timeout: Duration) -> bool;
}
