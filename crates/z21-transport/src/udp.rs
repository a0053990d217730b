//! UDP implementation of the [`DatagramLink`] seam.
//!
//! A [`UdpLink`] is bound to one local port and targets one station
//! endpoint. Receiving stays unfiltered at the socket level — discovery
//! replies may come from a different source port — so the session layer
//! filters by source IP instead of connecting the socket.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;

use z21_core::error::{Error, Result};
use z21_core::link::{DatagramLink, LinkFactory};

/// UDP datagram link to a command station.
#[derive(Debug)]
pub struct UdpLink {
    /// The underlying UDP socket.
    socket: UdpSocket,
    /// Station endpoint all sends target.
    remote: SocketAddr,
    /// The local address the socket is bound to.
    local_addr: SocketAddr,
    /// Set once [`DatagramLink::close`] has been called.
    closed: AtomicBool,
}

impl UdpLink {
    /// Bind a socket on `local_port` (all interfaces) targeting `remote`.
    ///
    /// Port 0 lets the OS pick a free port; the Z21 convention is to use
    /// 21105 on both ends.
    pub async fn bind(local_port: u16, remote: SocketAddr) -> Result<Self> {
        let bind_addr = format!("0.0.0.0:{local_port}");
        tracing::debug!(addr = %bind_addr, remote = %remote, "Binding UDP link");

        let socket = UdpSocket::bind(&bind_addr).await.map_err(|e| {
            tracing::error!(addr = %bind_addr, error = %e, "Failed to bind UDP socket");
            Error::Transport(format!("failed to bind {bind_addr}: {e}"))
        })?;

        let local_addr = socket.local_addr().map_err(Error::Io)?;
        tracing::debug!(local = %local_addr, "UDP link bound");

        Ok(UdpLink {
            socket,
            remote,
            local_addr,
            closed: AtomicBool::new(false),
        })
    }

    /// The station endpoint this link targets.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

#[async_trait]
impl DatagramLink for UdpLink {
    async fn send(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }

        tracing::trace!(
            remote = %self.remote,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, self.remote).await.map_err(|e| {
            tracing::error!(remote = %self.remote, error = %e, "Failed to send datagram");
            Error::Io(e)
        })?;

        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }

        let (n, src) = self.socket.recv_from(buf).await.map_err(Error::Io)?;
        tracing::trace!(remote = %src, bytes = n, "Received datagram");
        Ok((n, src))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!(local = %self.local_addr, "UDP link closed");
        Ok(())
    }
}

/// Opens [`UdpLink`]s; the production [`LinkFactory`].
#[derive(Debug, Default)]
pub struct UdpLinkFactory;

#[async_trait]
impl LinkFactory for UdpLinkFactory {
    async fn open(&self, local_port: u16, remote: SocketAddr) -> Result<Arc<dyn DatagramLink>> {
        let link = UdpLink::bind(local_port, remote).await?;
        Ok(Arc::new(link))
    }
}
