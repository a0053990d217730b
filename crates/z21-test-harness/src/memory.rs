//! In-memory [`DatagramLink`] double.
//!
//! [`memory_pair`] wires a [`MemoryLinkFactory`] to a [`StationHandle`]:
//! the factory hands the session an in-memory link, and the handle lets
//! the test inject inbound datagrams and inspect everything the session
//! sent, with no sockets involved.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use z21_core::error::{Error, Result};
use z21_core::link::{DatagramLink, LinkFactory, LivenessProbe};

struct Shared {
    /// Datagrams travelling station -> client.
    to_client_tx: mpsc::UnboundedSender<Vec<u8>>,
    to_client_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// Datagrams travelling client -> station.
    from_client_tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Create a factory/handle pair sharing one in-memory channel.
///
/// The factory can open any number of links over the session's lifetime
/// (reconnect tests); they all drain the same channel.
pub fn memory_pair() -> (MemoryLinkFactory, StationHandle) {
    let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
    let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();

    let shared = Arc::new(Shared {
        to_client_tx: to_client_tx.clone(),
        to_client_rx: Mutex::new(to_client_rx),
        from_client_tx,
    });

    (
        MemoryLinkFactory { shared },
        StationHandle {
            to_client_tx,
            from_client_rx,
        },
    )
}

/// In-memory datagram link handed out by [`MemoryLinkFactory`].
pub struct MemoryLink {
    shared: Arc<Shared>,
    /// Address the pretend station "sends" from; inbound datagrams are
    /// stamped with it so session-side source filtering passes.
    remote: SocketAddr,
    closed: AtomicBool,
}

#[async_trait]
impl DatagramLink for MemoryLink {
    async fn send(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.shared
            .from_client_tx
            .send(data.to_vec())
            .map_err(|_| Error::Transport("station handle dropped".into()))
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let mut rx = self.shared.to_client_rx.lock().await;
        match rx.recv().await {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok((n, self.remote))
            }
            None => Err(Error::NotConnected),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 21105)))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`MemoryLink`]s wired to one [`StationHandle`].
pub struct MemoryLinkFactory {
    shared: Arc<Shared>,
}

#[async_trait]
impl LinkFactory for MemoryLinkFactory {
    async fn open(&self, _local_port: u16, remote: SocketAddr) -> Result<Arc<dyn DatagramLink>> {
        Ok(Arc::new(MemoryLink {
            shared: Arc::clone(&self.shared),
            remote,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Test-side controller for the in-memory channel.
pub struct StationHandle {
    to_client_tx: mpsc::UnboundedSender<Vec<u8>>,
    from_client_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl StationHandle {
    /// Deliver a datagram to the session as if the station sent it.
    pub fn inject(&self, datagram: &[u8]) {
        let _ = self.to_client_tx.send(datagram.to_vec());
    }

    /// Await the next datagram the session sent.
    pub async fn sent(&mut self) -> Option<Vec<u8>> {
        self.from_client_rx.recv().await
    }

    /// Drain every already-sent datagram without waiting.
    pub fn drain_sent(&mut self) -> Vec<Vec<u8>> {
        let mut sent = Vec::new();
        while let Ok(datagram) = self.from_client_rx.try_recv() {
            sent.push(datagram);
        }
        sent
    }
}

/// [`LivenessProbe`] double answering a fixed verdict.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

#[async_trait]
impl LivenessProbe for StaticProbe {
    async fn probe(&self, _target: std::net::IpAddr, _timeout: std::time::Duration) -> bool {
        self.0
    }
}

/// [`LivenessProbe`] double whose verdict can be flipped mid-test, e.g.
/// to let a connect succeed and then starve the watchdog.
#[derive(Debug, Clone, Default)]
pub struct SwitchProbe {
    verdict: Arc<AtomicBool>,
}

impl SwitchProbe {
    /// Create a probe with an initial verdict.
    pub fn new(initial: bool) -> Self {
        SwitchProbe {
            verdict: Arc::new(AtomicBool::new(initial)),
        }
    }

    /// Change the verdict for all future probes.
    pub fn set(&self, verdict: bool) {
        self.verdict.store(verdict, Ordering::SeqCst);
    }
}

#[async_trait]
impl LivenessProbe for SwitchProbe {
    async fn probe(&self, _target: std::net::IpAddr, _timeout: std::time::Duration) -> bool {
        self.verdict.load(Ordering::SeqCst)
    }
}
