//! A scripted command station on a loopback UDP socket.
//!
//! [`MockStation`] binds `127.0.0.1:0` and answers the request/response
//! part of the protocol the way real hardware does, so session-level
//! integration tests can run a full connect handshake against it. Every
//! received frame is recorded; unsolicited broadcasts can be pushed to
//! the most recent client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use z21_core::error::{Error, Result};
use z21_proto::wire;

/// Identity and behavior of the scripted station.
#[derive(Debug, Clone)]
pub struct MockStationConfig {
    /// Raw hardware id reported by the hardware-info reply.
    pub hardware_type: u32,
    /// BCD firmware word reported by the hardware-info reply.
    pub firmware: u32,
    /// Serial number.
    pub serial: u32,
    /// Feature-lock code byte.
    pub code: u8,
    /// When set, every request is recorded but never answered. Used for
    /// handshake-timeout tests.
    pub silent: bool,
}

impl Default for MockStationConfig {
    fn default() -> Self {
        MockStationConfig {
            hardware_type: 0x0000_0201, // black Z21 (2013)
            firmware: 0x0000_0143,
            serial: 123_456,
            code: 0x00,
            silent: false,
        }
    }
}

struct Inner {
    config: MockStationConfig,
    received: Mutex<Vec<Vec<u8>>>,
    last_client: Mutex<Option<SocketAddr>>,
    flag_sets: AtomicUsize,
}

/// Scripted loopback command station.
pub struct MockStation {
    addr: SocketAddr,
    socket: Arc<UdpSocket>,
    inner: Arc<Inner>,
    task: JoinHandle<()>,
}

impl MockStation {
    /// Start a station with the default identity.
    pub async fn start() -> Result<Self> {
        Self::start_with(MockStationConfig::default()).await
    }

    /// Start a station that records requests but never answers.
    pub async fn start_silent() -> Result<Self> {
        Self::start_with(MockStationConfig {
            silent: true,
            ..MockStationConfig::default()
        })
        .await
    }

    /// Start a station with a custom identity.
    pub async fn start_with(config: MockStationConfig) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("mock station bind failed: {e}")))?;
        let addr = socket.local_addr().map_err(Error::Io)?;
        let socket = Arc::new(socket);

        let inner = Arc::new(Inner {
            config,
            received: Mutex::new(Vec::new()),
            last_client: Mutex::new(None),
            flag_sets: AtomicUsize::new(0),
        });

        let task = tokio::spawn(serve(Arc::clone(&socket), Arc::clone(&inner)));

        Ok(MockStation {
            addr,
            socket,
            inner,
            task,
        })
    }

    /// Address the station listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// UDP port the station listens on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Snapshot of every frame received so far (datagrams split into
    /// frames).
    pub async fn received(&self) -> Vec<Vec<u8>> {
        self.inner.received.lock().await.clone()
    }

    /// How many LAN_SET_BROADCASTFLAGS frames arrived.
    pub fn flag_set_count(&self) -> usize {
        self.inner.flag_sets.load(Ordering::SeqCst)
    }

    /// Send an unsolicited datagram to the most recent client.
    pub async fn push(&self, datagram: &[u8]) -> Result<()> {
        let client = (*self.inner.last_client.lock().await).ok_or(Error::NotConnected)?;
        self.socket
            .send_to(datagram, client)
            .await
            .map_err(Error::Io)?;
        Ok(())
    }

    /// Stop serving.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for MockStation {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(socket: Arc<UdpSocket>, inner: Arc<Inner>) {
    let mut buf = [0u8; 2048];
    loop {
        let (n, src) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::trace!(error = %e, "mock station recv error");
                continue;
            }
        };
        *inner.last_client.lock().await = Some(src);

        // Split the datagram into frames the same way the client parser
        // does, reply per frame.
        let mut rest = &buf[..n];
        while rest.len() >= 4 {
            let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
            if len < 4 || len > rest.len() {
                break;
            }
            let frame = &rest[..len];
            inner.received.lock().await.push(frame.to_vec());
            if !inner.config.silent {
                for reply in respond(frame, &inner) {
                    let _ = socket.send_to(&reply, src).await;
                }
            }
            rest = &rest[len..];
        }
    }
}

/// Scripted replies per request frame, mirroring real hardware.
fn respond(frame: &[u8], inner: &Inner) -> Vec<Vec<u8>> {
    let config = &inner.config;
    let header = u16::from_le_bytes([frame[2], frame[3]]);
    match header {
        wire::HEADER_SERIAL_NUMBER => {
            vec![wire::frame(
                wire::HEADER_SERIAL_NUMBER,
                &config.serial.to_le_bytes(),
            )]
        }
        wire::HEADER_CODE => vec![wire::frame(wire::HEADER_CODE, &[config.code])],
        wire::HEADER_HWINFO => {
            let mut payload = Vec::with_capacity(8);
            payload.extend_from_slice(&config.hardware_type.to_le_bytes());
            payload.extend_from_slice(&config.firmware.to_le_bytes());
            vec![wire::frame(wire::HEADER_HWINFO, &payload)]
        }
        wire::HEADER_SET_BROADCASTFLAGS => {
            inner.flag_sets.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
        wire::HEADER_GET_BROADCASTFLAGS => {
            vec![wire::frame(wire::HEADER_GET_BROADCASTFLAGS, &[0, 0, 0, 0])]
        }
        wire::HEADER_SYSTEMSTATE_GETDATA => vec![system_state_reply()],
        wire::HEADER_XBUS => match frame.get(4) {
            Some(&wire::X_SET_TRACK_POWER) => {
                let db0 = frame.get(5).copied().unwrap_or(0x80) & 0x01;
                vec![wire::xbus_frame(&[wire::X_STATUS, db0])]
            }
            Some(&wire::X_GET_FIRMWARE_VERSION) => {
                let major = (config.firmware >> 8) as u8;
                let minor = config.firmware as u8;
                vec![wire::xbus_frame(&[wire::X_FIRMWARE_VERSION, 0x0A, major, minor])]
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn system_state_reply() -> Vec<u8> {
    let mut payload = Vec::with_capacity(16);
    for value in [850i16, 0, 820, 30, 18_000, 16_500] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    // central state, central state ex, reserved, capabilities
    payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x79]);
    wire::frame(wire::HEADER_SYSTEMSTATE_DATACHANGED, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn answers_serial_number_request() {
        let station = MockStation::start().await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        socket
            .send_to(&[0x04, 0x00, 0x10, 0x00], station.addr())
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], &[0x08, 0x00, 0x10, 0x00, 0x40, 0xE2, 0x01, 0x00]);
    }

    #[tokio::test]
    async fn silent_station_records_but_never_replies() {
        let station = MockStation::start_silent().await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        socket
            .send_to(&[0x04, 0x00, 0x1A, 0x00], station.addr())
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let reply = tokio::time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await;
        assert!(reply.is_err(), "silent station must not reply");

        // Give the station loop a moment to record.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(station.received().await, vec![vec![0x04, 0x00, 0x1A, 0x00]]);
    }

    #[tokio::test]
    async fn counts_broadcast_flag_sets() {
        let station = MockStation::start().await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        socket
            .send_to(
                &[0x08, 0x00, 0x50, 0x00, 0x01, 0x01, 0x00, 0x00],
                station.addr(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(station.flag_set_count(), 1);
    }

    #[tokio::test]
    async fn pushes_to_last_client() {
        let station = MockStation::start().await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // Any datagram registers the client.
        socket
            .send_to(&[0x04, 0x00, 0x10, 0x00], station.addr())
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let _ = socket.recv_from(&mut buf).await.unwrap();

        station
            .push(&[0x07, 0x00, 0x40, 0x00, 0x61, 0x00, 0x61])
            .await
            .unwrap();
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], &[0x07, 0x00, 0x40, 0x00, 0x61, 0x00, 0x61]);
    }
}
