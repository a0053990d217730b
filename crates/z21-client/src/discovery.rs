//! Broadcast discovery of Z21 stations on the local subnet.
//!
//! Stations answer a hardware-info request sent to the broadcast
//! address, so discovery is a probe plus a collection window. Replies
//! are deduplicated by source IP — a station answers from its own port,
//! not necessarily 21105.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use z21_core::error::{Error, Result};
use z21_core::DiscoveredStation;
use z21_proto::{builder, parse_datagram, Z21Message, Z21_PORT};

/// Probe the local subnet (255.255.255.255:21105) for stations.
pub async fn discover(timeout: Duration) -> Result<Vec<DiscoveredStation>> {
    let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), Z21_PORT);
    discover_at(target, timeout).await
}

/// Probe a specific target address.
///
/// This variant lets tests point the probe at a loopback station
/// instead of the broadcast address.
pub async fn discover_at(target: SocketAddr, timeout: Duration) -> Result<Vec<DiscoveredStation>> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| Error::Transport(format!("failed to bind discovery socket: {e}")))?;
    socket
        .set_broadcast(true)
        .map_err(|e| Error::Transport(format!("failed to enable broadcast: {e}")))?;

    tracing::debug!(target = %target, "sending discovery probe");
    socket
        .send_to(&builder::hardware_info_request(), target)
        .await
        .map_err(Error::Io)?;

    let mut stations: HashMap<IpAddr, DiscoveredStation> = HashMap::new();
    let mut buf = [0u8; 2048];
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, src))) => {
                if n < 8 {
                    continue;
                }
                for msg in parse_datagram(&buf[..n]) {
                    if let Z21Message::HardwareInfo(hardware_info) = msg {
                        tracing::debug!(ip = %src.ip(), hardware = %hardware_info, "discovered station");
                        stations.entry(src.ip()).or_insert(DiscoveredStation {
                            ip: src.ip(),
                            hardware_info,
                        });
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::trace!(error = %e, "discovery recv error");
            }
            Err(_) => break,
        }
    }

    tracing::debug!(count = stations.len(), "discovery complete");
    Ok(stations.into_values().collect())
}
