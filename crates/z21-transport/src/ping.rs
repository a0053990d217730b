//! ICMP echo implementation of the [`LivenessProbe`] seam.
//!
//! The Z21 answers ICMP echo even when its UDP service is wedged, so the
//! connect preflight and the watchdog both probe with a real ping rather
//! than a UDP round trip. Raw ICMP sockets need elevated privileges on
//! most systems; a probe failure for any reason — permission, route,
//! timeout — reports the host as unreachable rather than erroring.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use z21_core::link::LivenessProbe;

/// ICMP echo probe backed by `surge-ping`.
#[derive(Debug, Default)]
pub struct IcmpProbe;

#[async_trait]
impl LivenessProbe for IcmpProbe {
    async fn probe(&self, target: IpAddr, timeout: Duration) -> bool {
        let payload = [0u8; 16];
        match tokio::time::timeout(timeout, surge_ping::ping(target, &payload)).await {
            Ok(Ok((_packet, rtt))) => {
                tracing::debug!(target = %target, rtt_ms = rtt.as_millis() as u64, "Ping reply");
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(target = %target, error = %e, "Ping failed");
                false
            }
            Err(_) => {
                tracing::debug!(target = %target, timeout_ms = timeout.as_millis() as u64, "Ping timed out");
                false
            }
        }
    }
}
