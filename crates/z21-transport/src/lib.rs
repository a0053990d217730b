//! z21-transport: network implementations of the `z21-core` seams.
//!
//! - [`UdpLink`] / [`UdpLinkFactory`] -- the real UDP datagram link
//! - [`IcmpProbe`] -- ICMP echo liveness probe
//!
//! The session core in `z21-client` only sees the trait objects, so these
//! types are swappable for the in-memory doubles in `z21-test-harness`.

pub mod ping;
pub mod udp;

pub use ping::IcmpProbe;
pub use udp::{UdpLink, UdpLinkFactory};
