//! z21-proto: Z21 LAN wire codec.
//!
//! Pure byte-level encoding and decoding of the Z21 LAN protocol
//! (2023-11-06 specification, v1.13). No sockets, no timers, no session
//! state — the builders turn typed arguments into frames and the parser
//! turns datagrams into [`Z21Message`] values. Everything network-facing
//! lives in `z21-transport` and `z21-client`.
//!
//! # Frame format
//!
//! ```text
//! <len u16 LE> <header u16 LE> [<payload>...]
//! ```
//!
//! Header `0x0040` wraps an X-Bus sub-message: the payload starts with an
//! X-header byte and ends with an XOR checksum. A single UDP datagram may
//! carry several frames.

pub mod builder;
pub mod parser;
pub mod speed;
pub mod wire;

pub use parser::{parse_datagram, Z21Message};
pub use wire::Z21_PORT;
