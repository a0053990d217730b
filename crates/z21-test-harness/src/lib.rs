//! z21-test-harness: test doubles for the z21 workspace.
//!
//! This crate provides [`memory_pair`] for deterministic unit testing of
//! the session core without sockets, [`StaticProbe`] for scripting the
//! liveness seam, and [`MockStation`] — a scripted command station on a
//! loopback UDP socket for full-handshake integration tests.

pub mod memory;
pub mod station;

pub use memory::{
    memory_pair, MemoryLink, MemoryLinkFactory, StaticProbe, StationHandle, SwitchProbe,
};
pub use station::{MockStation, MockStationConfig};
