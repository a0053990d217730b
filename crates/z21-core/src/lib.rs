//! z21-core: Core types, events, errors, and transport seams for the z21
//! workspace.
//!
//! This crate defines the station-agnostic abstractions the rest of the
//! workspace builds on. Applications depend on these types without pulling
//! in the codec or the network stack.
//!
//! # Key types
//!
//! - [`Z21Event`] / [`EventGroup`] -- asynchronous station notifications
//! - [`DatagramLink`] / [`LinkFactory`] -- the UDP seam
//! - [`LivenessProbe`] -- the ICMP echo seam
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod link;
pub mod types;

// Re-export key types at crate root for ergonomic `use z21_core::*`.
pub use error::{Error, Result};
pub use events::{EventGroup, Z21Event};
pub use link::{DatagramLink, LinkFactory, LivenessProbe};
pub use types::*;
