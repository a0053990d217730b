//! # z21 -- Z21 LAN client for model railway control
//!
//! `z21` is an asynchronous Rust library for driving Roco/Fleischmann
//! digital command stations (z21, z21start, Z21, Z21 XL and the booster
//! and decoder family) over their UDP LAN protocol. It is built for
//! throttle applications, layout automation, and feedback monitoring
//! where reliable low-latency station control is essential.
//!
//! ## Quick Start
//!
//! Add `z21` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! z21 = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to a station and drive a loco:
//!
//! ```no_run
//! use z21::{DecoderMode, Direction, LocoAddress, NativeSpeedSteps, Z21Client};
//!
//! #[tokio::main]
//! async fn main() -> z21::Result<()> {
//!     let client = Z21Client::new();
//!     client.connect("192.168.0.111", None).await?;
//!
//!     client.set_track_power_on().await?;
//!     client
//!         .set_loco_drive(
//!             LocoAddress::new(3),
//!             40,
//!             NativeSpeedSteps::Steps128,
//!             Direction::Forward,
//!             DecoderMode::Dcc,
//!         )
//!         .await?;
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! Listen for station broadcasts:
//!
//! ```no_run
//! use z21::{EventGroup, Z21Client};
//!
//! # async fn example() -> z21::Result<()> {
//! # let client = Z21Client::new();
//! let mut events = client.subscribe(EventGroup::SystemState).await;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate               | Purpose                                         |
//! |---------------------|-------------------------------------------------|
//! | `z21-core`          | Types, events, errors, transport seams          |
//! | `z21-proto`         | Wire codec: builders, parser, speed tables      |
//! | `z21-transport`     | UDP link and ICMP liveness probe                |
//! | `z21-client`        | Session, subscriptions, event router, discovery |
//! | `z21-test-harness`  | Mock links and a scripted loopback station      |
//! | **`z21`**           | This facade crate -- re-exports everything      |
//!
//! ## Coverage
//!
//! The client implements the request/response and broadcast surface of
//! the 2023-11-06 Z21 LAN Specification (v1.13) for driving, switching,
//! feedback, RailCom, and system state. The LocoNet and CAN tunnel
//! message families, CV programming, and the fast clock are out of
//! scope (their broadcast flags can still be managed).

pub use z21_client::{discover, ClientOptions, Subscription, Z21Client};
pub use z21_core::{
    BroadcastFlags, Capabilities, CentralState, CentralStateEx, ConnectionState, DecoderMode,
    Direction, DiscoveredStation, Error, EventGroup, FirmwareVersion, HardwareInfo, HardwareType,
    LocoAddress, LocoInfo, LocoSlotInfo, NativeSpeedSteps, RBusData, RailComData, Result,
    SpeedSteps, SystemState, TrackPowerState, TurnoutPosition, Z21Code, Z21Event,
};

/// The wire codec, for applications that build or inspect raw frames.
pub mod proto {
    pub use z21_proto::{builder, parse_datagram, parser, speed, wire, Z21Message, Z21_PORT};
}

/// Transport implementations, for custom wiring of the session seams.
pub mod transport {
    pub use z21_transport::{IcmpProbe, UdpLink, UdpLinkFactory};
}
