//! z21-client: the Z21 LAN session layer.
//!
//! [`Z21Client`] drives one session with a command station over the
//! datagram link from `z21-transport` (or a test double): connect
//! handshake, keep-alive, watchdog, broadcast-flag subscription
//! management, event routing with the loco-info/loco-mode correlator,
//! RailCom polling, and subnet discovery.
//!
//! # Quick start
//!
//! ```no_run
//! use z21_client::Z21Client;
//! use z21_core::{EventGroup, LocoAddress};
//!
//! # async fn example() -> z21_core::Result<()> {
//! let client = Z21Client::new();
//! client.connect("192.168.0.111", None).await?;
//!
//! let mut events = client.subscribe(EventGroup::DrivingSwitching).await;
//! client.get_loco_info(LocoAddress::new(3)).await?;
//! let event = events.recv().await?;
//! println!("{event:?}");
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod discovery;
mod router;
mod state;
pub mod subscriptions;

pub use client::{ClientOptions, Z21Client};
pub use discovery::discover;
pub use subscriptions::Subscription;
