//! Shared session state and the serialized send path.
//!
//! All mutable session state sits behind one mutex ([`SharedState`]); the
//! socket write path is serialized independently by [`FrameSender`]'s
//! gate so concurrent callers never interleave datagrams on the wire.
//! The gate is held only across the write; it is never taken while the
//! state mutex is held.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::warn;

use z21_core::error::{Error, Result};
use z21_core::link::DatagramLink;
use z21_core::{
    Capabilities, ConnectionState, HardwareInfo, LocoInfo, SystemState, Z21Code,
};

use crate::subscriptions::SubscriptionLedger;

/// Everything the receive loop, the timers, and caller threads share.
pub(crate) struct SharedState {
    /// Session lifecycle state.
    pub connection: ConnectionState,
    /// Station IP the receive loop filters on.
    pub remote_ip: Option<IpAddr>,
    /// Hardware identification from the handshake.
    pub hardware_info: Option<HardwareInfo>,
    /// Station feature set (firmware ≥ 1.42).
    pub capabilities: Option<Capabilities>,
    /// Station serial number.
    pub serial_number: Option<u32>,
    /// z21start feature-lock state.
    pub code: Option<Z21Code>,
    /// Most recent system-state snapshot.
    pub system_state: Option<SystemState>,
    /// Loco-info/loco-mode correlation table. `None` marks a request
    /// whose loco-info half has not arrived yet.
    pub pending_loco_info: HashMap<u16, Option<LocoInfo>>,
    /// Listener counts per event group.
    pub subscriptions: SubscriptionLedger,
    /// Whether the RailCom polling timer is running.
    pub railcom_polling: bool,
    /// Addresses already seen in the current RailCom polling cycle.
    pub railcom_cycle: HashSet<u16>,
    /// When the last command went out.
    pub last_command_sent: Instant,
    /// When the last datagram arrived from the station.
    pub last_message_received: Instant,
    /// Consecutive watchdog probe failures.
    pub failed_ping_count: u32,
}

impl SharedState {
    pub fn new() -> Self {
        let now = Instant::now();
        SharedState {
            connection: ConnectionState::Disconnected,
            remote_ip: None,
            hardware_info: None,
            capabilities: None,
            serial_number: None,
            code: None,
            system_state: None,
            pending_loco_info: HashMap::new(),
            subscriptions: SubscriptionLedger::default(),
            railcom_polling: false,
            railcom_cycle: HashSet::new(),
            last_command_sent: now,
            last_message_received: now,
            failed_ping_count: 0,
        }
    }

    /// Drop everything the session cached. Subscription counts survive
    /// so a reconnect can republish the same mask.
    pub fn clear_session(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.remote_ip = None;
        self.hardware_info = None;
        self.capabilities = None;
        self.serial_number = None;
        self.code = None;
        self.system_state = None;
        self.pending_loco_info.clear();
        self.railcom_polling = false;
        self.railcom_cycle.clear();
        self.failed_ping_count = 0;
    }
}

/// Serialized outbound path shared by the session, the timers, and the
/// event router.
///
/// Multiple logical callers issue commands concurrently; the gate mutex
/// guarantees at most one outstanding socket write at any instant. A
/// send failure drops the command with a warning — the session survives
/// transient transport trouble and the watchdog decides when the station
/// is actually gone.
#[derive(Clone)]
pub(crate) struct FrameSender {
    pub link: Arc<Mutex<Option<Arc<dyn DatagramLink>>>>,
    pub gate: Arc<Mutex<()>>,
    pub state: Arc<Mutex<SharedState>>,
}

impl FrameSender {
    /// Send one frame to the station.
    ///
    /// `Err(NotConnected)` when no link is attached; transport failures
    /// are logged and swallowed.
    pub async fn send(&self, frame: &[u8]) -> Result<()> {
        let link = { self.link.lock().await.clone() };
        let Some(link) = link else {
            return Err(Error::NotConnected);
        };

        let _gate = self.gate.lock().await;
        match link.send(frame).await {
            Ok(()) => {
                drop(_gate);
                self.state.lock().await.last_command_sent = Instant::now();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, bytes = frame.len(), "send failed, dropping command");
                Ok(())
            }
        }
    }
}
