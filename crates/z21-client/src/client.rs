//! The Z21 session client.
//!
//! [`Z21Client`] owns one session with a command station: the connect
//! handshake (ping, hardware probe, capability/code/serial capture,
//! broadcast-flag publication), the background receive loop, the
//! keep-alive and watchdog timers, and the subscription refcounting that
//! drives the station's broadcast-flag mask.
//!
//! The client is a single long-lived instance owned by the caller; all
//! timers and tasks belong to it and are cleaned up on disconnect.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use z21_core::error::{Error, Result};
use z21_core::link::{DatagramLink, LinkFactory, LivenessProbe};
use z21_core::{
    BroadcastFlags, Capabilities, ConnectionState, DecoderMode, DiscoveredStation, Direction,
    EventGroup, FirmwareVersion, HardwareInfo, LocoAddress, NativeSpeedSteps, SystemState,
    TurnoutPosition, Z21Code, Z21Event,
};
use z21_proto::{builder, parse_datagram, Z21_PORT};
use z21_transport::{IcmpProbe, UdpLinkFactory};

use crate::discovery;
use crate::router::EventRouter;
use crate::state::{FrameSender, SharedState};
use crate::subscriptions::Subscription;

/// Tuning knobs for one client instance.
///
/// The defaults match real-hardware behavior; tests shrink the periods
/// to milliseconds.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Local UDP port to bind. The Z21 convention is 21105 on both ends;
    /// 0 lets the OS pick.
    pub local_port: u16,
    /// ICMP preflight/watchdog probe timeout.
    pub probe_timeout: Duration,
    /// Per-step handshake timeout.
    pub handshake_timeout: Duration,
    /// Keep-alive timer period.
    pub keepalive_period: Duration,
    /// Idle threshold after which the keep-alive sends a system-state
    /// request.
    pub keepalive_idle: Duration,
    /// Watchdog timer period.
    pub watchdog_period: Duration,
    /// Reception quiet window the watchdog tolerates before probing.
    pub watchdog_quiet: Duration,
    /// Consecutive probe failures that declare the session lost.
    pub max_failed_probes: u32,
    /// Delay before the first RailCom poll.
    pub railcom_poll_delay: Duration,
    /// RailCom polling period.
    pub railcom_poll_period: Duration,
    /// Turnout activation pulse width.
    pub turnout_pulse: Duration,
    /// Settle time after the turnout off-pulse.
    pub turnout_settle: Duration,
    /// Event broadcast channel capacity.
    pub event_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            local_port: Z21_PORT,
            probe_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(3),
            keepalive_period: Duration::from_secs(45),
            keepalive_idle: Duration::from_secs(40),
            watchdog_period: Duration::from_secs(5),
            watchdog_quiet: Duration::from_secs(15),
            max_failed_probes: 3,
            railcom_poll_delay: Duration::from_secs(1),
            railcom_poll_period: Duration::from_secs(2),
            turnout_pulse: Duration::from_millis(100),
            turnout_settle: Duration::from_millis(50),
            event_capacity: 256,
        }
    }
}

/// Flags the session itself keeps raised while connected: driving and
/// switching broadcasts plus system state for the keep-alive.
fn base_mask() -> BroadcastFlags {
    BroadcastFlags::BASIC | BroadcastFlags::SYSTEM_STATE
}

/// Everything the background tasks share with the client.
#[derive(Clone)]
pub(crate) struct Core {
    pub options: ClientOptions,
    pub link: Arc<Mutex<Option<Arc<dyn DatagramLink>>>>,
    pub sender: FrameSender,
    pub state: Arc<Mutex<SharedState>>,
    pub event_tx: broadcast::Sender<Z21Event>,
    pub connected: Arc<AtomicBool>,
    pub cancel: Arc<Mutex<Option<CancellationToken>>>,
    pub tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    pub railcom_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Asynchronous client for Roco/Fleischmann Z21 command stations.
pub struct Z21Client {
    core: Core,
    factory: Arc<dyn LinkFactory>,
    probe: Arc<dyn LivenessProbe>,
}

impl Default for Z21Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Z21Client {
    /// Create a client with production transport and default options.
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    /// Create a client with production transport and custom options.
    pub fn with_options(options: ClientOptions) -> Self {
        Self::with_parts(Arc::new(UdpLinkFactory), Arc::new(IcmpProbe), options)
    }

    /// Create a client over custom link/probe implementations.
    ///
    /// This is the seam the test harness uses; production code wants
    /// [`Z21Client::new`].
    pub fn with_parts(
        factory: Arc<dyn LinkFactory>,
        probe: Arc<dyn LivenessProbe>,
        options: ClientOptions,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(options.event_capacity);
        let state = Arc::new(Mutex::new(SharedState::new()));
        let link = Arc::new(Mutex::new(None));
        let sender = FrameSender {
            link: Arc::clone(&link),
            gate: Arc::new(Mutex::new(())),
            state: Arc::clone(&state),
        };

        Z21Client {
            core: Core {
                options,
                link,
                sender,
                state,
                event_tx,
                connected: Arc::new(AtomicBool::new(false)),
                cancel: Arc::new(Mutex::new(None)),
                tasks: Arc::new(Mutex::new(Vec::new())),
                railcom_task: Arc::new(Mutex::new(None)),
            },
            factory,
            probe,
        }
    }

    fn emit(&self, event: Z21Event) {
        let _ = self.core.event_tx.send(event);
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.core.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    // -----------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------

    /// Connect to a station at `host` (IP or DNS name), default port
    /// 21105.
    ///
    /// Runs the full handshake: ICMP preflight, hardware probe,
    /// capability/code/serial capture, broadcast-flag publication, then
    /// starts the keep-alive and watchdog timers. Calling this on a live
    /// session warns and succeeds without touching it.
    pub async fn connect(&self, host: &str, port: Option<u16>) -> Result<()> {
        if self.core.connected.load(Ordering::SeqCst) {
            warn!("connect called on a live session, ignoring");
            return Ok(());
        }

        let remote = resolve(host, port.unwrap_or(Z21_PORT)).await?;
        debug!(remote = %remote, "connecting");
        self.core.state.lock().await.connection = ConnectionState::Connecting;
        self.emit(Z21Event::ConnectionStateChanged(ConnectionState::Connecting));

        if !self
            .probe
            .probe(remote.ip(), self.core.options.probe_timeout)
            .await
        {
            error!(host, "station did not answer ping");
            self.core.state.lock().await.connection = ConnectionState::Disconnected;
            self.emit(Z21Event::ConnectionStateChanged(ConnectionState::Disconnected));
            return Err(Error::Unreachable(host.to_string()));
        }

        let link = match self
            .factory
            .open(self.core.options.local_port, remote)
            .await
        {
            Ok(link) => link,
            Err(e) => {
                error!(error = %e, "failed to open link");
                self.core.state.lock().await.connection = ConnectionState::Disconnected;
                self.emit(Z21Event::ConnectionStateChanged(ConnectionState::Disconnected));
                return Err(e);
            }
        };
        *self.core.link.lock().await = Some(Arc::clone(&link));
        {
            let mut st = self.core.state.lock().await;
            st.remote_ip = Some(remote.ip());
            st.last_message_received = Instant::now();
            st.last_command_sent = Instant::now();
        }

        let token = CancellationToken::new();
        *self.core.cancel.lock().await = Some(token.clone());

        let router = EventRouter {
            state: Arc::clone(&self.core.state),
            event_tx: self.core.event_tx.clone(),
            sender: self.core.sender.clone(),
        };
        self.core.tasks.lock().await.push(tokio::spawn(receive_loop(
            link,
            remote.ip(),
            router,
            Arc::clone(&self.core.state),
            token.clone(),
        )));

        // The hardware probe is mandatory; without it nothing else about
        // the station can be trusted.
        let hw = match self
            .request(builder::hardware_info_request(), |ev| match ev {
                Z21Event::HardwareInfoReceived(hw) => Some(*hw),
                _ => None,
            })
            .await
        {
            Ok(hw) => hw,
            Err(e) => {
                error!(error = %e, "handshake failed at hardware probe, tearing down");
                teardown(self.core.clone(), false).await;
                return Err(e);
            }
        };
        debug!(hardware = %hw, "station identified");

        // Firmware >= 1.42 reports capabilities in the system state.
        if hw.firmware >= FirmwareVersion::V1_42 {
            if let Err(e) = self
                .request(builder::system_state_request(), |ev| match ev {
                    Z21Event::SystemStateChanged(_) => Some(()),
                    _ => None,
                })
                .await
            {
                warn!(error = %e, "no system-state reply during handshake");
            }
        }

        if let Err(e) = self
            .request(builder::code_request(), |ev| match ev {
                Z21Event::Z21CodeReceived(code) => Some(*code),
                _ => None,
            })
            .await
        {
            warn!(error = %e, "no code reply during handshake");
        }

        if let Err(e) = self
            .request(builder::serial_number_request(), |ev| match ev {
                Z21Event::SerialNumberReceived(serial) => Some(*serial),
                _ => None,
            })
            .await
        {
            warn!(error = %e, "no serial-number reply during handshake");
        }

        // Publish the initial mask: session base plus whatever listeners
        // survived a previous session.
        let mask = self.current_mask().await;
        let _ = self
            .core
            .sender
            .send(&builder::set_broadcast_flags(mask))
            .await;
        debug!(mask = %mask, "published initial broadcast flags");

        self.core
            .tasks
            .lock()
            .await
            .push(tokio::spawn(keepalive_loop(self.core.clone(), token.clone())));
        self.core.tasks.lock().await.push(tokio::spawn(watchdog_loop(
            self.core.clone(),
            Arc::clone(&self.probe),
            token.clone(),
        )));

        self.core.connected.store(true, Ordering::SeqCst);
        self.core.state.lock().await.connection = ConnectionState::Ready;
        self.emit(Z21Event::ConnectionStateChanged(ConnectionState::Ready));

        // Resume RailCom polling if listeners are already registered.
        self.maybe_start_railcom().await;

        debug!(remote = %remote, "session ready");
        Ok(())
    }

    /// Close the session: logoff, stop timers, cancel the receive loop
    /// (awaited up to one second), close the socket, clear cached
    /// station facts. Idempotent.
    pub async fn disconnect(&self) {
        teardown(self.core.clone(), true).await;
    }

    /// Whether a session is established.
    pub fn is_connected(&self) -> bool {
        self.core.connected.load(Ordering::SeqCst)
    }

    /// Broadcast discovery: probe the local subnet for stations.
    ///
    /// Requires a disconnected client — the station treats the probe
    /// source as a new client, which would confuse a live session.
    pub async fn query_for_z21s(&self, timeout: Duration) -> Result<Vec<DiscoveredStation>> {
        if self.core.connected.load(Ordering::SeqCst) {
            error!("discovery requires a disconnected client");
            return Err(Error::InvalidParameter(
                "discovery requires a disconnected client".into(),
            ));
        }
        discovery::discover(timeout).await
    }

    // -----------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------

    /// Register a listener for an event group.
    ///
    /// The first listener of a flag-gated group pushes the updated
    /// broadcast-flag mask to the station; the first RailCom listener
    /// also starts the polling cycle.
    pub async fn subscribe(&self, group: EventGroup) -> Subscription {
        let receiver = self.core.event_tx.subscribe();
        let first = { self.core.state.lock().await.subscriptions.add(group) };
        if first {
            debug!(?group, "first listener registered");
            if !group.required_flags().is_empty() && self.guard_satisfied(group).await {
                self.push_flags().await;
            }
            if group == EventGroup::RailCom {
                self.maybe_start_railcom().await;
            }
        }
        Subscription { group, receiver }
    }

    /// Drop a listener. The last listener of a flag-gated group pushes
    /// the reduced mask; the last RailCom listener stops the polling
    /// cycle.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let group = subscription.group;
        drop(subscription);
        let last = { self.core.state.lock().await.subscriptions.remove(group) };
        if last {
            debug!(?group, "last listener removed");
            if !group.required_flags().is_empty() && self.guard_satisfied(group).await {
                self.push_flags().await;
            }
            if group == EventGroup::RailCom {
                self.stop_railcom().await;
            }
        }
    }

    /// Unfiltered event stream. Unlike [`subscribe`](Self::subscribe)
    /// this takes no part in broadcast-flag refcounting.
    pub fn events(&self) -> broadcast::Receiver<Z21Event> {
        self.core.event_tx.subscribe()
    }

    async fn guard_satisfied(&self, group: EventGroup) -> bool {
        match group.min_firmware() {
            None => true,
            Some(min) => {
                let st = self.core.state.lock().await;
                st.hardware_info.map(|hw| hw.firmware >= min).unwrap_or(false)
            }
        }
    }

    async fn current_mask(&self) -> BroadcastFlags {
        let st = self.core.state.lock().await;
        let firmware = st.hardware_info.map(|hw| hw.firmware);
        base_mask() | st.subscriptions.active_mask(firmware)
    }

    async fn push_flags(&self) {
        if !self.core.connected.load(Ordering::SeqCst) {
            return;
        }
        let mask = self.current_mask().await;
        debug!(mask = %mask, "pushing broadcast flags");
        let _ = self
            .core
            .sender
            .send(&builder::set_broadcast_flags(mask))
            .await;
    }

    async fn maybe_start_railcom(&self) {
        if !self.core.connected.load(Ordering::SeqCst) {
            return;
        }
        let wanted =
            { self.core.state.lock().await.subscriptions.count(EventGroup::RailCom) > 0 };
        if !wanted {
            return;
        }
        let token = { self.core.cancel.lock().await.clone() };
        let Some(token) = token else { return };

        let mut slot = self.core.railcom_task.lock().await;
        if slot.is_some() {
            return;
        }
        debug!("starting RailCom polling");
        self.core.state.lock().await.railcom_polling = true;
        *slot = Some(tokio::spawn(railcom_poll_loop(self.core.clone(), token)));
    }

    async fn stop_railcom(&self) {
        if let Some(task) = self.core.railcom_task.lock().await.take() {
            debug!("stopping RailCom polling");
            task.abort();
        }
        let mut st = self.core.state.lock().await;
        st.railcom_polling = false;
        st.railcom_cycle.clear();
    }

    // -----------------------------------------------------------------
    // Cached session facts
    // -----------------------------------------------------------------

    /// Current session lifecycle state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.core.state.lock().await.connection
    }

    /// Hardware identification captured during the handshake.
    pub async fn hardware_info(&self) -> Option<HardwareInfo> {
        self.core.state.lock().await.hardware_info
    }

    /// Station feature set (firmware ≥ 1.42).
    pub async fn capabilities(&self) -> Option<Capabilities> {
        self.core.state.lock().await.capabilities
    }

    /// Station serial number captured during the handshake.
    pub async fn serial_number(&self) -> Option<u32> {
        self.core.state.lock().await.serial_number
    }

    /// z21start feature-lock state captured during the handshake.
    pub async fn z21_code(&self) -> Option<Z21Code> {
        self.core.state.lock().await.code
    }

    /// Most recent system-state snapshot.
    pub async fn system_state(&self) -> Option<SystemState> {
        self.core.state.lock().await.system_state
    }

    // -----------------------------------------------------------------
    // Requests — results arrive as events
    // -----------------------------------------------------------------

    /// Request the broadcast-flag mask the station has stored.
    pub async fn get_broadcast_flags(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::broadcast_flags_request()).await
    }

    /// Request the X-Bus firmware version.
    pub async fn get_firmware_version(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::firmware_version_request()).await
    }

    /// Request hardware type and firmware version.
    pub async fn get_hardware_info(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::hardware_info_request()).await
    }

    /// Request the serial number.
    pub async fn get_serial_number(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::serial_number_request()).await
    }

    /// Request a system-state snapshot.
    pub async fn get_system_state(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::system_state_request()).await
    }

    /// Request the z21start feature-lock state.
    pub async fn get_z21_code(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::code_request()).await
    }

    /// Request loco state, paired with a loco-mode request.
    ///
    /// The router holds the loco-info reply until the mode reply
    /// arrives and emits a single `LocoInfoReceived` carrying the
    /// correct protocol.
    pub async fn get_loco_info(&self, addr: LocoAddress) -> Result<()> {
        self.ensure_connected()?;
        self.core
            .state
            .lock()
            .await
            .pending_loco_info
            .insert(addr.value(), None);
        self.core.sender.send(&builder::loco_info_request(addr)).await?;
        self.core.sender.send(&builder::loco_mode_request(addr)).await
    }

    /// Request the protocol a loco address is served with.
    pub async fn get_loco_mode(&self, addr: LocoAddress) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::loco_mode_request(addr)).await
    }

    /// Request one slot (1..=120) of the station's loco table.
    pub async fn get_loco_slot_info(&self, slot: u8) -> Result<()> {
        self.ensure_connected()?;
        if !(1..=120).contains(&slot) {
            error!(slot, "loco slot out of range 1..=120");
            return Err(Error::InvalidParameter(format!(
                "loco slot {slot} out of range 1..=120"
            )));
        }
        self.core.sender.send(&builder::loco_slot_info_request(slot)).await
    }

    /// Request a turnout's position.
    pub async fn get_turnout_info(&self, addr: u16) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::turnout_info_request(addr)).await
    }

    /// Request the protocol a turnout address is served with.
    pub async fn get_turnout_mode(&self, addr: u16) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::turnout_mode_request(addr)).await
    }

    /// Request one R-Bus feedback group (0 or 1).
    pub async fn get_rbus_data(&self, group: u8) -> Result<()> {
        self.ensure_connected()?;
        if group > 1 {
            error!(group, "R-Bus group out of range 0..=1");
            return Err(Error::InvalidParameter(format!(
                "R-Bus group {group} out of range 0..=1"
            )));
        }
        self.core.sender.send(&builder::rbus_data_request(group)).await
    }

    /// Request RailCom statistics for one loco.
    pub async fn get_railcom_data(&self, addr: LocoAddress) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::railcom_data_request(addr)).await
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    /// Switch track power on.
    pub async fn set_track_power_on(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::set_track_power(true)).await
    }

    /// Switch track power off.
    pub async fn set_track_power_off(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::set_track_power(false)).await
    }

    /// Emergency-stop every loco; the track stays powered.
    pub async fn set_emergency_stop(&self) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::emergency_stop()).await
    }

    /// Drive a loco. `speed` is in the caller's normalized step range
    /// for `mode` (see [`NativeSpeedSteps::normalized`]).
    pub async fn set_loco_drive(
        &self,
        addr: LocoAddress,
        speed: u8,
        steps: NativeSpeedSteps,
        direction: Direction,
        mode: DecoderMode,
    ) -> Result<()> {
        self.ensure_connected()?;
        self.core
            .sender
            .send(&builder::set_loco_drive(addr, speed, steps, direction, mode))
            .await
    }

    /// Toggle a loco function (F0..F31).
    pub async fn set_loco_function(&self, addr: LocoAddress, index: u8) -> Result<()> {
        self.ensure_connected()?;
        if index > 31 {
            error!(index, "function index out of range 0..=31");
            return Err(Error::InvalidParameter(format!(
                "function index {index} out of range 0..=31"
            )));
        }
        self.core.sender.send(&builder::set_loco_function(addr, index)).await
    }

    /// Set the protocol a loco address is served with.
    pub async fn set_loco_mode(&self, addr: LocoAddress, mode: DecoderMode) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::set_loco_mode(addr, mode)).await
    }

    /// Set the protocol a turnout address is served with.
    pub async fn set_turnout_mode(&self, addr: u16, mode: DecoderMode) -> Result<()> {
        self.ensure_connected()?;
        self.core.sender.send(&builder::set_turnout_mode(addr, mode)).await
    }

    /// Throw a turnout: activation pulse, 100 ms, off-pulse, 50 ms
    /// settle.
    pub async fn set_turnout_position(&self, addr: u16, position: TurnoutPosition) -> Result<()> {
        self.ensure_connected()?;
        let output = match position {
            TurnoutPosition::P1 => false,
            TurnoutPosition::P2 => true,
            other => {
                error!(?other, "turnout position must be P1 or P2");
                return Err(Error::InvalidParameter(
                    "turnout position must be P1 or P2".into(),
                ));
            }
        };
        self.core
            .sender
            .send(&builder::set_turnout(addr, output, true, false))
            .await?;
        tokio::time::sleep(self.core.options.turnout_pulse).await;
        self.core
            .sender
            .send(&builder::set_turnout(addr, output, false, false))
            .await?;
        tokio::time::sleep(self.core.options.turnout_settle).await;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Handshake plumbing
    // -----------------------------------------------------------------

    /// Send a request and await its matching event, bounded by the
    /// handshake timeout. The temporary subscriber is dropped on every
    /// outcome.
    async fn request<T>(
        &self,
        frame: Vec<u8>,
        matcher: impl Fn(&Z21Event) -> Option<T>,
    ) -> Result<T> {
        let mut rx = self.core.event_tx.subscribe();
        self.core.sender.send(&frame).await?;

        let deadline = tokio::time::Instant::now() + self.core.options.handshake_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) => {
                    if let Some(value) = matcher(&event) {
                        return Ok(value);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(Error::ConnectionLost),
                Err(_) => return Err(Error::Timeout),
            }
        }
    }
}

/// Resolve a host string (IP literal or DNS name) to a socket address.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::InvalidParameter(format!("cannot resolve {host}: {e}")))?;
    addrs
        .next()
        .ok_or_else(|| Error::InvalidParameter(format!("no address for {host}")))
}

// ---------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------

/// Read datagrams until cancellation, filter by station IP, parse, and
/// dispatch. Parse trouble never terminates the loop.
async fn receive_loop(
    link: Arc<dyn DatagramLink>,
    remote_ip: IpAddr,
    router: EventRouter,
    state: Arc<Mutex<SharedState>>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; 2048];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("receive loop cancelled");
                break;
            }
            result = link.recv_from(&mut buf) => match result {
                Ok((n, src)) => {
                    // The source port may differ on broadcast replies,
                    // but the IP must be the station's.
                    if src.ip() != remote_ip {
                        trace!(source = %src, "ignoring datagram from foreign source");
                        continue;
                    }
                    state.lock().await.last_message_received = Instant::now();
                    for msg in parse_datagram(&buf[..n]) {
                        router.dispatch(msg).await;
                    }
                }
                Err(Error::NotConnected) | Err(Error::ConnectionLost) => {
                    debug!("link closed, receive loop ending");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "receive error");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}

/// Every period, request system state if no command left for longer
/// than the idle threshold, so the station's own client timeout never
/// fires.
async fn keepalive_loop(core: Core, cancel: CancellationToken) {
    let period = core.options.keepalive_period;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !core.connected.load(Ordering::SeqCst) {
                    continue;
                }
                let idle = { core.state.lock().await.last_command_sent.elapsed() };
                if idle > core.options.keepalive_idle {
                    trace!(idle_ms = idle.as_millis() as u64, "keep-alive request");
                    let _ = core.sender.send(&builder::system_state_request()).await;
                }
            }
        }
    }
}

/// Every period, check reception freshness; when the link is quiet,
/// ping the station. Three consecutive failures declare the session
/// lost and tear it down.
async fn watchdog_loop(core: Core, probe: Arc<dyn LivenessProbe>, cancel: CancellationToken) {
    let period = core.options.watchdog_period;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !core.connected.load(Ordering::SeqCst) {
                    continue;
                }
                let (quiet, remote) = {
                    let st = core.state.lock().await;
                    (st.last_message_received.elapsed(), st.remote_ip)
                };
                if quiet <= core.options.watchdog_quiet {
                    continue;
                }
                let Some(remote) = remote else { continue };

                if probe.probe(remote, core.options.probe_timeout).await {
                    debug!(quiet_ms = quiet.as_millis() as u64, "station reachable but silent");
                    core.state.lock().await.failed_ping_count = 0;
                    continue;
                }

                let failed = {
                    let mut st = core.state.lock().await;
                    st.failed_ping_count += 1;
                    st.failed_ping_count
                };
                warn!(failed, "station not answering ping");
                if failed >= core.options.max_failed_probes {
                    error!("station unreachable, declaring session lost");
                    core.state.lock().await.connection = ConnectionState::Lost;
                    let _ = core
                        .event_tx
                        .send(Z21Event::ConnectionStateChanged(ConnectionState::Lost));
                    // Teardown awaits this task's siblings; run it on its
                    // own task so the watchdog can exit first.
                    tokio::spawn(teardown(core.clone(), false));
                    break;
                }
            }
        }
    }
}

/// RailCom polling: after the initial delay, start each cycle by
/// clearing the per-cycle address set and asking for the next loco in
/// the station's round robin.
async fn railcom_poll_loop(core: Core, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(core.options.railcom_poll_delay) => {}
    }
    let period = core.options.railcom_poll_period;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now(), period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !core.connected.load(Ordering::SeqCst) {
                    continue;
                }
                core.state.lock().await.railcom_cycle.clear();
                trace!("RailCom poll cycle");
                let _ = core.sender.send(&builder::railcom_poll_next()).await;
            }
        }
    }
}

/// Shut the session down: optional logoff, cancel and await background
/// tasks (bounded), close the link, clear cached station facts.
/// Idempotent; safe to call from the watchdog.
pub(crate) async fn teardown(core: Core, send_logoff: bool) {
    let was_connected = core.connected.swap(false, Ordering::SeqCst);
    if was_connected && send_logoff {
        debug!("sending logoff");
        let _ = core.sender.send(&builder::logoff()).await;
    }

    if let Some(token) = core.cancel.lock().await.take() {
        token.cancel();
    }
    if let Some(task) = core.railcom_task.lock().await.take() {
        task.abort();
    }

    let tasks: Vec<JoinHandle<()>> = core.tasks.lock().await.drain(..).collect();
    for task in tasks {
        let abort = task.abort_handle();
        if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
            warn!("background task did not stop within 1s, abandoning");
            abort.abort();
        }
    }

    if let Some(link) = core.link.lock().await.take() {
        let _ = link.close().await;
    }

    let had_session = {
        let mut st = core.state.lock().await;
        let had = st.connection != ConnectionState::Disconnected;
        st.clear_session();
        had
    };
    if had_session {
        let _ = core
            .event_tx
            .send(Z21Event::ConnectionStateChanged(ConnectionState::Disconnected));
        debug!("session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_protocol_timing() {
        let options = ClientOptions::default();
        assert_eq!(options.local_port, 21105);
        assert_eq!(options.probe_timeout, Duration::from_secs(2));
        assert_eq!(options.handshake_timeout, Duration::from_secs(3));
        assert_eq!(options.keepalive_period, Duration::from_secs(45));
        assert_eq!(options.keepalive_idle, Duration::from_secs(40));
        assert_eq!(options.watchdog_period, Duration::from_secs(5));
        assert_eq!(options.watchdog_quiet, Duration::from_secs(15));
        assert_eq!(options.max_failed_probes, 3);
        assert_eq!(options.railcom_poll_delay, Duration::from_secs(1));
        assert_eq!(options.railcom_poll_period, Duration::from_secs(2));
        assert_eq!(options.turnout_pulse, Duration::from_millis(100));
        assert_eq!(options.turnout_settle, Duration::from_millis(50));
    }

    #[test]
    fn base_mask_covers_session_needs() {
        let mask = base_mask();
        assert!(mask.contains(BroadcastFlags::BASIC));
        assert!(mask.contains(BroadcastFlags::SYSTEM_STATE));
        assert!(!mask.contains(BroadcastFlags::RBUS));
    }

    #[tokio::test]
    async fn resolve_ip_literal() {
        let addr = resolve("192.0.2.21", 21105).await.unwrap();
        assert_eq!(addr.to_string(), "192.0.2.21:21105");
    }

    #[tokio::test]
    async fn resolve_rejects_garbage() {
        assert!(matches!(
            resolve("no such host...", 21105).await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn operations_require_a_session() {
        let client = Z21Client::new();
        assert!(matches!(
            client.get_serial_number().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            client.set_track_power_on().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            client
                .set_loco_drive(
                    LocoAddress::new(3),
                    5,
                    NativeSpeedSteps::Steps128,
                    Direction::Forward,
                    DecoderMode::Dcc
                )
                .await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_without_session_is_idempotent() {
        let client = Z21Client::new();
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
        assert_eq!(
            client.connection_state().await,
            ConnectionState::Disconnected
        );
    }
}
