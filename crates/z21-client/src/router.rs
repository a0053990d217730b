//! Event router: parsed frames in, typed events out.
//!
//! Most messages map straight to an event plus a state-cache update. Two
//! correlators sit in the path:
//!
//! - **Loco-info/loco-mode pairing.** Station firmware reports a loco's
//!   protocol unreliably in the loco-info frame, so
//!   [`Z21Client::get_loco_info`](crate::Z21Client::get_loco_info) also
//!   requests the loco mode and the router holds the loco-info reply
//!   until the paired mode reply completes it. Unsolicited loco-info
//!   broadcasts pass straight through.
//! - **RailCom round robin.** While the polling timer runs, each RailCom
//!   frame for an address not yet seen in the current cycle triggers one
//!   follow-up poll, so the station walks all known decoders; a repeated
//!   address marks the end of the round.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use z21_core::{FirmwareVersion, Z21Event};
use z21_proto::{builder, Z21Message};

use crate::state::{FrameSender, SharedState};

/// Dispatches parsed frames to the event channel.
#[derive(Clone)]
pub(crate) struct EventRouter {
    pub state: Arc<Mutex<SharedState>>,
    pub event_tx: broadcast::Sender<Z21Event>,
    pub sender: FrameSender,
}

impl EventRouter {
    fn emit(&self, event: Z21Event) {
        // A send error only means nobody is listening right now.
        let _ = self.event_tx.send(event);
    }

    /// Route one parsed message.
    pub async fn dispatch(&self, msg: Z21Message) {
        match msg {
            Z21Message::SerialNumber(serial) => {
                self.state.lock().await.serial_number = Some(serial);
                self.emit(Z21Event::SerialNumberReceived(serial));
            }
            Z21Message::Code(code) => {
                self.state.lock().await.code = Some(code);
                self.emit(Z21Event::Z21CodeReceived(code));
            }
            Z21Message::HardwareInfo(hw) => {
                self.state.lock().await.hardware_info = Some(hw);
                self.emit(Z21Event::HardwareInfoReceived(hw));
            }
            Z21Message::BroadcastFlags(flags) => {
                self.emit(Z21Event::BroadcastFlagsReceived(flags));
            }
            Z21Message::FirmwareVersion(fw) => {
                self.emit(Z21Event::FirmwareVersionReceived(fw));
            }
            Z21Message::TrackPower(power) => {
                self.emit(Z21Event::TrackPowerInfoReceived(power));
            }
            Z21Message::EmergencyStop => {
                self.emit(Z21Event::EmergencyStopReceived);
            }
            Z21Message::TurnoutInfo { address, position } => {
                self.emit(Z21Event::TurnoutInfoReceived { address, position });
            }
            Z21Message::TurnoutMode { address, mode } => {
                self.emit(Z21Event::TurnoutModeReceived { address, mode });
            }
            Z21Message::RBusData(data) => {
                self.emit(Z21Event::RBusDataReceived(data));
            }
            Z21Message::LocoSlotInfo(slot) => {
                self.emit(Z21Event::LocoSlotInfoReceived(slot));
            }
            Z21Message::SystemState(state) => self.route_system_state(state).await,
            Z21Message::LocoInfo(info) => self.route_loco_info(info).await,
            Z21Message::LocoMode { address, mode } => self.route_loco_mode(address, mode).await,
            Z21Message::RailComData(data) => self.route_railcom(data).await,
            Z21Message::UnknownCommand => {
                warn!("station rejected the previous command as unknown");
            }
        }
    }

    async fn route_system_state(&self, mut state: z21_core::SystemState) {
        {
            let mut st = self.state.lock().await;
            match st.hardware_info {
                Some(hw) => {
                    // Starter-set units have no programming output; the
                    // reading is noise.
                    if hw.hardware_type.is_starter_unit() {
                        state.prog_current_ma = 0;
                    }
                    // The capabilities byte only exists from firmware 1.42.
                    if hw.firmware < FirmwareVersion::V1_42 {
                        state.capabilities = None;
                    }
                }
                None => state.capabilities = None,
            }
            if state.capabilities.is_some() {
                st.capabilities = state.capabilities;
            }
            st.system_state = Some(state);
        }
        self.emit(Z21Event::SystemStateChanged(state));
    }

    async fn route_loco_info(&self, info: z21_core::LocoInfo) {
        let key = info.address.value();
        let mut st = self.state.lock().await;
        if let Some(slot) = st.pending_loco_info.get_mut(&key) {
            debug!(address = key, "holding loco info until the paired loco-mode reply");
            *slot = Some(info);
        } else {
            drop(st);
            self.emit(Z21Event::LocoInfoReceived(info));
        }
    }

    async fn route_loco_mode(&self, address: z21_core::LocoAddress, mode: z21_core::DecoderMode) {
        let key = address.value();
        let mut st = self.state.lock().await;
        match st.pending_loco_info.get(&key).copied() {
            Some(Some(mut info)) => {
                st.pending_loco_info.remove(&key);
                drop(st);
                info.mode = mode;
                self.emit(Z21Event::LocoInfoReceived(info));
            }
            Some(None) => {
                // Mode reply overtook the loco-info reply; keep waiting.
                debug!(address = key, "loco-mode reply arrived first, keeping correlation open");
            }
            None => {
                drop(st);
                self.emit(Z21Event::LocoModeReceived { address, mode });
            }
        }
    }

    async fn route_railcom(&self, data: z21_core::RailComData) {
        let poll_more = {
            let mut st = self.state.lock().await;
            st.railcom_polling && st.railcom_cycle.insert(data.address.value())
        };
        if poll_more {
            let _ = self.sender.send(&builder::railcom_poll_next()).await;
        }
        self.emit(Z21Event::RailComDataReceived(data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use z21_core::{
        Capabilities, CentralState, CentralStateEx, DecoderMode, Direction, HardwareInfo,
        HardwareType, LocoAddress, LocoInfo, NativeSpeedSteps, RailComData, SystemState,
    };
    use z21_test_harness::{memory_pair, StationHandle};

    async fn test_router() -> (EventRouter, StationHandle, broadcast::Receiver<Z21Event>) {
        let (factory, station) = memory_pair();
        let remote: SocketAddr = "192.0.2.21:21105".parse().unwrap();
        let link = z21_core::link::LinkFactory::open(&factory, 21105, remote)
            .await
            .unwrap();

        let state = Arc::new(Mutex::new(SharedState::new()));
        let (event_tx, event_rx) = broadcast::channel(64);
        let sender = FrameSender {
            link: Arc::new(Mutex::new(Some(link))),
            gate: Arc::new(Mutex::new(())),
            state: Arc::clone(&state),
        };
        let router = EventRouter {
            state,
            event_tx,
            sender,
        };
        (router, station, event_rx)
    }

    fn loco_info(addr: u16) -> LocoInfo {
        LocoInfo {
            address: LocoAddress::new(addr),
            mode: DecoderMode::Dcc,
            busy: false,
            steps: NativeSpeedSteps::Steps128,
            direction: Direction::Forward,
            speed: 10,
            double_traction: false,
            smart_search: false,
            functions: 1,
        }
    }

    fn railcom(addr: u16) -> RailComData {
        RailComData {
            address: LocoAddress::new(addr),
            receive_counter: 1,
            error_counter: 0,
            options: 0,
            speed: 0,
            qos: 0,
        }
    }

    fn system_state(caps: Option<Capabilities>) -> SystemState {
        SystemState {
            main_current_ma: 900,
            prog_current_ma: 120,
            filtered_main_current_ma: 880,
            temperature_c: 31,
            supply_voltage_mv: 18_000,
            vcc_voltage_mv: 16_500,
            central_state: CentralState(0),
            central_state_ex: CentralStateEx(0),
            capabilities: caps,
        }
    }

    #[tokio::test]
    async fn unsolicited_loco_info_passes_through() {
        let (router, _station, mut rx) = test_router().await;
        router
            .dispatch(Z21Message::LocoInfo(loco_info(3)))
            .await;
        match rx.try_recv().unwrap() {
            Z21Event::LocoInfoReceived(info) => assert_eq!(info.address.value(), 3),
            other => panic!("expected LocoInfoReceived, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pending_loco_info_waits_for_mode_reply() {
        let (router, _station, mut rx) = test_router().await;
        router
            .state
            .lock()
            .await
            .pending_loco_info
            .insert(3, None);

        // The loco-info half is held back.
        router.dispatch(Z21Message::LocoInfo(loco_info(3))).await;
        assert!(rx.try_recv().is_err());

        // The mode reply completes the pair with the mode overridden.
        router
            .dispatch(Z21Message::LocoMode {
                address: LocoAddress::new(3),
                mode: DecoderMode::Motorola,
            })
            .await;
        match rx.try_recv().unwrap() {
            Z21Event::LocoInfoReceived(info) => {
                assert_eq!(info.address.value(), 3);
                assert_eq!(info.mode, DecoderMode::Motorola);
                assert_eq!(info.speed, 10);
            }
            other => panic!("expected LocoInfoReceived, got {other:?}"),
        }
        // No separate loco-mode event, and the correlation is closed.
        assert!(rx.try_recv().is_err());
        assert!(router
            .state
            .lock()
            .await
            .pending_loco_info
            .is_empty());
    }

    #[tokio::test]
    async fn mode_reply_arriving_first_keeps_correlation_open() {
        let (router, _station, mut rx) = test_router().await;
        router
            .state
            .lock()
            .await
            .pending_loco_info
            .insert(3, None);

        router
            .dispatch(Z21Message::LocoMode {
                address: LocoAddress::new(3),
                mode: DecoderMode::Motorola,
            })
            .await;

        // Nothing emitted, entry still waiting for the loco-info half.
        assert!(rx.try_recv().is_err());
        assert!(router
            .state
            .lock()
            .await
            .pending_loco_info
            .contains_key(&3));
    }

    #[tokio::test]
    async fn unrelated_mode_reply_emits_mode_event() {
        let (router, _station, mut rx) = test_router().await;
        router
            .dispatch(Z21Message::LocoMode {
                address: LocoAddress::new(42),
                mode: DecoderMode::Dcc,
            })
            .await;
        match rx.try_recv().unwrap() {
            Z21Event::LocoModeReceived { address, mode } => {
                assert_eq!(address.value(), 42);
                assert_eq!(mode, DecoderMode::Dcc);
            }
            other => panic!("expected LocoModeReceived, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn railcom_polls_once_per_address_per_cycle() {
        let (router, mut station, mut rx) = test_router().await;
        router.state.lock().await.railcom_polling = true;

        router.dispatch(Z21Message::RailComData(railcom(3))).await;
        router.dispatch(Z21Message::RailComData(railcom(3))).await;
        router.dispatch(Z21Message::RailComData(railcom(7))).await;

        // One follow-up poll per distinct address.
        let polls = station.drain_sent();
        assert_eq!(polls.len(), 2);
        for poll in &polls {
            assert_eq!(poll, &vec![0x07, 0x00, 0x89, 0x00, 0x00, 0x00, 0x00]);
        }

        // Every frame still emits its event.
        let mut events = 0;
        while rx.try_recv().is_ok() {
            events += 1;
        }
        assert_eq!(events, 3);

        // A new cycle polls the same address again.
        router.state.lock().await.railcom_cycle.clear();
        router.dispatch(Z21Message::RailComData(railcom(3))).await;
        assert_eq!(station.drain_sent().len(), 1);
    }

    #[tokio::test]
    async fn railcom_without_polling_never_follows_up() {
        let (router, mut station, mut rx) = test_router().await;
        router.dispatch(Z21Message::RailComData(railcom(3))).await;
        assert!(station.drain_sent().is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Z21Event::RailComDataReceived(_)
        ));
    }

    #[tokio::test]
    async fn system_state_on_starter_unit_forces_prog_current_zero() {
        let (router, _station, mut rx) = test_router().await;
        router.state.lock().await.hardware_info = Some(HardwareInfo {
            hardware_type: HardwareType::Z21Start,
            firmware: FirmwareVersion::new(1, 43),
        });

        router
            .dispatch(Z21Message::SystemState(system_state(Some(Capabilities(
                0x79,
            )))))
            .await;
        match rx.try_recv().unwrap() {
            Z21Event::SystemStateChanged(state) => {
                assert_eq!(state.prog_current_ma, 0);
                assert_eq!(state.capabilities, Some(Capabilities(0x79)));
            }
            other => panic!("expected SystemStateChanged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn system_state_on_old_firmware_drops_capabilities() {
        let (router, _station, mut rx) = test_router().await;
        router.state.lock().await.hardware_info = Some(HardwareInfo {
            hardware_type: HardwareType::Z21New,
            firmware: FirmwareVersion::new(1, 30),
        });

        router
            .dispatch(Z21Message::SystemState(system_state(Some(Capabilities(
                0x79,
            )))))
            .await;
        match rx.try_recv().unwrap() {
            Z21Event::SystemStateChanged(state) => {
                assert_eq!(state.capabilities, None);
                assert_eq!(state.prog_current_ma, 120);
            }
            other => panic!("expected SystemStateChanged, got {other:?}"),
        }
        assert!(router.state.lock().await.capabilities.is_none());
    }

    #[tokio::test]
    async fn handshake_replies_populate_the_cache() {
        let (router, _station, mut rx) = test_router().await;
        router.dispatch(Z21Message::SerialNumber(123_456)).await;
        router
            .dispatch(Z21Message::Code(z21_core::Z21Code::NoLock))
            .await;
        router
            .dispatch(Z21Message::HardwareInfo(HardwareInfo {
                hardware_type: HardwareType::Z21New,
                firmware: FirmwareVersion::new(1, 43),
            }))
            .await;

        let st = router.state.lock().await;
        assert_eq!(st.serial_number, Some(123_456));
        assert_eq!(st.code, Some(z21_core::Z21Code::NoLock));
        assert_eq!(
            st.hardware_info.map(|hw| hw.hardware_type),
            Some(HardwareType::Z21New)
        );
        drop(st);

        // Three reply events came out.
        let mut events = 0;
        while rx.try_recv().is_ok() {
            events += 1;
        }
        assert_eq!(events, 3);
    }

    #[tokio::test]
    async fn unknown_command_is_logged_not_emitted() {
        let (router, _station, mut rx) = test_router().await;
        router.dispatch(Z21Message::UnknownCommand).await;
        assert!(rx.try_recv().is_err());
    }
}
