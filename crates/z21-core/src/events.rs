//! Asynchronous client event types.
//!
//! Events are emitted by the session through a `tokio::sync::broadcast`
//! channel whenever the command station pushes a status update or answers
//! a request. Throttle UIs and layout controllers subscribe to event
//! groups for real-time updates without polling.

use crate::types::{
    BroadcastFlags, ConnectionState, DecoderMode, FirmwareVersion, HardwareInfo, LocoAddress,
    LocoInfo, LocoSlotInfo, RBusData, RailComData, SystemState, TrackPowerState, TurnoutPosition,
    Z21Code,
};

/// An event emitted by the client when the station reports something.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events under heavy load (e.g. a layout
/// with many occupancy detectors firing at once).
#[derive(Debug, Clone)]
pub enum Z21Event {
    /// The station reported its broadcast-flag mask.
    BroadcastFlagsReceived(BroadcastFlags),

    /// The session lifecycle state changed.
    ConnectionStateChanged(ConnectionState),

    /// The station broadcast an emergency stop.
    EmergencyStopReceived,

    /// Answer to an X-Bus firmware version request.
    FirmwareVersionReceived(FirmwareVersion),

    /// Answer to a hardware-info request.
    HardwareInfoReceived(HardwareInfo),

    /// Loco state pushed by the station or answering a loco-info request.
    LocoInfoReceived(LocoInfo),

    /// Answer to a loco-mode request.
    LocoModeReceived {
        /// Decoder address.
        address: LocoAddress,
        /// Track protocol the address is served with.
        mode: DecoderMode,
    },

    /// Answer to a loco-slot-info request.
    LocoSlotInfoReceived(LocoSlotInfo),

    /// R-Bus feedback group changed.
    RBusDataReceived(RBusData),

    /// RailCom statistics for one loco.
    RailComDataReceived(RailComData),

    /// Answer to a serial-number request.
    SerialNumberReceived(u32),

    /// System-state snapshot pushed by the station or answering a request.
    SystemStateChanged(SystemState),

    /// Track power state broadcast.
    TrackPowerInfoReceived(TrackPowerState),

    /// Turnout position pushed by the station or answering a request.
    TurnoutInfoReceived {
        /// Turnout address.
        address: u16,
        /// Reported position.
        position: TurnoutPosition,
    },

    /// Answer to a turnout-mode request.
    TurnoutModeReceived {
        /// Turnout address.
        address: u16,
        /// Track protocol the address is served with.
        mode: DecoderMode,
    },

    /// Answer to a get-code request.
    Z21CodeReceived(Z21Code),
}

impl Z21Event {
    /// Whether this event is delivered to subscribers of `group`.
    ///
    /// Some events belong to more than one group: a loco-info broadcast
    /// reaches both [`EventGroup::DrivingSwitching`] and
    /// [`EventGroup::AllLocoInfo`] subscribers, RailCom data reaches both
    /// RailCom groups.
    pub fn matches(&self, group: EventGroup) -> bool {
        match self {
            Z21Event::LocoInfoReceived(_) => matches!(
                group,
                EventGroup::DrivingSwitching | EventGroup::AllLocoInfo
            ),
            Z21Event::TurnoutInfoReceived { .. }
            | Z21Event::TrackPowerInfoReceived(_)
            | Z21Event::EmergencyStopReceived => group == EventGroup::DrivingSwitching,
            Z21Event::RBusDataReceived(_) => group == EventGroup::RBus,
            Z21Event::RailComDataReceived(_) => {
                matches!(group, EventGroup::RailCom | EventGroup::AllRailCom)
            }
            Z21Event::SystemStateChanged(_) => group == EventGroup::SystemState,
            Z21Event::ConnectionStateChanged(_) => group == EventGroup::Connection,
            Z21Event::BroadcastFlagsReceived(_)
            | Z21Event::FirmwareVersionReceived(_)
            | Z21Event::HardwareInfoReceived(_)
            | Z21Event::LocoModeReceived { .. }
            | Z21Event::LocoSlotInfoReceived(_)
            | Z21Event::SerialNumberReceived(_)
            | Z21Event::TurnoutModeReceived { .. }
            | Z21Event::Z21CodeReceived(_) => group == EventGroup::Replies,
        }
    }
}

/// Subscription categories offered by the client.
///
/// Groups that map to a broadcast flag make the station push the matching
/// messages while at least one subscriber is registered. Flags introduced
/// by later firmware carry a guard; subscribing on older firmware still
/// counts the listener but never raises the flag.
///
/// The LocoNet and fast-clock groups manage their flags only — the client
/// does not decode those message families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventGroup {
    /// Loco info for subscribed addresses, turnout info, track power and
    /// emergency-stop broadcasts.
    DrivingSwitching,
    /// R-Bus feedback changes.
    RBus,
    /// RailCom data for subscribed locos. The first subscriber also starts
    /// the RailCom polling cycle.
    RailCom,
    /// Fast-clock time messages (flag management only).
    FastClock,
    /// System-state snapshots.
    SystemState,
    /// Loco info for every address (firmware ≥ 1.20).
    AllLocoInfo,
    /// CAN-bus occupancy detector changes (firmware ≥ 1.30, flag only).
    CanDetector,
    /// RailCom data for every loco (firmware ≥ 1.29).
    AllRailCom,
    /// CAN-bus booster status (firmware ≥ 1.41, flag only).
    CanBooster,
    /// LocoNet traffic except locos and switches (flag only).
    LocoNet,
    /// LocoNet loco traffic (flag only).
    LocoNetLoco,
    /// LocoNet switch traffic (flag only).
    LocoNetSwitch,
    /// LocoNet occupancy detector traffic (flag only).
    LocoNetDetector,
    /// Request/response events (serial number, hardware info, modes,
    /// slots, codes). No broadcast flag involved.
    Replies,
    /// Connection lifecycle events. No broadcast flag involved.
    Connection,
}

impl EventGroup {
    /// Broadcast flags this group needs the station to have raised.
    pub fn required_flags(&self) -> BroadcastFlags {
        match self {
            EventGroup::DrivingSwitching => BroadcastFlags::BASIC,
            EventGroup::RBus => BroadcastFlags::RBUS,
            EventGroup::RailCom => BroadcastFlags::RAILCOM,
            EventGroup::FastClock => BroadcastFlags::FAST_CLOCK,
            EventGroup::SystemState => BroadcastFlags::SYSTEM_STATE,
            EventGroup::AllLocoInfo => BroadcastFlags::ALL_LOCO_INFO,
            EventGroup::CanDetector => BroadcastFlags::CAN_DETECTOR,
            EventGroup::AllRailCom => BroadcastFlags::ALL_RAILCOM,
            EventGroup::CanBooster => BroadcastFlags::CAN_BOOSTER,
            EventGroup::LocoNet => BroadcastFlags::LOCONET,
            EventGroup::LocoNetLoco => BroadcastFlags::LOCONET_LOCO,
            EventGroup::LocoNetSwitch => BroadcastFlags::LOCONET_SWITCH,
            EventGroup::LocoNetDetector => BroadcastFlags::LOCONET_DETECTOR,
            EventGroup::Replies | EventGroup::Connection => BroadcastFlags::empty(),
        }
    }

    /// Minimum firmware required before the flag may be raised.
    pub fn min_firmware(&self) -> Option<FirmwareVersion> {
        match self {
            EventGroup::AllLocoInfo => Some(FirmwareVersion::V1_20),
            EventGroup::AllRailCom => Some(FirmwareVersion::V1_29),
            EventGroup::CanDetector => Some(FirmwareVersion::V1_30),
            EventGroup::CanBooster => Some(FirmwareVersion::V1_41),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, NativeSpeedSteps};

    fn sample_loco_info() -> LocoInfo {
        LocoInfo {
            address: LocoAddress::new(3),
            mode: DecoderMode::Dcc,
            busy: false,
            steps: NativeSpeedSteps::Steps128,
            direction: Direction::Forward,
            speed: 0,
            double_traction: false,
            smart_search: false,
            functions: 0,
        }
    }

    #[test]
    fn loco_info_matches_both_loco_groups() {
        let event = Z21Event::LocoInfoReceived(sample_loco_info());
        assert!(event.matches(EventGroup::DrivingSwitching));
        assert!(event.matches(EventGroup::AllLocoInfo));
        assert!(!event.matches(EventGroup::SystemState));
        assert!(!event.matches(EventGroup::Replies));
    }

    #[test]
    fn railcom_matches_both_railcom_groups() {
        let event = Z21Event::RailComDataReceived(RailComData {
            address: LocoAddress::new(3),
            receive_counter: 0,
            error_counter: 0,
            options: 0,
            speed: 0,
            qos: 0,
        });
        assert!(event.matches(EventGroup::RailCom));
        assert!(event.matches(EventGroup::AllRailCom));
        assert!(!event.matches(EventGroup::RBus));
    }

    #[test]
    fn reply_events_match_replies_group() {
        let event = Z21Event::SerialNumberReceived(123_456);
        assert!(event.matches(EventGroup::Replies));
        assert!(!event.matches(EventGroup::DrivingSwitching));
    }

    #[test]
    fn connection_events_match_connection_group() {
        let event = Z21Event::ConnectionStateChanged(ConnectionState::Lost);
        assert!(event.matches(EventGroup::Connection));
        assert!(!event.matches(EventGroup::Replies));
    }

    #[test]
    fn group_flags() {
        assert_eq!(
            EventGroup::DrivingSwitching.required_flags(),
            BroadcastFlags::BASIC
        );
        assert_eq!(
            EventGroup::SystemState.required_flags(),
            BroadcastFlags::SYSTEM_STATE
        );
        assert!(EventGroup::Replies.required_flags().is_empty());
        assert!(EventGroup::Connection.required_flags().is_empty());
    }

    #[test]
    fn group_firmware_guards() {
        assert_eq!(
            EventGroup::AllLocoInfo.min_firmware(),
            Some(FirmwareVersion::V1_20)
        );
        assert_eq!(
            EventGroup::AllRailCom.min_firmware(),
            Some(FirmwareVersion::V1_29)
        );
        assert_eq!(
            EventGroup::CanBooster.min_firmware(),
            Some(FirmwareVersion::V1_41)
        );
        assert_eq!(EventGroup::DrivingSwitching.min_firmware(), None);
        assert_eq!(EventGroup::RailCom.min_firmware(), None);
    }
}
