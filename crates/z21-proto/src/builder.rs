//! Outbound frame builders.
//!
//! Each command is a pure function from typed arguments to the exact byte
//! buffer that goes on the wire. Builders never touch the network; the
//! session layer owns sending.
//!
//! # Example
//!
//! ```
//! use z21_proto::builder;
//!
//! assert_eq!(builder::serial_number_request(), vec![0x04, 0x00, 0x10, 0x00]);
//! ```

use z21_core::{BroadcastFlags, DecoderMode, Direction, LocoAddress, NativeSpeedSteps};

use crate::speed;
use crate::wire::{self, frame, xbus_address, xbus_frame};

/// RailCom request type asking for the next loco in the station's round
/// robin.
const RAILCOM_TYPE_NEXT: u8 = 0x00;
/// RailCom request type asking for one specific loco address.
const RAILCOM_TYPE_LOCO: u8 = 0x01;

/// LAN_GET_SERIAL_NUMBER.
pub fn serial_number_request() -> Vec<u8> {
    frame(wire::HEADER_SERIAL_NUMBER, &[])
}

/// LAN_GET_CODE — query the z21start feature-lock state.
pub fn code_request() -> Vec<u8> {
    frame(wire::HEADER_CODE, &[])
}

/// LAN_GET_HWINFO.
pub fn hardware_info_request() -> Vec<u8> {
    frame(wire::HEADER_HWINFO, &[])
}

/// LAN_LOGOFF — announce a clean session end.
pub fn logoff() -> Vec<u8> {
    frame(wire::HEADER_LOGOFF, &[])
}

/// LAN_SET_BROADCASTFLAGS.
pub fn set_broadcast_flags(flags: BroadcastFlags) -> Vec<u8> {
    frame(wire::HEADER_SET_BROADCASTFLAGS, &flags.bits().to_le_bytes())
}

/// LAN_GET_BROADCASTFLAGS.
pub fn broadcast_flags_request() -> Vec<u8> {
    frame(wire::HEADER_GET_BROADCASTFLAGS, &[])
}

/// LAN_GET_LOCOMODE. Mode commands carry the raw big-endian address.
pub fn loco_mode_request(addr: LocoAddress) -> Vec<u8> {
    frame(wire::HEADER_GET_LOCOMODE, &addr.value().to_be_bytes())
}

/// LAN_SET_LOCOMODE.
pub fn set_loco_mode(addr: LocoAddress, mode: DecoderMode) -> Vec<u8> {
    let [high, low] = addr.value().to_be_bytes();
    frame(wire::HEADER_SET_LOCOMODE, &[high, low, mode.raw()])
}

/// LAN_GET_TURNOUTMODE.
pub fn turnout_mode_request(addr: u16) -> Vec<u8> {
    frame(wire::HEADER_GET_TURNOUTMODE, &addr.to_be_bytes())
}

/// LAN_SET_TURNOUTMODE.
pub fn set_turnout_mode(addr: u16, mode: DecoderMode) -> Vec<u8> {
    let [high, low] = addr.to_be_bytes();
    frame(wire::HEADER_SET_TURNOUTMODE, &[high, low, mode.raw()])
}

/// LAN_RBUS_GETDATA for one feedback group (0 or 1).
pub fn rbus_data_request(group: u8) -> Vec<u8> {
    frame(wire::HEADER_RBUS_GETDATA, &[group])
}

/// LAN_RAILCOM_GETDATA for one loco address.
pub fn railcom_data_request(addr: LocoAddress) -> Vec<u8> {
    let [low, high] = addr.value().to_le_bytes();
    frame(wire::HEADER_RAILCOM_GETDATA, &[RAILCOM_TYPE_LOCO, low, high])
}

/// LAN_RAILCOM_GETDATA asking for the next loco in the polling round
/// robin.
pub fn railcom_poll_next() -> Vec<u8> {
    frame(wire::HEADER_RAILCOM_GETDATA, &[RAILCOM_TYPE_NEXT, 0x00, 0x00])
}

/// LAN_SYSTEMSTATE_GETDATA.
pub fn system_state_request() -> Vec<u8> {
    frame(wire::HEADER_SYSTEMSTATE_GETDATA, &[])
}

/// Request one loco slot (1..=120) from the undocumented slot table.
pub fn loco_slot_info_request(slot: u8) -> Vec<u8> {
    frame(wire::HEADER_LOCO_SLOT_INFO, &[slot])
}

/// LAN_X_GET_FIRMWARE_VERSION.
pub fn firmware_version_request() -> Vec<u8> {
    xbus_frame(&[wire::X_GET_FIRMWARE_VERSION, 0x0A])
}

/// LAN_X_SET_TRACK_POWER_ON / LAN_X_SET_TRACK_POWER_OFF.
pub fn set_track_power(on: bool) -> Vec<u8> {
    let db0 = if on { 0x81 } else { 0x80 };
    xbus_frame(&[wire::X_SET_TRACK_POWER, db0])
}

/// LAN_X_SET_STOP — emergency-stop every loco, track stays powered.
pub fn emergency_stop() -> Vec<u8> {
    xbus_frame(&[wire::X_STOP])
}

/// LAN_X_GET_LOCO_INFO.
pub fn loco_info_request(addr: LocoAddress) -> Vec<u8> {
    let [high, low] = xbus_address(addr);
    xbus_frame(&[wire::X_GET_LOCO_INFO, wire::X_GET_LOCO_INFO_DB0, high, low])
}

/// LAN_X_SET_LOCO_DRIVE.
///
/// `speed` is a linear step in the caller's normalized range for `mode`;
/// the Motorola scaling and the Roco wire lookup happen here.
pub fn set_loco_drive(
    addr: LocoAddress,
    speed: u8,
    steps: NativeSpeedSteps,
    direction: Direction,
    mode: DecoderMode,
) -> Vec<u8> {
    let native = speed::clamp_to_native(mode, steps, speed);
    let mut drive = speed::to_wire_speed(steps, native);
    if direction == Direction::Forward {
        drive |= 0x80;
    }
    let [high, low] = xbus_address(addr);
    xbus_frame(&[wire::X_SET_LOCO, steps.drive_db0(), high, low, drive])
}

/// LAN_X_SET_LOCO_FUNCTION, toggling function `index` (F0..F31).
pub fn set_loco_function(addr: LocoAddress, index: u8) -> Vec<u8> {
    let [high, low] = xbus_address(addr);
    // Switch type 0b10 = toggle, in the top two bits of DB3.
    let db3 = 0x80 | (index & 0x3F);
    xbus_frame(&[
        wire::X_SET_LOCO,
        wire::X_SET_LOCO_FUNCTION_DB0,
        high,
        low,
        db3,
    ])
}

/// LAN_X_GET_TURNOUT_INFO.
pub fn turnout_info_request(addr: u16) -> Vec<u8> {
    let [high, low] = addr.to_be_bytes();
    xbus_frame(&[wire::X_TURNOUT_INFO, high, low])
}

/// LAN_X_SET_TURNOUT — drive one coil output of a turnout decoder.
///
/// The control byte is `10Q0A00P`: `Q` queues the command inside the
/// station, `A` activates (1) or deactivates (0) the output, `P` selects
/// the output. The session layer is responsible for the activate /
/// deactivate pulse pair.
pub fn set_turnout(addr: u16, output: bool, activate: bool, queue: bool) -> Vec<u8> {
    let [high, low] = addr.to_be_bytes();
    let mut control = 0x80;
    if queue {
        control |= 0x20;
    }
    if activate {
        control |= 0x08;
    }
    if output {
        control |= 0x01;
    }
    xbus_frame(&[wire::X_SET_TURNOUT, high, low, control])
}
