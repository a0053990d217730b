//! Inbound datagram parser.
//!
//! A UDP datagram from the station may carry several frames back to back.
//! [`parse_datagram`] walks them left to right and returns the decoded
//! messages in wire order. Malformed lengths stop the walk (the tail is
//! undecodable without a valid length); unknown headers, short frames,
//! and checksum mismatches drop only the offending frame.
//!
//! The parser is pure byte-level decoding. Session concerns — firmware
//! gating of the capabilities byte, the starter-unit programming-current
//! quirk, the loco-info/loco-mode correlation — live in `z21-client`.

use tracing::warn;

use z21_core::error::{Error, Result};
use z21_core::{
    BroadcastFlags, CentralState, CentralStateEx, Capabilities, DecoderMode, Direction,
    FirmwareVersion, HardwareInfo, HardwareType, LocoAddress, LocoInfo, LocoSlotInfo,
    NativeSpeedSteps, RBusData, RailComData, SystemState, TrackPowerState, TurnoutPosition,
    Z21Code,
};

use crate::speed;
use crate::wire;

/// A decoded inbound frame, discriminated by (header, X-header).
#[derive(Debug, Clone, PartialEq)]
pub enum Z21Message {
    /// Serial-number response.
    SerialNumber(u32),
    /// Feature-lock code response.
    Code(Z21Code),
    /// Hardware-info response.
    HardwareInfo(HardwareInfo),
    /// Broadcast-flag mask response.
    BroadcastFlags(BroadcastFlags),
    /// Loco-mode response.
    LocoMode {
        /// Decoder address.
        address: LocoAddress,
        /// Track protocol.
        mode: DecoderMode,
    },
    /// Turnout-mode response.
    TurnoutMode {
        /// Turnout address.
        address: u16,
        /// Track protocol.
        mode: DecoderMode,
    },
    /// R-Bus feedback broadcast.
    RBusData(RBusData),
    /// System-state broadcast or response.
    SystemState(SystemState),
    /// RailCom statistics broadcast or response.
    RailComData(RailComData),
    /// Loco-slot-info response.
    LocoSlotInfo(LocoSlotInfo),
    /// X-Bus firmware-version response.
    FirmwareVersion(FirmwareVersion),
    /// Track-power state broadcast.
    TrackPower(TrackPowerState),
    /// Emergency-stop broadcast.
    EmergencyStop,
    /// Turnout-info broadcast or response.
    TurnoutInfo {
        /// Turnout address.
        address: u16,
        /// Reported position.
        position: TurnoutPosition,
    },
    /// Loco-info broadcast or response.
    LocoInfo(LocoInfo),
    /// The station rejected the previous command as unknown.
    UnknownCommand,
}

/// Parse one datagram into the frames it carries, in wire order.
///
/// Frames that fail to decode are logged and skipped; a malformed length
/// field ends the walk and discards the rest of the datagram.
pub fn parse_datagram(data: &[u8]) -> Vec<Z21Message> {
    let mut messages = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        if rest.len() < 2 {
            warn!(remaining = rest.len(), "truncated frame length, discarding tail");
            break;
        }
        let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        if len < 4 || len > rest.len() {
            warn!(
                length = len,
                remaining = rest.len(),
                "malformed frame length, discarding tail"
            );
            break;
        }

        match parse_frame(&rest[..len]) {
            Ok(msg) => messages.push(msg),
            Err(e) => warn!(error = %e, frame = ?&rest[..len], "dropping frame"),
        }
        rest = &rest[len..];
    }

    messages
}

/// Decode a single frame (length field already validated).
fn parse_frame(frame: &[u8]) -> Result<Z21Message> {
    let header = u16::from_le_bytes([frame[2], frame[3]]);
    match header {
        wire::HEADER_SERIAL_NUMBER => {
            let payload = expect_len(frame, 8, "serial number")?;
            Ok(Z21Message::SerialNumber(read_u32_le(payload, 4)))
        }
        wire::HEADER_CODE => {
            let payload = expect_len(frame, 5, "code")?;
            Ok(Z21Message::Code(Z21Code::from_raw(payload[4])))
        }
        wire::HEADER_HWINFO => {
            let payload = expect_len(frame, 12, "hardware info")?;
            Ok(Z21Message::HardwareInfo(HardwareInfo {
                hardware_type: HardwareType::from_raw(read_u32_le(payload, 4)),
                firmware: FirmwareVersion::from_bcd(read_u32_le(payload, 8)),
            }))
        }
        wire::HEADER_GET_BROADCASTFLAGS => {
            let payload = expect_len(frame, 8, "broadcast flags")?;
            Ok(Z21Message::BroadcastFlags(BroadcastFlags::from_bits(
                read_u32_le(payload, 4),
            )))
        }
        wire::HEADER_GET_LOCOMODE => {
            let payload = expect_len(frame, 7, "loco mode")?;
            Ok(Z21Message::LocoMode {
                address: LocoAddress::new(u16::from_be_bytes([payload[4], payload[5]])),
                mode: DecoderMode::from_raw(payload[6]),
            })
        }
        wire::HEADER_GET_TURNOUTMODE => {
            let payload = expect_len(frame, 7, "turnout mode")?;
            Ok(Z21Message::TurnoutMode {
                address: u16::from_be_bytes([payload[4], payload[5]]),
                mode: DecoderMode::from_raw(payload[6]),
            })
        }
        wire::HEADER_RBUS_DATACHANGED => {
            let payload = expect_len(frame, 15, "R-Bus data")?;
            let mut feedback = [0u8; 10];
            feedback.copy_from_slice(&payload[5..15]);
            Ok(Z21Message::RBusData(RBusData {
                group: payload[4],
                feedback,
            }))
        }
        wire::HEADER_SYSTEMSTATE_DATACHANGED => parse_system_state(frame),
        wire::HEADER_RAILCOM_DATACHANGED => parse_railcom(frame),
        wire::HEADER_LOCO_SLOT_INFO => parse_loco_slot(frame),
        wire::HEADER_XBUS => parse_xbus(frame),
        other => Err(Error::Protocol(format!("unknown header {other:#06X}"))),
    }
}

fn parse_system_state(frame: &[u8]) -> Result<Z21Message> {
    let payload = expect_len(frame, 18, "system state")?;
    Ok(Z21Message::SystemState(SystemState {
        main_current_ma: read_i16_le(payload, 4),
        prog_current_ma: read_i16_le(payload, 6),
        filtered_main_current_ma: read_i16_le(payload, 8),
        temperature_c: read_i16_le(payload, 10),
        supply_voltage_mv: read_i16_le(payload, 12),
        vcc_voltage_mv: read_i16_le(payload, 14),
        central_state: CentralState(payload[16]),
        central_state_ex: CentralStateEx(payload[17]),
        // Reported by firmware >= 1.42; the session clears it on older
        // stations where this byte is garbage.
        capabilities: payload.get(19).map(|&b| Capabilities(b)),
    }))
}

fn parse_railcom(frame: &[u8]) -> Result<Z21Message> {
    let payload = expect_len(frame, 12, "RailCom data")?;
    Ok(Z21Message::RailComData(RailComData {
        address: LocoAddress::new(u16::from_le_bytes([payload[4], payload[5]])),
        receive_counter: read_u32_le(payload, 6),
        error_counter: u16::from_le_bytes([payload[10], payload[11]]),
        options: payload.get(12).copied().unwrap_or(0),
        speed: payload.get(13).copied().unwrap_or(0),
        qos: payload.get(14).copied().unwrap_or(0),
    }))
}

/// Decode the undocumented 24-byte loco-slot-info frame.
///
/// Byte layout reverse-engineered against firmware 1.43: slot at 7,
/// big-endian address at 9, raw speed at 12 (low 7 bits), F12/F20/F28
/// overflow bits in byte 13, direction and F0..F4 in byte 14, F5..F11 /
/// F13..F19 / F21..F27 in bytes 15..17, protocol code in byte 18.
fn parse_loco_slot(frame: &[u8]) -> Result<Z21Message> {
    let payload = expect_len(frame, 24, "loco slot info")?;

    let (mode, steps) = match payload[18] {
        3 => (DecoderMode::Dcc, NativeSpeedSteps::Steps14),
        6 => (DecoderMode::Dcc, NativeSpeedSteps::Steps28),
        9 => (DecoderMode::Dcc, NativeSpeedSteps::Steps128),
        67 => (DecoderMode::Motorola, NativeSpeedSteps::Steps14),
        83 => (DecoderMode::Motorola, NativeSpeedSteps::Steps28),
        117 => (DecoderMode::Motorola, NativeSpeedSteps::Steps128),
        _ => (DecoderMode::Dcc, NativeSpeedSteps::Unknown),
    };

    let overflow = payload[13];
    let mut functions = (payload[14] & 0x1F) as u32; // F0..F4
    functions |= ((payload[15] & 0x7F) as u32) << 5; // F5..F11
    functions |= ((payload[16] & 0x7F) as u32) << 13; // F13..F19
    functions |= ((payload[17] & 0x7F) as u32) << 21; // F21..F27
    if overflow & 0x10 != 0 {
        functions |= 1 << 12;
    }
    if overflow & 0x20 != 0 {
        functions |= 1 << 20;
    }
    if overflow & 0x40 != 0 {
        functions |= 1 << 28;
    }

    let direction = if payload[14] & 0x20 == 0 {
        Direction::Forward
    } else {
        Direction::Backward
    };

    Ok(Z21Message::LocoSlotInfo(LocoSlotInfo {
        slot: payload[7],
        address: LocoAddress::new(u16::from_be_bytes([payload[9], payload[10]])),
        mode,
        steps,
        direction,
        raw_speed: payload[12] & 0x7F,
        functions,
    }))
}

/// Decode an X-Bus frame after verifying its checksum.
fn parse_xbus(frame: &[u8]) -> Result<Z21Message> {
    if frame.len() < 6 {
        return Err(Error::Protocol(format!(
            "X-Bus frame too short ({} bytes)",
            frame.len()
        )));
    }

    let body = &frame[4..frame.len() - 1];
    let expected = wire::xor_checksum(body);
    let actual = frame[frame.len() - 1];
    if expected != actual {
        return Err(Error::Checksum { expected, actual });
    }

    match frame[4] {
        wire::X_STATUS => {
            let payload = expect_len(frame, 7, "status")?;
            match payload[5] {
                0x00 => Ok(Z21Message::TrackPower(TrackPowerState::Off)),
                0x01 => Ok(Z21Message::TrackPower(TrackPowerState::On)),
                0x02 => Ok(Z21Message::TrackPower(TrackPowerState::Programming)),
                0x08 => Ok(Z21Message::TrackPower(TrackPowerState::ShortCircuit)),
                wire::X_STATUS_UNKNOWN_COMMAND => Ok(Z21Message::UnknownCommand),
                other => Err(Error::Protocol(format!(
                    "unknown status code {other:#04X}"
                ))),
            }
        }
        wire::X_BC_STOPPED => Ok(Z21Message::EmergencyStop),
        wire::X_TURNOUT_INFO => {
            let payload = expect_len(frame, 9, "turnout info")?;
            Ok(Z21Message::TurnoutInfo {
                address: u16::from_be_bytes([payload[5], payload[6]]),
                position: TurnoutPosition::from_raw(payload[7]),
            })
        }
        wire::X_LOCO_INFO => parse_loco_info(frame),
        wire::X_FIRMWARE_VERSION => {
            let payload = expect_len(frame, 9, "firmware version")?;
            Ok(Z21Message::FirmwareVersion(FirmwareVersion::from_bcd_bytes(
                payload[6], payload[7],
            )))
        }
        other => Err(Error::Protocol(format!("unknown X-header {other:#04X}"))),
    }
}

fn parse_loco_info(frame: &[u8]) -> Result<Z21Message> {
    let payload = expect_len(frame, 14, "loco info")?;

    let db2 = payload[7];
    let db3 = payload[8];
    let db4 = payload[9];
    let steps = NativeSpeedSteps::from_db0(db2);

    let mut functions = ((db4 >> 4) & 0x01) as u32; // F0
    functions |= ((db4 & 0x0F) as u32) << 1; // F1..F4
    functions |= (payload[10] as u32) << 5; // F5..F12
    functions |= (payload[11] as u32) << 13; // F13..F20
    functions |= (payload[12] as u32) << 21; // F21..F28
    if payload.len() >= 15 {
        functions |= ((payload[13] & 0x07) as u32) << 29; // F29..F31
    }

    Ok(Z21Message::LocoInfo(LocoInfo {
        address: wire::loco_info_address(payload[5], payload[6]),
        // The frame carries no trustworthy protocol flag; the session
        // overrides this from the paired loco-mode response.
        mode: DecoderMode::Dcc,
        busy: db2 & 0x08 != 0,
        steps,
        direction: if db3 & 0x80 != 0 {
            Direction::Forward
        } else {
            Direction::Backward
        },
        speed: speed::from_wire_speed(steps, db3),
        double_traction: db4 & 0x40 != 0,
        smart_search: db4 & 0x20 != 0,
        functions,
    }))
}

/// Return the frame if it is at least `min` bytes long.
fn expect_len<'a>(frame: &'a [u8], min: usize, what: &str) -> Result<&'a [u8]> {
    if frame.len() < min {
        return Err(Error::Protocol(format!(
            "{what} frame too short ({} bytes, expected {min})",
            frame.len()
        )));
    }
    Ok(frame)
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}
