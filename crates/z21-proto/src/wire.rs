//! Frame-level constants and helpers shared by the builders and the parser.
//!
//! # Frame format
//!
//! ```text
//! <len_lo> <len_hi> <hdr_lo> <hdr_hi> [<payload>...]
//! ```
//!
//! - Length: little-endian u16, total frame size including itself
//! - Header: little-endian u16 message discriminator
//! - For header `0x0040` (X-Bus) the payload starts with an X-header byte
//!   and ends with an XOR checksum over everything between the header and
//!   the checksum byte
//!
//! A UDP datagram may carry several frames back to back.

use bytes::{BufMut, BytesMut};

use z21_core::LocoAddress;

// ---------------------------------------------------------------
// Frame headers (wire order little-endian)
// ---------------------------------------------------------------

/// LAN_GET_SERIAL_NUMBER request and response.
pub const HEADER_SERIAL_NUMBER: u16 = 0x0010;
/// LAN_GET_CODE request and response.
pub const HEADER_CODE: u16 = 0x0018;
/// LAN_GET_HWINFO request and response.
pub const HEADER_HWINFO: u16 = 0x001A;
/// LAN_LOGOFF.
pub const HEADER_LOGOFF: u16 = 0x0030;
/// X-Bus envelope.
pub const HEADER_XBUS: u16 = 0x0040;
/// LAN_SET_BROADCASTFLAGS.
pub const HEADER_SET_BROADCASTFLAGS: u16 = 0x0050;
/// LAN_GET_BROADCASTFLAGS request and response.
pub const HEADER_GET_BROADCASTFLAGS: u16 = 0x0051;
/// LAN_GET_LOCOMODE request and response.
pub const HEADER_GET_LOCOMODE: u16 = 0x0060;
/// LAN_SET_LOCOMODE.
pub const HEADER_SET_LOCOMODE: u16 = 0x0061;
/// LAN_GET_TURNOUTMODE request and response.
pub const HEADER_GET_TURNOUTMODE: u16 = 0x0070;
/// LAN_SET_TURNOUTMODE.
pub const HEADER_SET_TURNOUTMODE: u16 = 0x0071;
/// LAN_RBUS_DATACHANGED broadcast.
pub const HEADER_RBUS_DATACHANGED: u16 = 0x0080;
/// LAN_RBUS_GETDATA.
pub const HEADER_RBUS_GETDATA: u16 = 0x0081;
/// LAN_SYSTEMSTATE_DATACHANGED broadcast.
pub const HEADER_SYSTEMSTATE_DATACHANGED: u16 = 0x0084;
/// LAN_SYSTEMSTATE_GETDATA.
pub const HEADER_SYSTEMSTATE_GETDATA: u16 = 0x0085;
/// LAN_RAILCOM_DATACHANGED broadcast.
pub const HEADER_RAILCOM_DATACHANGED: u16 = 0x0088;
/// LAN_RAILCOM_GETDATA.
pub const HEADER_RAILCOM_GETDATA: u16 = 0x0089;
/// Undocumented loco-slot-info request and response.
pub const HEADER_LOCO_SLOT_INFO: u16 = 0x00AF;

// ---------------------------------------------------------------
// X-headers
// ---------------------------------------------------------------

/// LAN_X_SET_TRACK_POWER (DB0 selects off/on).
pub const X_SET_TRACK_POWER: u8 = 0x21;
/// LAN_X_GET/X_TURNOUT_INFO.
pub const X_TURNOUT_INFO: u8 = 0x43;
/// LAN_X_SET_TURNOUT.
pub const X_SET_TURNOUT: u8 = 0x53;
/// LAN_X_BC track power / programming / short-circuit / unknown-command
/// status family.
pub const X_STATUS: u8 = 0x61;
/// LAN_X_SET_STOP command and LAN_X_BC_STOPPED broadcast.
pub const X_STOP: u8 = 0x80;
/// LAN_X_BC_STOPPED broadcast X-header.
pub const X_BC_STOPPED: u8 = 0x81;
/// LAN_X_GET_LOCO_INFO.
pub const X_GET_LOCO_INFO: u8 = 0xE3;
/// LAN_X_SET_LOCO_DRIVE / LAN_X_SET_LOCO_FUNCTION.
pub const X_SET_LOCO: u8 = 0xE4;
/// LAN_X_LOCO_INFO broadcast.
pub const X_LOCO_INFO: u8 = 0xEF;
/// LAN_X_GET_FIRMWARE_VERSION.
pub const X_GET_FIRMWARE_VERSION: u8 = 0xF1;
/// LAN_X_FIRMWARE_VERSION response.
pub const X_FIRMWARE_VERSION: u8 = 0xF3;

/// DB0 of the GET_LOCO_INFO request.
pub const X_GET_LOCO_INFO_DB0: u8 = 0xF0;
/// DB0 selecting the function sub-command of `X_SET_LOCO`.
pub const X_SET_LOCO_FUNCTION_DB0: u8 = 0xF8;
/// DB0 of the status frame announcing an unknown command.
pub const X_STATUS_UNKNOWN_COMMAND: u8 = 0x82;

/// Default Z21 LAN port, used for both the local bind and the station.
pub const Z21_PORT: u16 = 21105;

// ---------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------

/// XOR checksum over a byte slice.
///
/// On the wire this covers frame bytes `[4..=len-2]`, i.e. the X-header
/// and all data bytes, excluding the checksum itself.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Assemble a non-X-Bus frame: length, header, payload.
pub fn frame(header: u16, payload: &[u8]) -> Vec<u8> {
    let len = 4 + payload.len();
    let mut buf = BytesMut::with_capacity(len);
    buf.put_u16_le(len as u16);
    buf.put_u16_le(header);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Assemble an X-Bus frame: length, header `0x0040`, X-payload, checksum.
///
/// `xpayload` starts with the X-header byte; the XOR checksum over it is
/// appended automatically.
pub fn xbus_frame(xpayload: &[u8]) -> Vec<u8> {
    let len = 4 + xpayload.len() + 1;
    let mut buf = BytesMut::with_capacity(len);
    buf.put_u16_le(len as u16);
    buf.put_u16_le(HEADER_XBUS);
    buf.put_slice(xpayload);
    buf.put_u8(xor_checksum(xpayload));
    buf.to_vec()
}

/// Encode a loco address for X-Bus commands.
///
/// The high byte carries the `0xC0` long-address mask for addresses ≥ 128.
pub fn xbus_address(addr: LocoAddress) -> [u8; 2] {
    let value = addr.value();
    let mut high = (value >> 8) as u8;
    if value >= 128 {
        high |= 0xC0;
    }
    [high, value as u8]
}

/// Decode a loco address from an inbound X-Bus loco-info frame.
///
/// The top two bits of the high byte are protocol/format flags and are
/// masked off; only the low six bits carry the address MSB.
pub fn loco_info_address(high: u8, low: u8) -> LocoAddress {
    LocoAddress::new((((high & 0x3F) as u16) << 8) | low as u16)
}
