//! Speed-step conversions between caller values and the wire encoding.
//!
//! Three translations happen on the way to the track:
//!
//! 1. The caller speaks in *normalized* steps ([`SpeedSteps`]), which for
//!    Märklin Motorola decoders is a smaller range than the wire uses.
//!    [`clamp_to_native`] scales into the native range.
//! 2. The native linear step is looked up in the Roco wire table
//!    ([`to_wire_speed`]): the 28-step range interleaves an extra bit, and
//!    every range reserves code 1 for emergency stop.
//! 3. The direction bit is OR-ed on top by the drive builder.
//!
//! [`from_wire_speed`] is the inbound inverse used by the loco-info
//! decoder.
//!
//! [`SpeedSteps`]: z21_core::SpeedSteps

use z21_core::{DecoderMode, NativeSpeedSteps};

/// Wire code for a regular stop.
pub const WIRE_STOP: u8 = 0x00;
/// Wire code for an emergency stop.
pub const WIRE_EMERGENCY_STOP: u8 = 0x01;

/// Convert a linear native step to the 7-bit wire value.
///
/// Step 0 is a stop. Steps above the native maximum are clamped. The
/// 28-step encoding spreads five significant bits over the value with the
/// least-significant step bit at position 4:
///
/// ```text
/// 0 0 0 A4 A0 A3 A2 A1   (A = step + 3)
/// ```
pub fn to_wire_speed(steps: NativeSpeedSteps, speed: u8) -> u8 {
    if speed == 0 {
        return WIRE_STOP;
    }
    match steps {
        NativeSpeedSteps::Steps14 => speed.min(14) + 1,
        NativeSpeedSteps::Steps28 => {
            let v = speed.min(28) + 3;
            (v >> 1) | ((v & 0x01) << 4)
        }
        NativeSpeedSteps::Steps128 | NativeSpeedSteps::Unknown => speed.min(126) + 1,
    }
}

/// Convert a 7-bit wire value back to a linear native step.
///
/// Stop and emergency stop both come back as 0.
pub fn from_wire_speed(steps: NativeSpeedSteps, wire: u8) -> u8 {
    let wire = wire & 0x7F;
    match steps {
        NativeSpeedSteps::Steps14 => match wire {
            WIRE_STOP | WIRE_EMERGENCY_STOP => 0,
            v => v - 1,
        },
        NativeSpeedSteps::Steps28 => {
            let v = ((wire & 0x0F) << 1) | ((wire >> 4) & 0x01);
            v.saturating_sub(3)
        }
        NativeSpeedSteps::Steps128 | NativeSpeedSteps::Unknown => match wire {
            WIRE_STOP | WIRE_EMERGENCY_STOP => 0,
            v => v - 1,
        },
    }
}

/// Scale a caller speed (normalized steps) into the native range.
///
/// DCC is the identity clamped to the range maximum. Märklin Motorola
/// decoders expose a reduced range to the caller, so the value is scaled
/// up: 28-step decoders take the doubled value, 128-step decoders take
/// `ceil(speed × 4.6)` capped at 126.
pub fn clamp_to_native(mode: DecoderMode, steps: NativeSpeedSteps, speed: u8) -> u8 {
    match mode {
        DecoderMode::Dcc => speed.min(steps.max_speed()),
        DecoderMode::Motorola => match steps {
            NativeSpeedSteps::Steps14 => speed.min(14),
            NativeSpeedSteps::Steps28 => (speed as u16 * 2).min(28) as u8,
            NativeSpeedSteps::Steps128 | NativeSpeedSteps::Unknown => {
                let scaled = (speed as u16 * 46).div_ceil(10);
                scaled.min(126) as u8
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_speed_14_steps() {
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps14, 0), 0x00);
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps14, 1), 0x02);
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps14, 14), 0x0F);
        // Clamped to the range maximum.
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps14, 99), 0x0F);
    }

    #[test]
    fn wire_speed_28_steps_interleaving() {
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps28, 0), 0x00);
        // step 1: v = 4 = 0b00100 -> 0b00010
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps28, 1), 0x02);
        // step 2: v = 5 = 0b00101 -> 0b10010
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps28, 2), 0x12);
        // step 28: v = 31 = 0b11111 -> 0b11111
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps28, 28), 0x1F);
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps28, 99), 0x1F);
    }

    #[test]
    fn wire_speed_128_steps() {
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps128, 0), 0x00);
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps128, 1), 0x02);
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps128, 126), 0x7F);
        assert_eq!(to_wire_speed(NativeSpeedSteps::Steps128, 200), 0x7F);
    }

    #[test]
    fn wire_speed_round_trip_all_ranges() {
        for steps in [
            NativeSpeedSteps::Steps14,
            NativeSpeedSteps::Steps28,
            NativeSpeedSteps::Steps128,
        ] {
            for speed in 0..=steps.max_speed() {
                let wire = to_wire_speed(steps, speed);
                assert_eq!(
                    from_wire_speed(steps, wire),
                    speed,
                    "round trip failed for {steps:?} step {speed}"
                );
            }
        }
    }

    #[test]
    fn emergency_stop_decodes_as_stopped() {
        assert_eq!(
            from_wire_speed(NativeSpeedSteps::Steps14, WIRE_EMERGENCY_STOP),
            0
        );
        assert_eq!(
            from_wire_speed(NativeSpeedSteps::Steps128, WIRE_EMERGENCY_STOP),
            0
        );
        // 28-step range: wire 1 decodes through the interleaving to 0.
        assert_eq!(from_wire_speed(NativeSpeedSteps::Steps28, 0x01), 0);
    }

    #[test]
    fn from_wire_ignores_direction_bit() {
        assert_eq!(from_wire_speed(NativeSpeedSteps::Steps128, 0x80 | 0x05), 4);
    }

    #[test]
    fn clamp_dcc_is_identity_within_range() {
        assert_eq!(
            clamp_to_native(DecoderMode::Dcc, NativeSpeedSteps::Steps28, 17),
            17
        );
        assert_eq!(
            clamp_to_native(DecoderMode::Dcc, NativeSpeedSteps::Steps28, 40),
            28
        );
        assert_eq!(
            clamp_to_native(DecoderMode::Dcc, NativeSpeedSteps::Steps128, 130),
            126
        );
    }

    #[test]
    fn clamp_motorola_14_identity() {
        assert_eq!(
            clamp_to_native(DecoderMode::Motorola, NativeSpeedSteps::Steps14, 9),
            9
        );
        assert_eq!(
            clamp_to_native(DecoderMode::Motorola, NativeSpeedSteps::Steps14, 20),
            14
        );
    }

    #[test]
    fn clamp_motorola_28_doubles() {
        assert_eq!(
            clamp_to_native(DecoderMode::Motorola, NativeSpeedSteps::Steps28, 7),
            14
        );
        assert_eq!(
            clamp_to_native(DecoderMode::Motorola, NativeSpeedSteps::Steps28, 14),
            28
        );
        assert_eq!(
            clamp_to_native(DecoderMode::Motorola, NativeSpeedSteps::Steps28, 20),
            28
        );
    }

    #[test]
    fn clamp_motorola_128_scales_and_caps() {
        // ceil(1 * 4.6) = 5
        assert_eq!(
            clamp_to_native(DecoderMode::Motorola, NativeSpeedSteps::Steps128, 1),
            5
        );
        // ceil(10 * 4.6) = 46
        assert_eq!(
            clamp_to_native(DecoderMode::Motorola, NativeSpeedSteps::Steps128, 10),
            46
        );
        // ceil(28 * 4.6) = 129, capped at 126
        assert_eq!(
            clamp_to_native(DecoderMode::Motorola, NativeSpeedSteps::Steps128, 28),
            126
        );
    }
}
