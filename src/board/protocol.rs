//! Wire protocol for the servo board
//!
//! One telemetry frame out, one command frame in. Multi-byte fields are
//! big-endian; signed fields are two's-complement and out-of-range values
//! wrap rather than saturate, matching the firmware this module emulates.
//!
//! # Telemetry (type 0x13, DLC 6)
//!
//! | Byte | Field | Encoding |
//! |------|-------|----------|
//! | 0 | Message type | `0x13` |
//! | 1 | Encoder H | high byte of `encoder_steps mod 2^16` |
//! | 2 | Encoder L | low byte of same |
//! | 3 | Speed H | high byte of `i16(rpm * 100)` |
//! | 4 | Speed L | low byte of same |
//! | 5 | Effort | latched control as `i8` |
//!
//! # Effort command (type 0x10, DLC 2)
//!
//! `data[1]` is a signed 8-bit effort. The values `+1` and `-1` are protocol
//! sentinels meaning "stop without position hold" and `0` means "stop with
//! position hold"; the board applies the sentinel interpretation when it
//! latches the control signal into the servo, not here.

use crate::can::CanFrame;
use crate::error::Result;
use crate::sim::motor::rad_s_to_rpm;

/// Telemetry frame message type
pub const MSG_TELEMETRY: u8 = 0x13;
/// Effort command message type
pub const MSG_EFFORT: u8 = 0x10;
/// Telemetry payload length
pub const TELEMETRY_DLC: usize = 6;
/// Effort command payload length
pub const EFFORT_DLC: usize = 2;

/// Build one telemetry frame for a board
///
/// `angular_velocity` is the motor's instantaneous velocity in rad/s; the
/// wire field carries it as hundredths of RPM.
pub fn telemetry_frame(
    can_id: u16,
    encoder_steps: u32,
    angular_velocity: f64,
    effort: i8,
) -> Result<CanFrame> {
    let encoder = (encoder_steps & 0xFFFF) as u16;
    let speed = ((rad_s_to_rpm(angular_velocity) * 100.0).round() as i64) as i16;

    let data = [
        MSG_TELEMETRY,
        (encoder >> 8) as u8,
        (encoder & 0xFF) as u8,
        ((speed as u16) >> 8) as u8,
        (speed as u16 & 0xFF) as u8,
        effort as u8,
    ];
    CanFrame::new(can_id, &data)
}

/// Decoded view of one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundMessage {
    /// Well-formed effort command
    Effort(i8),
    /// Known type with the wrong DLC; dropped silently
    Malformed,
    /// Unrecognized message type; logged once per board
    Unknown(u8),
    /// DLC 0; nothing to dispatch on
    Empty,
}

/// Decode one inbound frame into a dispatchable message
pub fn decode(frame: &CanFrame) -> InboundMessage {
    let data = frame.data();
    match data {
        [] => InboundMessage::Empty,
        [MSG_EFFORT, value] => InboundMessage::Effort(*value as i8),
        [MSG_EFFORT, ..] => InboundMessage::Malformed,
        [other, ..] => InboundMessage::Unknown(*other),
    }
}
