//! Text wire protocol spoken with the plotter controller.
//!
//! Outbound command frames are a literal `d` followed by sixteen ASCII
//! binary digits. Axis commands carry a two-digit opcode and a 14-bit
//! payload; control commands use fixed patterns.

use crate::{
    domain::{Command, AXIS_MAX},
    error::{EncodingError, FrameDecodeError, InboundFrameError},
};

pub const COMMAND_PREFIX: char = 'd';
pub const PAYLOAD_BITS: usize = 14;
const FRAME_DIGITS: usize = 16;

const OPCODE_TARGET_X: &str = "00";
const OPCODE_TARGET_Y: &str = "01";
const PATTERN_GO_TO_TARGET: &str = "1000000000000000";
const PATTERN_RESET_POSITION: &str = "1010000000000000";
const PATTERN_PEN_UP: &str = "1111100000000000";
const PATTERN_PEN_DOWN: &str = "1100000000000000";

/// Control frame asking the controller to report its address.
pub const REQUEST_IP: &str = "ip";
/// Control frame asking the controller to report its current nonce.
pub const REQUEST_NONCE: &str = "nonce";

const IP_PREFIX: &str = "IP: ";
const NONCE_PREFIX: &str = "NONCE: ";

pub fn encode(command: &Command) -> Result<String, EncodingError> {
    let digits = match *command {
        Command::MoveTargetX(value) => format!("{OPCODE_TARGET_X}{}", axis_bits(value)?),
        Command::MoveTargetY(value) => format!("{OPCODE_TARGET_Y}{}", axis_bits(value)?),
        Command::GoToTarget => PATTERN_GO_TO_TARGET.to_string(),
        Command::ResetPosition => PATTERN_RESET_POSITION.to_string(),
        Command::PenUp => PATTERN_PEN_UP.to_string(),
        Command::PenDown => PATTERN_PEN_DOWN.to_string(),
        Command::Delay(_) => {
            return Err(EncodingError::NoWireForm {
                command: command.name(),
            })
        }
    };
    Ok(format!("{COMMAND_PREFIX}{digits}"))
}

fn axis_bits(value: i64) -> Result<String, EncodingError> {
    if !(0..=AXIS_MAX).contains(&value) {
        return Err(EncodingError::OutOfRange { value });
    }
    Ok(format!("{value:0width$b}", width = PAYLOAD_BITS))
}

pub fn decode(frame: &str) -> Result<Command, FrameDecodeError> {
    let digits = frame
        .strip_prefix(COMMAND_PREFIX)
        .ok_or_else(|| FrameDecodeError::MissingPrefix(frame.to_string()))?;
    if digits.len() != FRAME_DIGITS {
        return Err(FrameDecodeError::BadLength(frame.to_string()));
    }
    if !digits.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(FrameDecodeError::NotBinary(frame.to_string()));
    }

    let (opcode, payload) = digits.split_at(2);
    let command = match opcode {
        OPCODE_TARGET_X => Command::MoveTargetX(payload_value(payload)),
        OPCODE_TARGET_Y => Command::MoveTargetY(payload_value(payload)),
        _ => match digits {
            PATTERN_GO_TO_TARGET => Command::GoToTarget,
            PATTERN_RESET_POSITION => Command::ResetPosition,
            PATTERN_PEN_UP => Command::PenUp,
            PATTERN_PEN_DOWN => Command::PenDown,
            _ => return Err(FrameDecodeError::UnknownPattern(frame.to_string())),
        },
    };
    Ok(command)
}

fn payload_value(payload: &str) -> i64 {
    // Digits were validated above, so the fold cannot see anything but 0/1.
    payload
        .bytes()
        .fold(0, |acc, b| (acc << 1) | i64::from(b - b'0'))
}

/// Frames the controller sends back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Ip(String),
    Nonce(i64),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, InboundFrameError> {
        if let Some(address) = text.strip_prefix(IP_PREFIX) {
            return Ok(InboundFrame::Ip(address.trim().to_string()));
        }
        if let Some(raw) = text.strip_prefix(NONCE_PREFIX) {
            return raw
                .trim()
                .parse::<i64>()
                .map(InboundFrame::Nonce)
                .map_err(|_| InboundFrameError::MalformedNonce(text.to_string()));
        }
        Err(InboundFrameError::Unrecognized(text.to_string()))
    }

    pub fn render(&self) -> String {
        match self {
            InboundFrame::Ip(address) => format!("{IP_PREFIX}{address}"),
            InboundFrame::Nonce(nonce) => format!("{NONCE_PREFIX}{nonce}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fixed_control_patterns() {
        assert_eq!(encode(&Command::GoToTarget).unwrap(), "d1000000000000000");
        assert_eq!(encode(&Command::ResetPosition).unwrap(), "d1010000000000000");
        assert_eq!(encode(&Command::PenUp).unwrap(), "d1111100000000000");
        assert_eq!(encode(&Command::PenDown).unwrap(), "d1100000000000000");
    }

    #[test]
    fn encodes_axis_payload_left_padded() {
        assert_eq!(
            encode(&Command::MoveTargetX(5)).unwrap(),
            "d0000000000000101"
        );
        assert_eq!(
            encode(&Command::MoveTargetY(AXIS_MAX)).unwrap(),
            "d0111111111111111"
        );
        assert_eq!(encode(&Command::MoveTargetX(0)).unwrap().len(), 17);
    }

    #[test]
    fn axis_values_round_trip_across_the_range() {
        for value in [0, 1, 2, 255, 1000, 5550, 8192, AXIS_MAX - 1, AXIS_MAX] {
            for command in [Command::MoveTargetX(value), Command::MoveTargetY(value)] {
                let frame = encode(&command).expect("encode");
                assert_eq!(decode(&frame).expect("decode"), command);
            }
        }
    }

    #[test]
    fn rejects_out_of_range_axis_values() {
        for value in [-1, AXIS_MAX + 1, i64::MAX, i64::MIN] {
            assert_eq!(
                encode(&Command::MoveTargetX(value)),
                Err(EncodingError::OutOfRange { value })
            );
        }
    }

    #[test]
    fn delay_has_no_wire_form() {
        assert!(matches!(
            encode(&Command::Delay(1000)),
            Err(EncodingError::NoWireForm { command: "delay" })
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode("x1000000000000000"), Err(FrameDecodeError::MissingPrefix(_))));
        assert!(matches!(decode("d10"), Err(FrameDecodeError::BadLength(_))));
        assert!(matches!(decode("d10000000000000a0"), Err(FrameDecodeError::NotBinary(_))));
        assert!(matches!(
            decode("d1110000000000000"),
            Err(FrameDecodeError::UnknownPattern(_))
        ));
    }

    #[test]
    fn parses_controller_frames() {
        assert_eq!(
            InboundFrame::parse("IP: 192.168.4.1"),
            Ok(InboundFrame::Ip("192.168.4.1".into()))
        );
        assert_eq!(InboundFrame::parse("NONCE: 42"), Ok(InboundFrame::Nonce(42)));
        assert!(matches!(
            InboundFrame::parse("NONCE: soon"),
            Err(InboundFrameError::MalformedNonce(_))
        ));
        assert!(matches!(
            InboundFrame::parse("TEMP: 31"),
            Err(InboundFrameError::Unrecognized(_))
        ));
        assert_eq!(InboundFrame::Nonce(7).render(), "NONCE: 7");
    }
}
