use thiserror::Error;

use crate::domain::AXIS_MAX;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("axis value {value} is outside the encodable range 0..={max}", max = AXIS_MAX)]
    OutOfRange { value: i64 },
    #[error("{command} has no wire form")]
    NoWireForm { command: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameDecodeError {
    #[error("command frame must start with 'd': {0:?}")]
    MissingPrefix(String),
    #[error("command frame must carry 16 binary digits: {0:?}")]
    BadLength(String),
    #[error("command frame contains a non-binary digit: {0:?}")]
    NotBinary(String),
    #[error("unknown control pattern: {0:?}")]
    UnknownPattern(String),
}

/// Inbound controller frames that the client does not act on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InboundFrameError {
    #[error("unrecognized controller frame: {0:?}")]
    Unrecognized(String),
    #[error("nonce frame without an integer value: {0:?}")]
    MalformedNonce(String),
}
