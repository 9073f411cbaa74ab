use shared::error::EncodingError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    #[error("the plotter is busy with another run")]
    Busy,
    #[error("current position is unknown; reset the position first")]
    PositionUnknown,
    #[error("invalid {field}: {value:?} is not a whole number")]
    InvalidUserInput { field: &'static str, value: String },
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
