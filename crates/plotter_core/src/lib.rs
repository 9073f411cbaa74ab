//! Motion command sequencing for a websocket-attached pen plotter.

pub mod ack;
pub mod compiler;
pub mod error;
pub mod sequencer;
pub mod transport;

pub use ack::AckTracker;
pub use compiler::{compile, StepCompiler};
pub use error::{SequencerError, TransportError};
pub use sequencer::{
    parse_user_value, ExecutionState, PlotterState, Position, RunOutcome, Sequencer,
};
pub use transport::{controller_url, FrameSink, InboundHandler, TransportEvent, TransportHandle};
