//! The run loop: walks a step list, one acknowledged command at a time.
//!
//! At most one command is ever in flight. After a frame is sent the loop
//! parks until the controller's nonce moves away from the value sampled just
//! before sending. Stopping is cooperative and only takes effect between
//! steps.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Command, JogDirection, Step},
    error::EncodingError,
    protocol,
};
use tokio::{
    sync::{watch, Mutex, OwnedMutexGuard},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{ack::AckTracker, error::SequencerError, transport::FrameSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Drawing,
}

/// An axis pair where either coordinate may still be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: Option<i64>,
    pub y: Option<i64>,
}

impl Position {
    pub fn at(x: i64, y: i64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }

    pub fn known(&self) -> Option<(i64, i64)> {
        Some((self.x?, self.y?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    pub completed: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
}

/// Everything observers may want to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlotterState {
    pub execution: ExecutionState,
    pub current: Position,
    pub target: Position,
    pub progress: Option<RunProgress>,
}

impl PlotterState {
    pub fn is_idle(&self) -> bool {
        self.execution == ExecutionState::Idle
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.progress.map(|p| Utc::now() - p.started_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing to do; the state never left `Idle`.
    Empty,
    Completed,
    Cancelled,
}

/// A claimed, validated run that has already moved the state to `Drawing`.
struct ActiveRun {
    prepared: Vec<PreparedStep>,
    started_at: DateTime<Utc>,
    _guard: OwnedMutexGuard<()>,
}

struct PreparedStep {
    step: Step,
    frame: Option<String>,
}

fn prepare(steps: &[Step]) -> Result<Vec<PreparedStep>, EncodingError> {
    steps
        .iter()
        .map(|step| {
            let frame = if step.command.is_local() {
                None
            } else {
                Some(protocol::encode(&step.command)?)
            };
            Ok(PreparedStep { step: *step, frame })
        })
        .collect()
}

/// Converts operator text into an axis value.
pub fn parse_user_value(field: &'static str, raw: &str) -> Result<i64, SequencerError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| SequencerError::InvalidUserInput {
            field,
            value: raw.to_string(),
        })
}

pub struct Sequencer {
    sink: Arc<dyn FrameSink>,
    acks: AckTracker,
    state: watch::Sender<PlotterState>,
    busy: Arc<Mutex<()>>,
}

impl Sequencer {
    pub fn new(sink: Arc<dyn FrameSink>, acks: AckTracker) -> Self {
        let (state, _) = watch::channel(PlotterState::default());
        Self {
            sink,
            acks,
            state,
            busy: Arc::new(Mutex::new(())),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlotterState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> PlotterState {
        *self.state.borrow()
    }

    /// Asks the active run to stop at the next step boundary. The command
    /// already on the wire is still waited for and nothing is sent after it.
    /// Jog, reset and pen operations are not affected.
    pub fn stop(&self) {
        let stopped = self.state.send_if_modified(|state| {
            if state.execution == ExecutionState::Idle || state.progress.is_none() {
                return false;
            }
            state.execution = ExecutionState::Idle;
            true
        });
        if stopped {
            info!("stop requested");
        }
    }

    /// Overwrites the current position with one reported by the controller.
    pub fn apply_reported_position(&self, x: i64, y: i64) {
        self.state.send_modify(|state| state.current = Position::at(x, y));
    }

    /// Runs `steps` on a dedicated task.
    ///
    /// The run is claimed and marked `Drawing` before this returns, so a
    /// `stop` issued right afterwards cancels it before anything is sent.
    pub fn start(self: &Arc<Self>, steps: Vec<Step>) -> JoinHandle<Result<RunOutcome, SequencerError>> {
        let begun = self.begin(&steps);
        let sequencer = Arc::clone(self);
        tokio::spawn(async move {
            match begun? {
                Some(run) => sequencer.execute(run).await,
                None => Ok(RunOutcome::Empty),
            }
        })
    }

    pub async fn run(&self, steps: &[Step]) -> Result<RunOutcome, SequencerError> {
        match self.begin(steps)? {
            Some(run) => self.execute(run).await,
            None => Ok(RunOutcome::Empty),
        }
    }

    fn begin(&self, steps: &[Step]) -> Result<Option<ActiveRun>, SequencerError> {
        if steps.is_empty() {
            info!("no drawing to do");
            return Ok(None);
        }
        let guard = self.claim()?;
        let prepared = prepare(steps)?;

        let started_at = Utc::now();
        self.state.send_modify(|state| {
            state.execution = ExecutionState::Drawing;
            state.progress = Some(RunProgress {
                completed: 0,
                total: prepared.len(),
                started_at,
            });
        });
        info!(steps = prepared.len(), "run started");
        Ok(Some(ActiveRun {
            prepared,
            started_at,
            _guard: guard,
        }))
    }

    async fn execute(&self, run: ActiveRun) -> Result<RunOutcome, SequencerError> {
        let result = self.walk(&run.prepared).await;
        self.finish();

        match &result {
            Ok(outcome) => info!(
                ?outcome,
                elapsed_ms = (Utc::now() - run.started_at).num_milliseconds(),
                "run finished"
            ),
            Err(err) => warn!(%err, "run aborted"),
        }
        result
    }

    async fn walk(&self, prepared: &[PreparedStep]) -> Result<RunOutcome, SequencerError> {
        for (index, item) in prepared.iter().enumerate() {
            if self.state.borrow().is_idle() {
                info!(completed = index, total = prepared.len(), "run cancelled");
                return Ok(RunOutcome::Cancelled);
            }
            self.dispatch(item).await?;
            self.state.send_modify(|state| {
                if let Some(progress) = state.progress.as_mut() {
                    progress.completed = index + 1;
                }
            });
        }
        Ok(RunOutcome::Completed)
    }

    pub async fn jog(&self, direction: JogDirection, amount: i64) -> Result<(), SequencerError> {
        let _guard = self.claim()?;
        let current = self
            .snapshot()
            .current
            .known()
            .ok_or(SequencerError::PositionUnknown)?;
        let (x, y) = direction.apply(current, amount)?;
        info!(?direction, amount, x, y, "jogging");
        self.run_one_off(&[
            Step::new(Command::MoveTargetX(x)),
            Step::new(Command::MoveTargetY(y)),
            Step::updating(Command::GoToTarget),
        ])
        .await
    }

    /// Redefines the controller's current position as `(x, y)` without moving.
    pub async fn reset_position(&self, x: i64, y: i64) -> Result<(), SequencerError> {
        let _guard = self.claim()?;
        info!(x, y, "resetting position");
        self.run_one_off(&[
            Step::new(Command::MoveTargetX(x)),
            Step::new(Command::MoveTargetY(y)),
            Step::updating(Command::ResetPosition),
        ])
        .await
    }

    pub async fn pen_up(&self) -> Result<(), SequencerError> {
        let _guard = self.claim()?;
        self.run_one_off(&[Step::new(Command::PenUp)]).await
    }

    pub async fn pen_down(&self) -> Result<(), SequencerError> {
        let _guard = self.claim()?;
        self.run_one_off(&[Step::new(Command::PenDown)]).await
    }

    // Callers hold the busy guard. Not cancellable.
    async fn run_one_off(&self, steps: &[Step]) -> Result<(), SequencerError> {
        let prepared = prepare(steps)?;
        self.state
            .send_modify(|state| state.execution = ExecutionState::Drawing);
        let mut result = Ok(());
        for item in &prepared {
            result = self.dispatch(item).await;
            if result.is_err() {
                break;
            }
        }
        self.finish();
        result
    }

    async fn dispatch(&self, item: &PreparedStep) -> Result<(), SequencerError> {
        let command = item.step.command;
        match (&item.frame, command) {
            (None, Command::Delay(ms)) => {
                debug!(ms, "delay");
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            (None, _) => {}
            (Some(frame), _) => {
                self.note_target(command);
                let observed = self.acks.current_nonce();
                self.sink.send_frame(frame.clone())?;
                let nonce = self.acks.wait_for_change(observed).await;
                debug!(command = command.name(), ?observed, ?nonce, "acknowledged");
            }
        }
        if item.step.expect_update {
            self.state.send_modify(|state| state.current = state.target);
        }
        Ok(())
    }

    fn note_target(&self, command: Command) {
        match command {
            Command::MoveTargetX(x) => self.state.send_modify(|state| state.target.x = Some(x)),
            Command::MoveTargetY(y) => self.state.send_modify(|state| state.target.y = Some(y)),
            _ => {}
        }
    }

    fn claim(&self) -> Result<OwnedMutexGuard<()>, SequencerError> {
        Arc::clone(&self.busy)
            .try_lock_owned()
            .map_err(|_| SequencerError::Busy)
    }

    fn finish(&self) {
        self.state.send_modify(|state| {
            state.execution = ExecutionState::Idle;
            state.progress = None;
        });
    }
}

#[cfg(test)]
#[path = "tests/sequencer_tests.rs"]
mod tests;
