//! Stand-in for the plotter firmware: applies one command at a time and
//! advances the nonce when it is done.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use shared::{
    domain::Command,
    protocol::{self, InboundFrame},
};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MachineState {
    pub target: (i64, i64),
    pub current: (i64, i64),
    pub pen_down: bool,
    pub nonce: i64,
    pub moves: u64,
}

impl MachineState {
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::MoveTargetX(x) => self.target.0 = x,
            Command::MoveTargetY(y) => self.target.1 = y,
            Command::GoToTarget => {
                self.current = self.target;
                self.moves += 1;
            }
            Command::ResetPosition => self.current = self.target,
            Command::PenUp => self.pen_down = false,
            Command::PenDown => self.pen_down = true,
            Command::Delay(_) => {}
        }
    }
}

#[derive(Clone)]
pub struct Firmware {
    commands: mpsc::UnboundedSender<String>,
    broadcasts: broadcast::Sender<String>,
    state: Arc<RwLock<MachineState>>,
}

impl Firmware {
    pub fn spawn(ack_delay: Duration) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (broadcasts, _) = broadcast::channel(256);
        let state = Arc::new(RwLock::new(MachineState::default()));
        tokio::spawn(run_firmware(
            commands_rx,
            broadcasts.clone(),
            Arc::clone(&state),
            ack_delay,
        ));
        Self {
            commands,
            broadcasts,
            state,
        }
    }

    /// Queues a raw `d…` frame. Frames are executed strictly in arrival order.
    pub fn submit(&self, frame: String) {
        if self.commands.send(frame).is_err() {
            warn!("firmware task is gone; dropping frame");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.broadcasts.subscribe()
    }

    pub async fn snapshot(&self) -> MachineState {
        *self.state.read().await
    }

    pub async fn nonce_frame(&self) -> String {
        InboundFrame::Nonce(self.state.read().await.nonce).render()
    }
}

async fn run_firmware(
    mut commands: mpsc::UnboundedReceiver<String>,
    broadcasts: broadcast::Sender<String>,
    state: Arc<RwLock<MachineState>>,
    ack_delay: Duration,
) {
    while let Some(frame) = commands.recv().await {
        let command = match protocol::decode(&frame) {
            Ok(command) => command,
            Err(err) => {
                warn!(%err, "rejecting command frame");
                continue;
            }
        };
        debug!(command = command.name(), "executing");
        tokio::time::sleep(ack_delay).await;

        let nonce = {
            let mut guard = state.write().await;
            guard.apply(command);
            guard.nonce += 1;
            if matches!(command, Command::GoToTarget | Command::ResetPosition) {
                info!(x = guard.current.0, y = guard.current.1, "position");
            }
            guard.nonce
        };
        let _ = broadcasts.send(InboundFrame::Nonce(nonce).render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_to_target_moves_and_reset_redefines() {
        let mut state = MachineState::default();
        state.apply(Command::MoveTargetX(30));
        state.apply(Command::MoveTargetY(40));
        assert_eq!(state.current, (0, 0));

        state.apply(Command::GoToTarget);
        assert_eq!(state.current, (30, 40));
        assert_eq!(state.moves, 1);

        state.apply(Command::MoveTargetX(5));
        state.apply(Command::ResetPosition);
        assert_eq!(state.current, (5, 40));
        assert_eq!(state.moves, 1);
    }

    #[tokio::test]
    async fn each_frame_advances_the_nonce_once() {
        let firmware = Firmware::spawn(Duration::from_millis(1));
        let mut rx = firmware.subscribe();

        firmware.submit("d1100000000000000".into());
        firmware.submit("garbage".into());
        firmware.submit("d1111100000000000".into());

        assert_eq!(rx.recv().await.expect("first ack"), "NONCE: 1");
        assert_eq!(rx.recv().await.expect("second ack"), "NONCE: 2");
        let state = firmware.snapshot().await;
        assert_eq!(state.nonce, 2);
        assert!(!state.pen_down);
    }
}
