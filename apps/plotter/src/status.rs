use plotter_core::{ExecutionState, PlotterState, Position};
use tokio::sync::watch;
use tracing::info;

fn format_position(position: &Position) -> String {
    match position.known() {
        Some((x, y)) => format!("({x}, {y})"),
        None => "unknown".to_string(),
    }
}

pub fn describe(state: &PlotterState) -> String {
    let execution = match state.execution {
        ExecutionState::Idle => "Idle",
        ExecutionState::Drawing => "Drawing",
    };
    let mut line = format!(
        "{execution} position={} target={}",
        format_position(&state.current),
        format_position(&state.target)
    );
    if let (Some(progress), Some(elapsed)) = (state.progress, state.elapsed()) {
        line.push_str(&format!(
            " progress={}/{} elapsed={}s",
            progress.completed,
            progress.total,
            elapsed.num_seconds()
        ));
    }
    line
}

/// Logs execution changes and every new current position until the
/// sequencer goes away.
pub async fn report_state_changes(mut rx: watch::Receiver<PlotterState>) {
    let mut last = *rx.borrow_and_update();
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        if state.execution != last.execution || state.current != last.current {
            info!("{}", describe(&state));
        }
        last = state;
    }
}
