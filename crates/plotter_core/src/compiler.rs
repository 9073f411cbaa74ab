//! Turns flattened polylines into the ordered step list the sequencer walks.

use shared::domain::{Command, Polyline, Step};

/// Pause after lowering the pen, before the first move.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCompiler {
    settle_delay_ms: u64,
}

impl Default for StepCompiler {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }
}

impl StepCompiler {
    pub fn with_settle_delay(settle_delay_ms: u64) -> Self {
        Self { settle_delay_ms }
    }

    pub fn compile(&self, polylines: &[Polyline]) -> Vec<Step> {
        let moves: usize = polylines.iter().map(|line| line.points.len()).sum();
        let mut steps = Vec::with_capacity(moves * 3 + 3);

        steps.push(Step::new(Command::PenDown));
        steps.push(Step::new(Command::Delay(self.settle_delay_ms)));
        for point in polylines.iter().flat_map(|line| line.points.iter()) {
            steps.push(Step::new(Command::MoveTargetX(round_coordinate(point.x))));
            steps.push(Step::new(Command::MoveTargetY(round_coordinate(point.y))));
            steps.push(Step::updating(Command::GoToTarget));
        }
        steps.push(Step::new(Command::PenUp));
        steps
    }
}

/// Compiles with the default settle delay.
pub fn compile(polylines: &[Polyline]) -> Vec<Step> {
    StepCompiler::default().compile(polylines)
}

/// Nearest integer, halves rounded away from zero. Out-of-range results are
/// left for the encoder to reject.
pub fn round_coordinate(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_polyline_compiles_to_golden_steps() {
        let steps = compile(&[Polyline::new([(0.0, 0.0), (10.0, 20.0)])]);
        assert_eq!(
            steps,
            vec![
                Step::new(Command::PenDown),
                Step::new(Command::Delay(1000)),
                Step::new(Command::MoveTargetX(0)),
                Step::new(Command::MoveTargetY(0)),
                Step::updating(Command::GoToTarget),
                Step::new(Command::MoveTargetX(10)),
                Step::new(Command::MoveTargetY(20)),
                Step::updating(Command::GoToTarget),
                Step::new(Command::PenUp),
            ]
        );
    }

    #[test]
    fn empty_drawing_still_lowers_and_raises_the_pen() {
        let steps = compile(&[]);
        assert_eq!(
            steps,
            vec![
                Step::new(Command::PenDown),
                Step::new(Command::Delay(1000)),
                Step::new(Command::PenUp),
            ]
        );
    }

    #[test]
    fn empty_polylines_emit_nothing() {
        let steps = compile(&[
            Polyline::default(),
            Polyline::new([(3.0, 4.0)]),
            Polyline::default(),
        ]);
        assert_eq!(steps.len(), 6);
        assert_eq!(steps[2], Step::new(Command::MoveTargetX(3)));
    }

    #[test]
    fn compilation_is_deterministic() {
        let drawing = vec![
            Polyline::new([(1.2, 3.7), (100.5, 99.49)]),
            Polyline::new([(5550.0, 0.0)]),
        ];
        assert_eq!(compile(&drawing), compile(&drawing));
    }

    #[test]
    fn rounds_halves_away_from_zero() {
        assert_eq!(round_coordinate(2.5), 3);
        assert_eq!(round_coordinate(2.49), 2);
        assert_eq!(round_coordinate(-2.5), -3);
        assert_eq!(round_coordinate(0.4), 0);
    }

    #[test]
    fn settle_delay_is_configurable() {
        let steps = StepCompiler::with_settle_delay(250).compile(&[]);
        assert_eq!(steps[1], Step::new(Command::Delay(250)));
    }
}
