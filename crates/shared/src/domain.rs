use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Largest axis value the controller can address (14 bits).
pub const AXIS_MAX: i64 = (1 << 14) - 1;

/// A single primitive understood by the plotter controller.
///
/// Every variant except [`Command::Delay`] has a wire form; delays are
/// executed locally by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Command {
    MoveTargetX(i64),
    MoveTargetY(i64),
    GoToTarget,
    ResetPosition,
    PenUp,
    PenDown,
    Delay(u64),
}

impl Command {
    pub fn is_local(&self) -> bool {
        matches!(self, Command::Delay(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::MoveTargetX(_) => "move_target_x",
            Command::MoveTargetY(_) => "move_target_y",
            Command::GoToTarget => "go_to_target",
            Command::ResetPosition => "reset_position",
            Command::PenUp => "pen_up",
            Command::PenDown => "pen_down",
            Command::Delay(_) => "delay",
        }
    }
}

/// One compiled unit of work: a command plus whether its acknowledgment
/// moves the tracked current position onto the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub command: Command,
    pub expect_update: bool,
}

impl Step {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            expect_update: false,
        }
    }

    pub fn updating(command: Command) -> Self {
        Self {
            command,
            expect_update: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(point: Point) -> Self {
        [point.x, point.y]
    }
}

/// Straight-line approximation of one drawing path, as produced by the
/// flattener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<Point>,
}

impl Polyline {
    pub fn new(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            points: points.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JogDirection {
    PosX,
    NegX,
    PosY,
    NegY,
}

impl JogDirection {
    /// Applies a jog of `amount` to `(x, y)`. Arithmetic overflow is
    /// reported as an out-of-range axis value.
    pub fn apply(self, (x, y): (i64, i64), amount: i64) -> Result<(i64, i64), EncodingError> {
        let shifted = |axis: i64, add: bool| {
            let moved = if add {
                axis.checked_add(amount)
            } else {
                axis.checked_sub(amount)
            };
            moved.ok_or(EncodingError::OutOfRange {
                value: if add {
                    axis.saturating_add(amount)
                } else {
                    axis.saturating_sub(amount)
                },
            })
        };
        Ok(match self {
            JogDirection::PosX => (shifted(x, true)?, y),
            JogDirection::NegX => (shifted(x, false)?, y),
            JogDirection::PosY => (x, shifted(y, true)?),
            JogDirection::NegY => (x, shifted(y, false)?),
        })
    }
}

impl std::str::FromStr for JogDirection {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "+x" | "x" => Ok(JogDirection::PosX),
            "-x" => Ok(JogDirection::NegX),
            "+y" | "y" => Ok(JogDirection::PosY),
            "-y" => Ok(JogDirection::NegY),
            other => Err(format!("unknown jog direction '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polyline_points_deserialize_from_coordinate_pairs() {
        let lines: Vec<Polyline> =
            serde_json::from_str(r#"[{"points": [[0, 0], [10.5, 20]]}, {"points": []}]"#)
                .expect("parse polylines");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].points[1], Point::new(10.5, 20.0));
        assert!(lines[1].points.is_empty());
    }

    #[test]
    fn jog_direction_moves_only_one_axis() {
        assert_eq!(JogDirection::PosX.apply((100, 100), 50), Ok((150, 100)));
        assert_eq!(JogDirection::NegY.apply((100, 100), 50), Ok((100, 50)));
        assert_eq!("-x".parse::<JogDirection>(), Ok(JogDirection::NegX));
        assert!("z".parse::<JogDirection>().is_err());
    }

    #[test]
    fn jog_overflow_is_out_of_range() {
        assert_eq!(
            JogDirection::PosX.apply((100, 100), i64::MAX),
            Err(EncodingError::OutOfRange { value: i64::MAX })
        );
        assert_eq!(
            JogDirection::NegY.apply((0, -5), i64::MAX),
            Err(EncodingError::OutOfRange { value: i64::MIN })
        );
    }
}
