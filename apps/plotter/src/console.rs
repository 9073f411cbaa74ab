//! Interactive operator console: jog, home, pen toggles and runs from stdin.

use std::{future::Future, path::PathBuf, sync::Arc};

use anyhow::anyhow;
use clap::ValueEnum;
use plotter_core::{parse_user_value, RunOutcome, Sequencer, SequencerError, StepCompiler};
use shared::domain::JogDirection;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::{drawing::load_polylines, status::describe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PenAction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Draw(PathBuf),
    Jog { direction: JogDirection, amount: i64 },
    Reset { x: i64, y: i64 },
    Pen(PenAction),
    Stop,
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  draw <file.json>            run a flattened drawing
  jog <+x|-x|+y|-y> <amount>  move relative to the current position
  reset <x> <y>               declare the current position
  pen <up|down>               lift or lower the pen
  stop                        stop the active run after the current command
  status                      show position and progress
  quit";

/// Parses one console line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> anyhow::Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("draw", [path]) => ConsoleCommand::Draw(PathBuf::from(*path)),
        ("jog", [direction, amount]) => ConsoleCommand::Jog {
            direction: direction.parse().map_err(|err: String| anyhow!(err))?,
            amount: parse_user_value("jog amount", amount)?,
        },
        ("reset", [x, y]) => ConsoleCommand::Reset {
            x: parse_user_value("x", x)?,
            y: parse_user_value("y", y)?,
        },
        ("pen", [action]) => ConsoleCommand::Pen(
            PenAction::from_str(action, true).map_err(|_| anyhow!("pen takes 'up' or 'down'"))?,
        ),
        ("stop", []) => ConsoleCommand::Stop,
        ("status", []) => ConsoleCommand::Status,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        (other, _) => return Err(anyhow!("unrecognized command '{other}'; try 'help'")),
    };
    Ok(Some(command))
}

pub async fn run_console(sequencer: Arc<Sequencer>, compiler: StepCompiler) -> anyhow::Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                warn!(%err, "invalid input; nothing sent");
                continue;
            }
        };

        match command {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Status => println!("{}", describe(&sequencer.snapshot())),
            ConsoleCommand::Stop => sequencer.stop(),
            ConsoleCommand::Draw(path) => {
                let polylines = match load_polylines(&path).await {
                    Ok(polylines) => polylines,
                    Err(err) => {
                        warn!("{err:#}");
                        continue;
                    }
                };
                let steps = compiler.compile(&polylines);
                info!(polylines = polylines.len(), steps = steps.len(), "drawing loaded");
                let sequencer = Arc::clone(&sequencer);
                spawn_operation("draw", async move {
                    let outcome = sequencer.run(&steps).await?;
                    if outcome == RunOutcome::Cancelled {
                        info!("drawing stopped; the pen is left where it was");
                    }
                    Ok(())
                });
            }
            ConsoleCommand::Jog { direction, amount } => {
                let sequencer = Arc::clone(&sequencer);
                spawn_operation("jog", async move { sequencer.jog(direction, amount).await });
            }
            ConsoleCommand::Reset { x, y } => {
                let sequencer = Arc::clone(&sequencer);
                spawn_operation("reset", async move { sequencer.reset_position(x, y).await });
            }
            ConsoleCommand::Pen(action) => {
                let sequencer = Arc::clone(&sequencer);
                spawn_operation("pen", async move {
                    match action {
                        PenAction::Up => sequencer.pen_up().await,
                        PenAction::Down => sequencer.pen_down().await,
                    }
                });
            }
        }
    }

    sequencer.stop();
    Ok(())
}

/// Runs a plotter operation in the background so the console stays
/// responsive (`stop` must be typeable mid-run).
fn spawn_operation<F>(name: &'static str, operation: F)
where
    F: Future<Output = Result<(), SequencerError>> + Send + 'static,
{
    tokio::spawn(async move {
        match operation.await {
            Ok(()) => info!(operation = name, "done"),
            Err(err) => warn!(operation = name, %err, "operation failed"),
        }
    });
}
