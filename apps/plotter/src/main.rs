use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plotter_core::{
    controller_url, parse_user_value, AckTracker, RunOutcome, Sequencer, StepCompiler,
    TransportEvent, TransportHandle,
};
use tracing::{info, warn};

mod config;
mod console;
mod drawing;
mod status;

use config::load_settings;
use console::{run_console, PenAction};

#[derive(Parser, Debug)]
#[command(about = "Drive a websocket-attached pen plotter")]
struct Cli {
    /// Settings file; defaults to ./plotter.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Controller host, `host:port` or `ws://` URL.
    #[arg(long)]
    controller: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a flattened drawing (JSON polylines). Ctrl-C stops it.
    Draw { file: PathBuf },
    /// Declare the plotter's current position.
    Reset {
        #[arg(allow_hyphen_values = true)]
        x: String,
        #[arg(allow_hyphen_values = true)]
        y: String,
    },
    /// Lift or lower the pen.
    Pen {
        #[arg(value_enum)]
        action: PenAction,
    },
    /// Interactive console.
    Console,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(controller) = cli.controller {
        settings.controller_host = controller;
    }

    // Validate operator input before touching the network.
    let reset = match &cli.command {
        Command::Reset { x, y } => Some((parse_user_value("x", x)?, parse_user_value("y", y)?)),
        _ => None,
    };

    let url = controller_url(&settings.controller_host)
        .with_context(|| format!("invalid controller address '{}'", settings.controller_host))?;
    info!(%url, "connecting to controller");

    let acks = AckTracker::new();
    let transport = Arc::new(TransportHandle::spawn(
        url,
        settings.reconnect_backoff,
        Arc::new(acks.clone()),
    ));
    tokio::spawn(log_transport_events(transport.subscribe_events()));

    tokio::select! {
        nonce = acks.wait_for_change(None) => info!(?nonce, "controller is ready"),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted before the controller answered");
            return Ok(());
        }
    }

    let sequencer = Arc::new(Sequencer::new(transport, acks));
    tokio::spawn(status::report_state_changes(sequencer.subscribe()));
    let compiler = StepCompiler::with_settle_delay(settings.settle_delay_ms);

    match cli.command {
        Command::Draw { file } => {
            let polylines = drawing::load_polylines(&file).await?;
            let steps = compiler.compile(&polylines);
            info!(polylines = polylines.len(), steps = steps.len(), "drawing loaded");

            let mut run = sequencer.start(steps);
            let outcome = tokio::select! {
                joined = &mut run => joined?,
                _ = tokio::signal::ctrl_c() => {
                    info!("stopping after the current command");
                    sequencer.stop();
                    run.await?
                }
            }?;
            if outcome == RunOutcome::Cancelled {
                warn!("run stopped early; lift the pen manually if needed");
            }
        }
        Command::Reset { .. } => {
            if let Some((x, y)) = reset {
                sequencer.reset_position(x, y).await?;
            }
        }
        Command::Pen { action } => match action {
            PenAction::Up => sequencer.pen_up().await?,
            PenAction::Down => sequencer.pen_down().await?,
        },
        Command::Console => run_console(Arc::clone(&sequencer), compiler).await?,
    }

    println!("{}", status::describe(&sequencer.snapshot()));
    Ok(())
}

async fn log_transport_events(mut events: tokio::sync::broadcast::Receiver<TransportEvent>) {
    while let Ok(event) = events.recv().await {
        match event {
            TransportEvent::Connected { attempt } if attempt > 1 => {
                info!(attempt, "reconnected to controller")
            }
            TransportEvent::Connected { .. } => {}
            TransportEvent::Closed => warn!("controller connection lost; retrying"),
        }
    }
}
