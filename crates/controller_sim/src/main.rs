use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use shared::protocol::{InboundFrame, COMMAND_PREFIX, REQUEST_IP, REQUEST_NONCE};
use tracing::{debug, info};

mod config;
mod firmware;

use config::load_settings;
use firmware::{Firmware, MachineState};

struct AppState {
    firmware: Firmware,
    reported_ip: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = load_settings();
    let state = AppState {
        firmware: Firmware::spawn(settings.ack_delay),
        reported_ip: settings.reported_ip(),
    };
    let app = build_router(Arc::new(state));

    let addr = settings.socket_addr()?;
    info!(%addr, ack_delay_ms = settings.ack_delay.as_millis() as u64, "controller simulator listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/state", get(machine_state))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn machine_state(State(state): State<Arc<AppState>>) -> Json<MachineState> {
    Json(state.firmware.snapshot().await)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcasts = state.firmware.subscribe();
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    info!("client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(text) => text,
                    None => break,
                },
                broadcast = broadcasts.recv() => match broadcast {
                    Ok(text) => text,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                },
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        match text.as_str() {
            REQUEST_IP => {
                let _ = reply_tx.send(InboundFrame::Ip(state.reported_ip.clone()).render());
            }
            REQUEST_NONCE => {
                let _ = reply_tx.send(state.firmware.nonce_frame().await);
            }
            frame if frame.starts_with(COMMAND_PREFIX) => state.firmware.submit(frame.to_string()),
            other => debug!(frame = other, "ignoring client frame"),
        }
    }

    send_task.abort();
    info!("client disconnected");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
