//! Reconnecting websocket link to the controller.
//!
//! A background task owns the socket. Outbound frames reach it through an
//! mpsc queue; inbound text frames are handed to an [`InboundHandler`] that
//! stays installed across reconnects.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use shared::protocol::{REQUEST_IP, REQUEST_NONCE};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TransportError;

pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const WS_PATH: &str = "/ws";

/// Receives controller frames. Installed once, reused for every connection.
pub trait InboundHandler: Send + Sync {
    fn on_message(&self, text: &str);

    fn on_close(&self) {}
}

/// Anything the sequencer can push a command frame into.
pub trait FrameSink: Send + Sync {
    /// Fire-and-forget; success only means the frame was queued.
    fn send_frame(&self, frame: String) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected { attempt: u64 },
    Closed,
}

/// Builds `ws://<host>/ws` from a bare host, a `host:port` pair or a full
/// `ws://` / `http://` URL.
pub fn controller_url(host: &str) -> Result<Url, url::ParseError> {
    let host = host.trim().trim_end_matches('/');
    let raw = if let Some(rest) = host.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = host.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if host.starts_with("ws://") || host.starts_with("wss://") {
        host.to_string()
    } else {
        format!("ws://{host}")
    };
    let mut url = Url::parse(&raw)?;
    if url.path() == "/" || url.path().is_empty() {
        url.set_path(WS_PATH);
    }
    Ok(url)
}

pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<TransportEvent>,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Starts the connection task. Connecting happens in the background; a
    /// failed connect is treated like a close.
    pub fn spawn(url: Url, backoff: Duration, handler: Arc<dyn InboundHandler>) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let task = tokio::spawn(run_connection_loop(
            url,
            backoff,
            handler,
            outbound_rx,
            events.clone(),
        ));
        Self {
            outbound,
            events,
            task,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl FrameSink for TransportHandle {
    fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        debug!(%frame, "queueing frame");
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_connection_loop(
    url: Url,
    backoff: Duration,
    handler: Arc<dyn InboundHandler>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events: broadcast::Sender<TransportEvent>,
) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!(%url, attempt, "connected to controller");
                let _ = events.send(TransportEvent::Connected { attempt });
                let (mut writer, mut reader) = ws_stream.split();

                let mut open = true;
                for request in [REQUEST_IP, REQUEST_NONCE] {
                    if let Err(err) = writer.send(Message::Text(request.to_string())).await {
                        warn!(%err, "failed to send resync request");
                        open = false;
                        break;
                    }
                }

                while open {
                    tokio::select! {
                        frame = outbound_rx.recv() => {
                            let Some(frame) = frame else {
                                let _ = writer.close().await;
                                return;
                            };
                            if let Err(err) = writer.send(Message::Text(frame)).await {
                                warn!(%err, "websocket send failed");
                                open = false;
                            }
                        }
                        msg = reader.next() => match msg {
                            Some(Ok(Message::Text(text))) => handler.on_message(&text),
                            Some(Ok(Message::Close(_))) | None => open = false,
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                warn!(%err, "websocket receive failed");
                                open = false;
                            }
                        },
                    }
                }

                handler.on_close();
                let _ = events.send(TransportEvent::Closed);
            }
            Err(err) => warn!(%url, attempt, %err, "failed to connect to controller"),
        }

        info!(backoff_ms = backoff.as_millis() as u64, "reconnecting after backoff");
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
