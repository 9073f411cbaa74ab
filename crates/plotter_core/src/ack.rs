//! Tracks the controller's free-running acknowledgment token.

use std::sync::Arc;

use shared::protocol::InboundFrame;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::transport::InboundHandler;

/// Last nonce and address reported by the controller.
///
/// Clones share the same underlying channels.
#[derive(Clone)]
pub struct AckTracker {
    nonce: Arc<watch::Sender<Option<i64>>>,
    address: Arc<watch::Sender<Option<String>>>,
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AckTracker {
    pub fn new() -> Self {
        let (nonce, _) = watch::channel(None);
        let (address, _) = watch::channel(None);
        Self {
            nonce: Arc::new(nonce),
            address: Arc::new(address),
        }
    }

    pub fn current_nonce(&self) -> Option<i64> {
        *self.nonce.borrow()
    }

    pub fn controller_address(&self) -> Option<String> {
        self.address.borrow().clone()
    }

    /// Records a nonce report. Repeating the current value wakes nobody.
    pub fn record_nonce(&self, nonce: i64) {
        self.nonce.send_if_modified(|current| {
            if *current == Some(nonce) {
                return false;
            }
            *current = Some(nonce);
            true
        });
    }

    /// Applies one inbound text frame. Frames that are not recognized are
    /// dropped.
    pub fn observe(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Nonce(nonce)) => {
                debug!(nonce, "controller nonce");
                self.record_nonce(nonce);
            }
            Ok(InboundFrame::Ip(address)) => {
                info!(%address, "controller address");
                self.address.send_replace(Some(address));
            }
            Err(err) => debug!(%err, "ignoring controller frame"),
        }
    }

    /// Resolves once the nonce differs from `observed`. Returns immediately
    /// if it already does.
    pub async fn wait_for_change(&self, observed: Option<i64>) -> Option<i64> {
        let mut rx = self.nonce.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        // Bound so the borrow of `rx` ends before `rx` is dropped.
        let nonce = match rx.wait_for(|nonce| *nonce != observed).await {
            Ok(nonce) => *nonce,
            Err(_) => self.current_nonce(),
        };
        nonce
    }
}

impl InboundHandler for AckTracker {
    fn on_message(&self, text: &str) {
        self.observe(text);
    }
}
