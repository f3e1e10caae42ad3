//! Refresh notifications for passive display surfaces.
//!
//! Fire-and-forget: a write or clear asks every active surface to re-render
//! from the latest resolve. Surfaces with externally scheduled rendering
//! treat it as "schedule the next render", not an immediate push.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshReason {
    Saved,
    Cleared,
    ExternalChange,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub reason: RefreshReason,
    pub requested_at: DateTime<Utc>,
}

/// Broadcasts refresh requests to every subscribed surface.
#[derive(Clone)]
pub struct RefreshNotifier {
    sender: broadcast::Sender<RefreshRequest>,
}

impl RefreshNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Ask active surfaces to re-render.
    pub fn request(&self, reason: RefreshReason) {
        let request = RefreshRequest {
            reason,
            requested_at: Utc::now(),
        };
        match self.sender.send(request) {
            Ok(n) => tracing::debug!("Refresh requested ({:?}, {} surfaces)", reason, n),
            // No active surfaces, nothing to re-render.
            Err(_) => tracing::trace!("Refresh requested ({:?}, no surfaces)", reason),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshRequest> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RefreshNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}
