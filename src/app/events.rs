use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::DownloadModel;

/// App-wide notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The session is no longer valid; the user must sign in again.
    Logout,
    SignedIn { username: String },
    DownloadProgress { id: String, value: u64, size: u64 },
    DownloadFinished { id: String },
    /// Emitted once the queue drains, listing every model that failed.
    DownloadFailed(Vec<DownloadModel>),
}

/// Broadcast bus shared by the session, the downloader and any listeners.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: AppEvent) {
        // No subscribers is not an error.
        if self.tx.send(event).is_err() {
            debug!("Event dropped, no subscribers");
        }
    }
}
