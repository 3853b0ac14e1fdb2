//! Fan-out notifications for download lifecycle events.
//!
//! The start signal is deliberately separate from (and earlier than) the file
//! relocation: the automation side only needs to know its export produced a
//! download, while the rename waits for the bytes to finish landing.

use std::path::PathBuf;

use tokio::sync::broadcast;

/// Identity carried by a download signal when a context was pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadAccount {
    pub number: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// A matching download began. `account` is the pending context's identity
    /// when one was set; listeners must verify it against their own state
    /// before treating this as their confirmation.
    Started { account: Option<DownloadAccount> },
    /// The file reached its final path.
    Completed {
        account: Option<DownloadAccount>,
        path: PathBuf,
    },
}

/// Broadcast hub. Cheap to clone; emitting with no live subscriber is fine.
#[derive(Debug, Clone)]
pub struct DownloadEvents {
    tx: broadcast::Sender<DownloadEvent>,
}

impl DownloadEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: DownloadEvent) {
        // Err here just means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

impl Default for DownloadEvents {
    fn default() -> Self {
        Self::new()
    }
}
