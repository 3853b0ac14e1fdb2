//! Watches the staging download directory and applies the rename contract.
//!
//! The browser is pointed at a staging directory inside the export root.
//! Completed files are moved to their final dated location; in-progress
//! `.crdownload` files only announce that a download has begun.
//!
//! The pending context is consumed when a matching download is first
//! observed, not when it finishes. The orchestrator may publish the next
//! account's context as soon as it sees the start signal, so deferring
//! consumption to completion could attribute a slow file to the wrong
//! account.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

use super::{
    is_export_download, statement_path, ContextSlot, DownloadAccount, DownloadEvent,
    DownloadEvents,
};

const PARTIAL_SUFFIX: &str = ".crdownload";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A download we have announced and are waiting to finish.
struct PendingRename {
    account: Option<DownloadAccount>,
    /// Final location; `None` means no context was pending and the file keeps
    /// its default name in place.
    target: Option<PathBuf>,
}

pub struct DownloadWatcher {
    staging_dir: PathBuf,
    download_root: PathBuf,
    slot: Arc<ContextSlot>,
    events: DownloadEvents,
    clock: Arc<dyn Clock>,
}

impl DownloadWatcher {
    pub fn new(
        staging_dir: PathBuf,
        download_root: PathBuf,
        slot: Arc<ContextSlot>,
        events: DownloadEvents,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            staging_dir,
            download_root,
            slot,
            events,
            clock,
        }
    }

    /// Poll the staging directory until cancelled. Meant to be spawned
    /// alongside the browser session.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        fs::create_dir_all(&self.staging_dir)
            .await
            .context("Failed to create staging directory")?;

        // Files present before we start are not ours.
        let mut known = self.snapshot().await?;
        let mut pending: HashMap<String, PendingRename> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(POLL_INTERVAL) => {}
            }

            if let Err(err) = self.tick(&mut known, &mut pending).await {
                tracing::warn!(error = %err, "download watch tick failed");
            }
        }
    }

    async fn snapshot(&self) -> Result<HashSet<PathBuf>> {
        let mut files = HashSet::new();
        let mut entries = fs::read_dir(&self.staging_dir)
            .await
            .context("Failed to read staging directory")?;
        while let Some(entry) = entries.next_entry().await? {
            files.insert(entry.path());
        }
        Ok(files)
    }

    async fn tick(
        &self,
        known: &mut HashSet<PathBuf>,
        pending: &mut HashMap<String, PendingRename>,
    ) -> Result<()> {
        let current = self.snapshot().await?;

        for path in &current {
            if known.contains(path) {
                continue;
            }
            known.insert(path.clone());

            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned)
            else {
                continue;
            };

            if let Some(final_name) = name.strip_suffix(PARTIAL_SUFFIX) {
                self.observe_started(final_name, pending);
            } else {
                self.observe_completed(path, &name, pending).await?;
            }
        }

        Ok(())
    }

    /// A matching download has begun: consume the context and broadcast
    /// immediately, without waiting for the bytes.
    fn observe_started(&self, final_name: &str, pending: &mut HashMap<String, PendingRename>) {
        if !is_export_download(final_name) || pending.contains_key(final_name) {
            return;
        }

        let rename = self.claim_context();
        tracing::info!(file = final_name, account = ?rename.account, "download started");
        self.events.emit(DownloadEvent::Started {
            account: rename.account.clone(),
        });
        pending.insert(final_name.to_string(), rename);
    }

    async fn observe_completed(
        &self,
        path: &Path,
        name: &str,
        pending: &mut HashMap<String, PendingRename>,
    ) -> Result<()> {
        if !is_export_download(name) {
            return Ok(());
        }

        // Fast downloads can land without a visible partial phase; announce
        // them on the way through.
        let rename = match pending.remove(name) {
            Some(rename) => rename,
            None => {
                let rename = self.claim_context();
                tracing::info!(file = name, account = ?rename.account, "download started");
                self.events.emit(DownloadEvent::Started {
                    account: rename.account.clone(),
                });
                rename
            }
        };

        let final_path = match rename.target {
            Some(target) => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .context("Failed to create export date folder")?;
                }
                fs::rename(path, &target)
                    .await
                    .with_context(|| format!("Failed to move download to {}", target.display()))?;
                tracing::info!(to = %target.display(), "statement stored");
                target
            }
            // No context was pending: the file keeps its default name.
            None => path.to_path_buf(),
        };

        self.events.emit(DownloadEvent::Completed {
            account: rename.account,
            path: final_path,
        });
        Ok(())
    }

    fn claim_context(&self) -> PendingRename {
        match self.slot.take() {
            Some(context) => PendingRename {
                account: Some(DownloadAccount {
                    number: context.account_number.clone(),
                    title: context.account_title.clone(),
                }),
                target: Some(statement_path(
                    &self.download_root,
                    self.clock.today(),
                    &context,
                )),
            },
            None => PendingRename {
                account: None,
                target: None,
            },
        }
    }
}
