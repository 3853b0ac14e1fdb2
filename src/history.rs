//! Persisted run history: one JSON file holding the most recent runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use crate::models::ExportLogEntry;

/// The history is a bounded ring: past this many entries, the oldest are
/// silently dropped.
pub const MAX_ENTRIES: usize = 50;

const HISTORY_FILE: &str = "export_history.json";

/// Newest-first run history in a single JSON file under the data directory.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(HISTORY_FILE),
        }
    }

    /// All entries, newest first. A missing file is an empty history.
    pub async fn list(&self) -> Result<Vec<ExportLogEntry>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse history file {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).context("Failed to read history file"),
        }
    }

    /// Prepend an entry, trimming to the bound in the same write so the file
    /// never holds more than [`MAX_ENTRIES`].
    pub async fn append(&self, entry: ExportLogEntry) -> Result<()> {
        let mut entries = self.list().await?;
        entries.insert(0, entry);
        entries.truncate(MAX_ENTRIES);
        self.write(&entries).await
    }

    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove history file"),
        }
    }

    async fn write(&self, entries: &[ExportLogEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create data directory")?;
        }
        let content =
            serde_json::to_string_pretty(entries).context("Failed to serialize history")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write history file {:?}", self.path))?;
        Ok(())
    }
}
