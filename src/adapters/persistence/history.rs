//! History Store - Atomic JSON Job History Persistence
//!
//! Saves terminal swap jobs to `history.json` using atomic writes
//! (write to tmp file, then rename). The file is always either the
//! old or the new snapshot, never a partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, instrument};

use crate::domain::job::SwapJob;

/// Snapshot format version.
pub const HISTORY_VERSION: u32 = 1;

/// On-disk history snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub jobs: Vec<SwapJob>,
}

/// Atomic JSON store for finished swap jobs.
pub struct HistoryStore {
    /// Path to history.json.
    history_path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl HistoryStore {
    /// Create a history store in the given data directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            history_path: dir.join("history.json"),
            tmp_path: dir.join("history.json.tmp"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.history_path
    }

    /// Save terminal jobs atomically (tmp → rename). Non-terminal jobs
    /// are skipped: they cannot be resumed after a restart.
    #[instrument(skip(self, jobs))]
    pub async fn save<'a>(&self, jobs: impl IntoIterator<Item = &'a SwapJob>) -> Result<usize> {
        let snapshot = HistorySnapshot {
            version: HISTORY_VERSION,
            saved_at: Utc::now(),
            jobs: jobs
                .into_iter()
                .filter(|j| j.state.is_terminal())
                .cloned()
                .collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .context("Failed to serialize history")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp history file")?;

        fs::rename(&self.tmp_path, &self.history_path)
            .await
            .context("Failed to rename history file")?;

        info!(
            path = %self.history_path.display(),
            jobs = snapshot.jobs.len(),
            "Job history saved"
        );

        Ok(snapshot.jobs.len())
    }

    /// Load persisted jobs. Empty on first startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Vec<SwapJob>> {
        if !fs::try_exists(&self.history_path).await.unwrap_or(false) {
            info!("No history file found, starting fresh");
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.history_path)
            .await
            .context("Failed to read history file")?;

        let snapshot: HistorySnapshot =
            serde_json::from_str(&json).context("Failed to parse history JSON")?;

        anyhow::ensure!(
            snapshot.version == HISTORY_VERSION,
            "Unsupported history version {}",
            snapshot.version
        );

        info!(jobs = snapshot.jobs.len(), "Job history loaded");
        Ok(snapshot.jobs)
    }
}
