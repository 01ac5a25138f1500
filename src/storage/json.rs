//! Flat-file storage backend
//!
//! One `daily_YYYY-MM-DD.json` file per day plus a master
//! `league_history.json` holding the full, de-duplicated, date-sorted list.
//! The master file is rewritten in full on every save; writes go through a
//! temp file and a rename so a reader never sees a partial document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{decode_history, upsert_entry, SnapshotEntry};
use crate::storage::{retention_cutoff, SnapshotStore, StorageError};

/// Name of the master history file
pub const HISTORY_FILE: &str = "league_history.json";

/// Days of history the flat-file backend keeps unless told otherwise
pub const DEFAULT_JSON_RETENTION_DAYS: u32 = 90;

const BACKEND: &str = "json";

/// JSON directory storage implementation
pub struct JsonStorage {
    data_dir: PathBuf,
    retention_days: Option<u32>,
}

impl JsonStorage {
    /// Open (creating if needed) a data directory
    pub fn new(data_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("JSON storage initialized at: {:?}", data_dir);

        Ok(Self {
            data_dir,
            retention_days: Some(DEFAULT_JSON_RETENTION_DAYS),
        })
    }

    /// Set the retention horizon; `None` keeps history forever
    pub fn with_retention(mut self, days: Option<u32>) -> Self {
        self.retention_days = days;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir.join(format!("daily_{}.json", date.format("%Y-%m-%d")))
    }

    async fn read_history(&self) -> Result<Vec<SnapshotEntry>, StorageError> {
        let path = self.history_path();
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        decode_history(&contents).map_err(|e| StorageError::Unavailable {
            backend: BACKEND,
            reason: format!("corrupt history file {}: {}", path.display(), e),
        })
    }

    async fn write_history(&self, history: &[SnapshotEntry]) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(history)?;
        write_atomic(&self.history_path(), json.as_bytes()).await
    }

    /// Remove `daily_*.json` files dated before `cutoff`
    async fn prune_daily_files(&self, cutoff: NaiveDate) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.data_dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|n| n.strip_prefix("daily_"))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };

            if date < cutoff {
                tokio::fs::remove_file(item.path()).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("history");
    let temp_path = path.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));

    tokio::fs::write(&temp_path, contents).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    Ok(())
}

#[async_trait]
impl SnapshotStore for JsonStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn save_entry(&self, entry: &SnapshotEntry) -> Result<(), StorageError> {
        // a master that cannot be read leaves the directory untouched
        let mut history = self.read_history().await?;
        upsert_entry(&mut history, entry.clone());

        let cutoff = self.retention_days.map(|days| retention_cutoff(entry.date, days));
        if let Some(cutoff) = cutoff {
            history.retain(|existing| existing.date >= cutoff);
        }

        let daily_path = self.daily_path(entry.date);
        write_atomic(&daily_path, serde_json::to_string_pretty(entry)?.as_bytes()).await?;
        self.write_history(&history).await?;

        if let Some(cutoff) = cutoff {
            self.prune_daily_files(cutoff).await?;
        }

        tracing::debug!(
            "Saved entry for {} to {:?} ({} entries in history)",
            entry.date,
            daily_path,
            history.len()
        );
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<SnapshotEntry>, StorageError> {
        self.read_history().await
    }

    async fn trim_before(&self, cutoff: NaiveDate) -> Result<usize, StorageError> {
        let mut history = self.read_history().await?;
        let before = history.len();
        history.retain(|entry| entry.date >= cutoff);
        let removed = before - history.len();

        if removed > 0 {
            self.write_history(&history).await?;
        }
        self.prune_daily_files(cutoff).await?;

        tracing::info!("Trimmed {} history entries older than {}", removed, cutoff);
        Ok(removed)
    }
}
