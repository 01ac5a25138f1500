//! Storage layer for persisting snapshot history
//!
//! Three interchangeable backends implement [`SnapshotStore`]: a flat-file
//! JSON directory, a SQLite database and a GitHub Gist document. All of them
//! keep at most one entry per calendar day (last write wins) and return
//! history sorted ascending by date.

pub mod gist;
pub mod json;
pub mod migrate;
pub mod migrations;
pub mod sqlite;

// Re-export the main storage types
pub use gist::*;
pub use json::*;
pub use migrate::*;
pub use sqlite::*;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use thiserror::Error;

use crate::domain::{AccountMap, DomainError, SnapshotEntry};

/// Errors that can occur during storage operations
///
/// Every variant means the store could not be reached or read. These are
/// always propagated; an empty history is never returned in their place.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{backend} storage unavailable: {reason}")]
    Unavailable { backend: &'static str, reason: String },

    #[error("Database query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage configuration error: {0}")]
    Configuration(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Trait defining the snapshot history contract
///
/// Implementations are not safe under concurrent writer processes; one
/// writer per store is assumed.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;

    /// Upsert a fully formed entry, keyed by its date
    async fn save_entry(&self, entry: &SnapshotEntry) -> Result<(), StorageError>;

    /// Load the full history, ascending by date
    async fn load_history(&self) -> Result<Vec<SnapshotEntry>, StorageError>;

    /// Drop every entry dated before `cutoff`, returning how many went
    async fn trim_before(&self, cutoff: NaiveDate) -> Result<usize, StorageError>;

    /// Upsert the entry for `entry_date`, stamped with the current time
    async fn save(&self, entry_date: NaiveDate, accounts: &AccountMap) -> Result<(), StorageError> {
        let entry = SnapshotEntry::new(entry_date, Local::now().naive_local(), accounts.clone());
        self.save_entry(&entry).await
    }

    /// The most recent seven entries, ascending by date
    async fn get_weekly_progress(&self) -> Result<Vec<SnapshotEntry>, StorageError> {
        let history = self.load_history().await?;
        let skip = history.len().saturating_sub(7);
        Ok(history.into_iter().skip(skip).collect())
    }
}

/// Oldest date kept when retaining `keep_days` days up to `today`
pub fn retention_cutoff(today: NaiveDate, keep_days: u32) -> NaiveDate {
    today - Duration::days(keep_days as i64)
}

/// Which backend a store is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Json,
    Sqlite,
    Gist,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Gist => "gist",
        }
    }
}

impl FromStr for BackendKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(BackendKind::Json),
            "sqlite" => Ok(BackendKind::Sqlite),
            "gist" => Ok(BackendKind::Gist),
            other => Err(DomainError::UnknownBackend(other.to_string())),
        }
    }
}

/// Settings needed to open any of the backends
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Directory for the flat-file backend
    pub data_dir: PathBuf,
    /// SQLite file; defaults to `<data_dir>/league_data.db`
    pub db_path: Option<PathBuf>,
    pub gist: Option<GistCredentials>,
    /// Retention horizon in days; `None` keeps each backend's default
    pub retention_days: Option<u32>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Json,
            data_dir: PathBuf::from("league_data"),
            db_path: None,
            gist: None,
            retention_days: None,
        }
    }
}

impl StorageConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("league_data.db"))
    }

    /// Open the configured backend
    pub fn open(&self) -> Result<Arc<dyn SnapshotStore>, StorageError> {
        self.open_backend(self.backend)
    }

    /// Open a specific backend using these settings
    pub fn open_backend(&self, backend: BackendKind) -> Result<Arc<dyn SnapshotStore>, StorageError> {
        let retention = match backend {
            BackendKind::Json => self.retention_days.or(Some(DEFAULT_JSON_RETENTION_DAYS)),
            BackendKind::Sqlite | BackendKind::Gist => self.retention_days,
        };
        self.build(backend, retention)
    }

    /// Open a backend that never trims on save
    ///
    /// Used for migration targets, which must receive the whole history
    /// regardless of the configured horizon.
    pub fn open_backend_unbounded(
        &self,
        backend: BackendKind,
    ) -> Result<Arc<dyn SnapshotStore>, StorageError> {
        self.build(backend, None)
    }

    fn build(
        &self,
        backend: BackendKind,
        retention_days: Option<u32>,
    ) -> Result<Arc<dyn SnapshotStore>, StorageError> {
        tracing::info!(
            "Opening {} storage backend (retention: {:?} days)",
            backend.as_str(),
            retention_days
        );

        let store: Arc<dyn SnapshotStore> = match backend {
            BackendKind::Json => {
                Arc::new(JsonStorage::new(self.data_dir.clone())?.with_retention(retention_days))
            }
            BackendKind::Sqlite => {
                Arc::new(SqliteStorage::new(self.sqlite_path())?.with_retention(retention_days))
            }
            BackendKind::Gist => {
                let credentials = self.gist.clone().ok_or_else(|| {
                    StorageError::Configuration(
                        "GIST_ID and GITHUB_TOKEN are required for the gist backend".to_string(),
                    )
                })?;
                Arc::new(GistStorage::new(credentials)?.with_retention(retention_days))
            }
        };

        Ok(store)
    }
}
