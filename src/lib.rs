/// Public library interface for the family XP league
///
/// This module exports the snapshot history stores, the period delta engine
/// and the runner that ties fetching, delta computation, persistence and
/// reporting together for one scheduled run.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

// Internal modules
pub mod analytics;
pub mod config;
pub mod domain;
pub mod fetch;
pub mod report;
pub mod storage;

// Re-export public modules and types
pub use analytics::{DeltaEngine, PeriodDeltas};
pub use config::{ConfigArgs, LeagueConfig};
pub use domain::*;
pub use fetch::{FetchConfig, FetchError, ProfileClient};
pub use report::{daily_report, leaderboard, weekly_report, ReportKind};
pub use storage::{
    BackendKind, DatabaseStats, GistCredentials, GistStorage, JsonStorage, MigrationReport,
    SnapshotStore, SqliteStorage, StorageConfig, StorageError, StorageMigrator, ValidationReport,
};

/// Entries compared when validating a migration
pub const VALIDATION_WINDOW: usize = 30;

/// Errors that can occur during a league run
#[derive(Error, Debug)]
pub enum LeagueError {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration error: {0}")]
    Domain(#[from] domain::DomainError),

    #[error("Fetcher setup error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Configuration(String),
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Records as shown in the report
    pub results: AccountMap,
    pub report: String,
    /// Where the report was written, if it was
    pub report_path: Option<PathBuf>,
}

/// Orchestrates one league run
///
/// History is loaded once, before anything is written, and every delta of
/// the run is computed against that same history.
pub struct LeagueRunner {
    config: LeagueConfig,
    store: Arc<dyn SnapshotStore>,
    fetcher: ProfileClient,
    engine: DeltaEngine,
}

impl LeagueRunner {
    /// Create a runner, opening the configured store
    pub fn new(config: LeagueConfig) -> Result<Self, LeagueError> {
        let store = config.storage.open()?;
        Self::with_store(config, store)
    }

    /// Create a runner on an already opened store
    pub fn with_store(config: LeagueConfig, store: Arc<dyn SnapshotStore>) -> Result<Self, LeagueError> {
        if config.accounts.is_empty() {
            tracing::warn!("No accounts configured; set DUOLINGO_USERNAMES");
        }

        let fetcher = ProfileClient::new(config.fetch.clone())?;
        tracing::info!(
            "League runner ready: {} accounts on {} storage",
            config.accounts.len(),
            store.backend_name()
        );

        Ok(Self {
            config,
            store,
            fetcher,
            engine: DeltaEngine::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn config(&self) -> &LeagueConfig {
        &self.config
    }

    async fn load_and_fetch(&self) -> Result<(Vec<SnapshotEntry>, AccountMap), LeagueError> {
        // a store that cannot be read fails the run before any network traffic
        let history = self.store.load_history().await?;
        tracing::info!(
            "Loaded {} history entries from {} storage",
            history.len(),
            self.store.backend_name()
        );

        let current = self.fetcher.fetch_all(&self.config.accounts).await;
        Ok((history, current))
    }

    /// Fetch and report without persisting anything
    pub async fn check(&self, now: NaiveDateTime) -> Result<RunOutcome, LeagueError> {
        let (history, current) = self.load_and_fetch().await?;
        let results = self.engine.apply_deltas(&current, &history, now.date());
        let report = daily_report(&results, now.date());

        Ok(RunOutcome {
            results,
            report,
            report_path: None,
        })
    }

    /// Daily run: persist today's snapshot and write the daily report
    pub async fn run_daily(&self, now: NaiveDateTime) -> Result<RunOutcome, LeagueError> {
        let today = now.date();
        let (history, current) = self.load_and_fetch().await?;

        let results = self.engine.apply_deltas(&current, &history, today);
        self.store
            .save_entry(&SnapshotEntry::new(today, now, results.clone()))
            .await?;

        let report = daily_report(&results, today);
        let report_path =
            report::write_report(&self.config.report_dir, ReportKind::Daily, today, &report).await?;

        Ok(RunOutcome {
            results,
            report,
            report_path: Some(report_path),
        })
    }

    /// Weekly run: persist today's snapshot, report the week that ended yesterday
    ///
    /// The stored record is computed with today as reference so history
    /// stays correct going forward; the report uses yesterday so a run on
    /// the first day of a week still shows the completed week.
    pub async fn run_weekly(&self, now: NaiveDateTime) -> Result<RunOutcome, LeagueError> {
        let today = now.date();
        let yesterday = today - Duration::days(1);
        let (history, current) = self.load_and_fetch().await?;

        let persisted = self.engine.apply_deltas(&current, &history, today);
        let reported = self.engine.apply_deltas(&current, &history, yesterday);

        self.store
            .save_entry(&SnapshotEntry::new(today, now, persisted))
            .await?;

        let report = weekly_report(&reported, &self.config.goals, yesterday, now);
        let report_path =
            report::write_report(&self.config.report_dir, ReportKind::Weekly, today, &report).await?;

        Ok(RunOutcome {
            results: reported,
            report,
            report_path: Some(report_path),
        })
    }

    /// Copy history between two backends and validate the copy
    ///
    /// The target is opened without a retention horizon so every source
    /// entry lands in it.
    pub async fn migrate(
        config: &StorageConfig,
        from: BackendKind,
        to: BackendKind,
    ) -> Result<(MigrationReport, ValidationReport), LeagueError> {
        if from == to {
            return Err(LeagueError::Configuration(format!(
                "Source and target are both {}",
                from.as_str()
            )));
        }

        let source = config.open_backend(from)?;
        let target = config.open_backend_unbounded(to)?;

        let migration = StorageMigrator::migrate(source.as_ref(), target.as_ref()).await?;
        let validation =
            StorageMigrator::validate(source.as_ref(), target.as_ref(), VALIDATION_WINDOW).await?;

        Ok((migration, validation))
    }

    /// Statistics of the SQLite database named by `config`
    pub fn stats(config: &StorageConfig) -> Result<DatabaseStats, LeagueError> {
        let path = config.sqlite_path();
        if !path.exists() {
            return Err(LeagueError::Configuration(format!(
                "No SQLite database at {}",
                path.display()
            )));
        }

        Ok(SqliteStorage::new(path)?.database_stats()?)
    }
}
