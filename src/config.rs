//! Runtime configuration
//!
//! Everything the runner needs is gathered into one [`LeagueConfig`] value
//! in `main` and passed down. Each setting can come from a flag or from the
//! environment variable named in its `env` attribute.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::domain::{Goals, TrackedAccount};
use crate::fetch::{FetchConfig, DEFAULT_PROFILE_API};
use crate::storage::{BackendKind, GistCredentials, StorageConfig, DEFAULT_API_BASE};
use crate::LeagueError;

/// Fully resolved configuration for one run
#[derive(Debug, Clone)]
pub struct LeagueConfig {
    pub accounts: Vec<TrackedAccount>,
    pub goals: Goals,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    /// Directory reports are written to
    pub report_dir: PathBuf,
}

/// Settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Comma separated usernames to track
    #[arg(long, env = "DUOLINGO_USERNAMES", default_value = "")]
    pub usernames: String,

    #[arg(long, env = "WEEKLY_XP_GOAL", default_value_t = 500)]
    pub weekly_xp_goal: u64,

    #[arg(long, env = "STREAK_GOAL", default_value_t = 7)]
    pub streak_goal: u32,

    /// Storage backend: json, sqlite or gist
    #[arg(long, env = "STORAGE_BACKEND", default_value = "json")]
    pub storage_backend: String,

    /// Directory for the flat-file backend (and the default SQLite file)
    #[arg(long, env = "LEAGUE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "SQLITE_DB_PATH")]
    pub sqlite_db_path: Option<PathBuf>,

    #[arg(long, env = "GIST_ID")]
    pub gist_id: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub REST base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_BASE)]
    pub github_api_url: String,

    /// Days of history to keep; unset keeps each backend's default
    #[arg(long, env = "RETENTION_DAYS")]
    pub retention_days: Option<u32>,

    /// Profile API host
    #[arg(long, env = "PROFILE_API_URL", default_value = DEFAULT_PROFILE_API)]
    pub profile_api_url: String,

    /// Profile requests in flight at once
    #[arg(long, env = "FETCH_CONCURRENCY", default_value_t = 4)]
    pub fetch_concurrency: usize,

    /// Profile request timeout in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Directory reports are written to
    #[arg(long, env = "REPORT_DIR", default_value = ".")]
    pub report_dir: PathBuf,
}

impl ConfigArgs {
    /// Validate and resolve into a [`LeagueConfig`]
    ///
    /// `default_data_dir` is only called when no data directory was given.
    pub fn into_config(
        self,
        default_data_dir: impl FnOnce() -> PathBuf,
    ) -> Result<LeagueConfig, LeagueError> {
        let accounts = TrackedAccount::parse_list(&self.usernames)?;
        let backend: BackendKind = self.storage_backend.parse()?;

        let gist = match (self.gist_id, self.github_token) {
            (Some(id), Some(token)) => {
                Some(GistCredentials::new(id, token).with_api_base(self.github_api_url))
            }
            _ => None,
        };

        let storage = StorageConfig {
            backend,
            data_dir: self.data_dir.unwrap_or_else(default_data_dir),
            db_path: self.sqlite_db_path,
            gist,
            retention_days: self.retention_days,
        };

        let fetch = FetchConfig {
            api_base: self.profile_api_url,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            concurrency: self.fetch_concurrency.max(1),
        };

        Ok(LeagueConfig {
            accounts,
            goals: Goals {
                weekly_xp_goal: self.weekly_xp_goal,
                streak_goal: self.streak_goal,
            },
            storage,
            fetch,
            report_dir: self.report_dir,
        })
    }
}
