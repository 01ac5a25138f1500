//! Profile fetcher
//!
//! Pulls the current state of each tracked account from the public profile
//! endpoint. Failures never escape this module: an account that could not
//! be fetched comes back as an [`AccountSnapshotError`] record so one bad
//! profile does not sink the whole run.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{
    AccountMap, AccountRecord, AccountSnapshot, AccountSnapshotError, CategoryProgress,
    TrackedAccount, LAST_CHECK_FORMAT,
};

/// Public profile host
pub const DEFAULT_PROFILE_API: &str = "https://www.duolingo.com";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Errors raised while fetching one profile
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("User not found")]
    UserNotFound,

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed: HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid profile URL: {0}")]
    InvalidUrl(String),
}

/// How the fetcher talks to the profile API
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Scheme and host, without a trailing slash
    pub api_base: String,
    pub timeout: Duration,
    /// Maximum requests in flight
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_PROFILE_API.to_string(),
            timeout: Duration::from_secs(10),
            concurrency: 4,
        }
    }
}

/// Body of `GET /2017-06-30/users?username=...`
#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    pub name: Option<String>,
    #[serde(default)]
    pub total_xp: u64,
    #[serde(default)]
    pub streak: u32,
    pub streak_data: Option<StreakData>,
    #[serde(default)]
    pub courses: Vec<RawCourse>,
    #[serde(default)]
    pub has_plus: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakData {
    pub current_streak: Option<CurrentStreak>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentStreak {
    #[serde(default)]
    pub length: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCourse {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub crowns: u32,
    pub from_language: Option<String>,
    #[serde(default)]
    pub learning_language: String,
}

/// Turn a profile response into a snapshot
///
/// Only courses with XP become categories, keyed by course title. The
/// streak prefers `streakData.currentStreak.length` over the legacy field.
pub fn normalize_profile(
    username: &str,
    response: ProfileResponse,
    checked_at: NaiveDateTime,
) -> Result<AccountSnapshot, FetchError> {
    let user = response
        .users
        .into_iter()
        .next()
        .ok_or(FetchError::UserNotFound)?;

    let streak = match user.streak_data.and_then(|data| data.current_streak) {
        Some(current) => current.length,
        None => user.streak,
    };
    let name = user.name.unwrap_or_else(|| username.to_string());

    let mut snapshot = AccountSnapshot::new(username, &name, streak, user.total_xp);
    let mut languages_xp = 0u64;

    for course in user.courses {
        if course.xp == 0 || course.title.is_empty() {
            continue;
        }
        languages_xp += course.xp;

        let progress = CategoryProgress::new(
            course.crowns,
            course.xp,
            course.from_language.as_deref().unwrap_or("en"),
            &course.learning_language,
        );
        snapshot = snapshot.with_category(&course.title, progress);
    }

    snapshot.last_check = checked_at.format(LAST_CHECK_FORMAT).to_string();
    snapshot
        .extra
        .insert("total_languages_xp".to_string(), Value::from(languages_xp));
    snapshot
        .extra
        .insert("profile_public".to_string(), Value::Bool(true));
    snapshot
        .extra
        .insert("has_plus".to_string(), Value::Bool(user.has_plus));

    Ok(snapshot)
}

/// HTTP client for the public profile endpoint
pub struct ProfileClient {
    config: FetchConfig,
    http_client: reqwest::Client,
}

impl ProfileClient {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn profile_url(&self, username: &str) -> Result<reqwest::Url, FetchError> {
        let base = format!("{}/2017-06-30/users", self.config.api_base.trim_end_matches('/'));
        reqwest::Url::parse_with_params(&base, &[("username", username)])
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))
    }

    /// Fetch and normalize one profile
    pub async fn fetch_profile(&self, username: &str) -> Result<AccountSnapshot, FetchError> {
        let url = self.profile_url(username)?;
        tracing::debug!("Fetching profile for {}", username);

        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/json")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body: ProfileResponse = response.json().await?;
        normalize_profile(username, body, Local::now().naive_local())
    }

    /// Fetch one account, folding any failure into an error record
    pub async fn fetch_account(&self, account: &TrackedAccount) -> AccountRecord {
        match self.fetch_profile(&account.username).await {
            Ok(snapshot) => {
                tracing::info!(
                    "Fetched {}: streak {}, total XP {}",
                    account.display_key,
                    snapshot.streak,
                    snapshot.total_xp
                );
                snapshot.into()
            }
            Err(e) => {
                tracing::warn!("Could not fetch {}: {}", account.display_key, e);
                AccountSnapshotError::new(&account.username, e.to_string(), Local::now().naive_local())
                    .into()
            }
        }
    }

    /// Fetch every tracked account with a bounded number of requests in flight
    pub async fn fetch_all(&self, accounts: &[TrackedAccount]) -> AccountMap {
        tracing::info!(
            "Checking {} accounts ({} at a time)",
            accounts.len(),
            self.config.concurrency
        );

        let fetched: Vec<(String, AccountRecord)> = stream::iter(accounts)
            .map(|account| async move {
                (account.display_key.clone(), self.fetch_account(account).await)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        fetched.into_iter().collect()
    }
}
