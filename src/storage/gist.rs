//! GitHub Gist storage backend
//!
//! The whole history lives in a single `league_history.json` file inside a
//! gist, read with `GET /gists/{id}` and rewritten with `PATCH`. Reads are
//! cached in memory until the next write or an explicit `clear_cache`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::domain::{decode_history, upsert_entry, SnapshotEntry};
use crate::storage::{retention_cutoff, SnapshotStore, StorageError};
use crate::storage::json::HISTORY_FILE;

/// Public GitHub REST endpoint
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const BACKEND: &str = "gist";
const GITHUB_API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the gist lives and how to authenticate
#[derive(Clone)]
pub struct GistCredentials {
    pub gist_id: String,
    pub token: String,
    /// REST base URL, without a trailing slash
    pub api_base: String,
}

impl GistCredentials {
    pub fn new(gist_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            gist_id: gist_id.into(),
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn gist_url(&self) -> String {
        format!("{}/gists/{}", self.api_base, self.gist_id)
    }
}

// keeps the token out of logs
impl fmt::Debug for GistCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GistCredentials")
            .field("gist_id", &self.gist_id)
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Gist-backed storage implementation
pub struct GistStorage {
    credentials: GistCredentials,
    http_client: reqwest::Client,
    cache: RwLock<Option<Vec<SnapshotEntry>>>,
    retention_days: Option<u32>,
}

impl GistStorage {
    pub fn new(credentials: GistCredentials) -> Result<Self, StorageError> {
        if credentials.gist_id.trim().is_empty() || credentials.token.trim().is_empty() {
            return Err(StorageError::Configuration(
                "GIST_ID and GITHUB_TOKEN must not be empty".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("family-xp-league/", env!("CARGO_PKG_VERSION")))
            .build()?;

        tracing::info!("Gist storage initialized for gist {}", credentials.gist_id);

        Ok(Self {
            credentials,
            http_client,
            cache: RwLock::new(None),
            retention_days: None,
        })
    }

    /// Set the retention horizon applied after each save
    pub fn with_retention(mut self, days: Option<u32>) -> Self {
        self.retention_days = days;
        self
    }

    /// Drop the cached history so the next read goes to the network
    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, self.credentials.gist_url())
            .bearer_auth(&self.credentials.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    async fn fetch_gist(&self) -> Result<Value, StorageError> {
        let url = self.credentials.gist_url();
        tracing::debug!("Fetching gist from {}", url);

        let response = self
            .request(reqwest::Method::GET)
            .send()
            .await
            .map_err(|e| unavailable(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {} from {}", response.status(), url)));
        }

        Ok(response.json().await?)
    }

    async fn update_gist(&self, history: &[SnapshotEntry]) -> Result<(), StorageError> {
        let url = self.credentials.gist_url();
        let payload = json!({
            "files": {
                HISTORY_FILE: { "content": serde_json::to_string_pretty(history)? }
            }
        });

        let response = self
            .request(reqwest::Method::PATCH)
            .json(&payload)
            .send()
            .await
            .map_err(|e| unavailable(format!("request to {} failed: {}", url, e)))?;

        // the remote copy changed (or may have), either way the cache is stale
        self.clear_cache().await;

        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {} from {}", response.status(), url)));
        }

        tracing::info!(
            "Saved {} history entries to gist {}",
            history.len(),
            self.credentials.gist_id
        );
        Ok(())
    }

    async fn read_history(&self) -> Result<Vec<SnapshotEntry>, StorageError> {
        if let Some(history) = self.cache.read().await.as_ref() {
            tracing::debug!("Gist history served from cache");
            return Ok(history.clone());
        }

        let document = self.fetch_gist().await?;
        let Some(history) = parse_gist_document(&document) else {
            return Ok(Vec::new());
        };

        *self.cache.write().await = Some(history.clone());
        Ok(history)
    }
}

fn unavailable(reason: String) -> StorageError {
    StorageError::Unavailable {
        backend: BACKEND,
        reason,
    }
}

/// Extract the history from a gist API document
///
/// `None` when the history file is absent or its content is not a readable
/// history; both count as an empty history that is not worth caching.
pub fn parse_gist_document(document: &Value) -> Option<Vec<SnapshotEntry>> {
    let Some(file) = document.get("files").and_then(|files| files.get(HISTORY_FILE)) else {
        tracing::debug!("Gist has no {} yet", HISTORY_FILE);
        return None;
    };

    let content = file.get("content").and_then(Value::as_str).unwrap_or("[]");
    match decode_history(content) {
        Ok(history) => Some(history),
        Err(e) => {
            tracing::warn!("Gist {} is not valid history, starting fresh: {}", HISTORY_FILE, e);
            None
        }
    }
}

#[async_trait]
impl SnapshotStore for GistStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn save_entry(&self, entry: &SnapshotEntry) -> Result<(), StorageError> {
        let mut history = self.read_history().await?;
        upsert_entry(&mut history, entry.clone());

        if let Some(days) = self.retention_days {
            let cutoff = retention_cutoff(entry.date, days);
            history.retain(|existing| existing.date >= cutoff);
        }

        self.update_gist(&history).await
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
            self.update_gist(&history).await?;
        }

        tracing::info!("Trimmed {} gist entries older than {}", removed, cutoff);
        Ok(removed)
    }
}
