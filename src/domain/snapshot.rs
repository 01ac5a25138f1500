//! History entities: one SnapshotEntry per calendar day
//!
//! The serialized layout (`date`, `timestamp`, `results`) is shared by every
//! storage backend and by history files produced by earlier versions, so
//! field names here are part of the on-disk contract.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{account_keys_match, AccountMap, CategoryProgress, CategoryXp};

/// Format used for `last_check` strings
pub const LAST_CHECK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format `timestamp` values are written in
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// One account's state at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Upstream username (the stable account key)
    #[serde(default)]
    pub username: String,
    /// Display name, may differ from the username
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub streak: u32,
    pub total_xp: u64,
    #[serde(default)]
    pub weekly_xp: u64,
    #[serde(default)]
    pub weekly_xp_per_language: CategoryXp,
    #[serde(default)]
    pub daily_xp: u64,
    #[serde(default)]
    pub daily_xp_per_language: CategoryXp,
    #[serde(default)]
    pub active_languages: Vec<String>,
    #[serde(default)]
    pub language_progress: BTreeMap<String, CategoryProgress>,
    #[serde(default)]
    pub last_check: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountSnapshot {
    /// Create a snapshot with no derived deltas filled in
    pub fn new(username: &str, name: &str, streak: u32, total_xp: u64) -> Self {
        Self {
            username: username.to_string(),
            name: name.to_string(),
            streak,
            total_xp,
            weekly_xp: 0,
            weekly_xp_per_language: CategoryXp::new(),
            daily_xp: 0,
            daily_xp_per_language: CategoryXp::new(),
            active_languages: Vec::new(),
            language_progress: BTreeMap::new(),
            last_check: String::new(),
            extra: Map::new(),
        }
    }

    /// Add a category, marking it active
    pub fn with_category(mut self, name: &str, progress: CategoryProgress) -> Self {
        if !self.active_languages.iter().any(|l| l == name) {
            self.active_languages.push(name.to_string());
        }
        self.language_progress.insert(name.to_string(), progress);
        self
    }

    /// Name to show in reports, falling back to the username
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.username
        } else {
            &self.name
        }
    }
}

/// Marker stored in place of a snapshot when fetching an account failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshotError {
    #[serde(default)]
    pub username: String,
    pub error: String,
    #[serde(default)]
    pub last_check: String,
    #[serde(default)]
    pub language_progress: BTreeMap<String, CategoryProgress>,
    #[serde(default)]
    pub weekly_xp_per_language: CategoryXp,
    #[serde(default)]
    pub daily_xp_per_language: CategoryXp,
    #[serde(default)]
    pub active_languages: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountSnapshotError {
    pub fn new(username: &str, error: impl Into<String>, checked_at: NaiveDateTime) -> Self {
        Self {
            username: username.to_string(),
            error: error.into(),
            last_check: checked_at.format(LAST_CHECK_FORMAT).to_string(),
            language_progress: BTreeMap::new(),
            weekly_xp_per_language: CategoryXp::new(),
            daily_xp_per_language: CategoryXp::new(),
            active_languages: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// What history holds for one account on one day
///
/// Records are told apart by shape: anything with an `error` string is a
/// failure marker, anything with a `total_xp` is a snapshot, and whatever
/// else turns up is kept verbatim as `Unreadable` so it can be written back
/// without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRecord {
    Failed(AccountSnapshotError),
    Snapshot(AccountSnapshot),
    Unreadable(Value),
}

impl AccountRecord {
    /// The snapshot, if this record holds usable data
    pub fn snapshot(&self) -> Option<&AccountSnapshot> {
        match self {
            AccountRecord::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AccountRecord::Failed(failure) => Some(&failure.error),
            AccountRecord::Unreadable(_) => Some("unreadable history record"),
            AccountRecord::Snapshot(_) => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            AccountRecord::Snapshot(snapshot) => Some(&snapshot.username),
            AccountRecord::Failed(failure) => Some(&failure.username),
            AccountRecord::Unreadable(value) => value.get("username").and_then(Value::as_str),
        }
    }
}

impl From<AccountSnapshot> for AccountRecord {
    fn from(snapshot: AccountSnapshot) -> Self {
        AccountRecord::Snapshot(snapshot)
    }
}

impl From<AccountSnapshotError> for AccountRecord {
    fn from(failure: AccountSnapshotError) -> Self {
        AccountRecord::Failed(failure)
    }
}

/// One history record for one calendar day, across all tracked accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Calendar day; the only key used for ordering and de-duplication
    pub date: NaiveDate,
    /// When the entry was recorded (informational)
    #[serde(
        rename = "timestamp",
        alias = "captured_at",
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp"
    )]
    pub captured_at: Option<NaiveDateTime>,
    #[serde(rename = "results", alias = "accounts")]
    pub accounts: AccountMap,
}

impl SnapshotEntry {
    pub fn new(date: NaiveDate, captured_at: NaiveDateTime, accounts: AccountMap) -> Self {
        Self {
            date,
            captured_at: Some(captured_at),
            accounts,
        }
    }

    /// Find the usable snapshot for an account in this entry
    ///
    /// Matches the display key or the stored username, ignoring case and
    /// treating spaces and underscores alike. Failure markers and unreadable
    /// records never match.
    pub fn find_account(&self, account_key: &str) -> Option<&AccountSnapshot> {
        if let Some(AccountRecord::Snapshot(snapshot)) = self.accounts.get(account_key) {
            return Some(snapshot);
        }

        self.accounts
            .iter()
            .find_map(|(display_key, record)| match record {
                AccountRecord::Snapshot(snapshot)
                    if account_keys_match(display_key, account_key)
                        || (!snapshot.username.is_empty()
                            && account_keys_match(&snapshot.username, account_key)) =>
                {
                    Some(snapshot)
                }
                _ => None,
            })
    }
}

/// Parse a timestamp in any of the forms history files contain
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Sort entries by date and keep only the last entry written for each day
pub fn normalize_history(mut entries: Vec<SnapshotEntry>) -> Vec<SnapshotEntry> {
    // stable sort keeps write order within a day
    entries.sort_by_key(|entry| entry.date);

    let mut history: Vec<SnapshotEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match history.last_mut() {
            Some(last) if last.date == entry.date => *last = entry,
            _ => history.push(entry),
        }
    }
    history
}

/// Replace (or insert) the entry for `entry.date`, keeping the list sorted
pub fn upsert_entry(history: &mut Vec<SnapshotEntry>, entry: SnapshotEntry) {
    history.retain(|existing| existing.date != entry.date);
    history.push(entry);
    history.sort_by_key(|existing| existing.date);
}

/// Decode a JSON history document
///
/// The document must be an array. Entries that cannot be read (no `date`,
/// no `results`) are skipped with a warning rather than failing the load.
pub fn decode_history(json: &str) -> Result<Vec<SnapshotEntry>, serde_json::Error> {
    let raw: Vec<Value> = serde_json::from_str(json)?;

    let mut entries = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<SnapshotEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!("Skipping unreadable history entry #{}: {}", index, e),
        }
    }

    Ok(normalize_history(entries))
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw
            .as_ref()
            .and_then(Value::as_str)
            .and_then(super::parse_timestamp))
    }
}
