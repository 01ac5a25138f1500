//! Core types used throughout the domain layer
//!
//! Account keys, tracked accounts and per-category progress live here.
//! The account matching rule is deliberately loose (case and space/underscore
//! insensitive) because history written by older versions used both forms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{AccountRecord, DomainError};

/// Current state of every tracked account, keyed by display key
pub type AccountMap = BTreeMap<String, AccountRecord>;

/// Per-category XP deltas, keyed by category name
pub type CategoryXp = BTreeMap<String, u64>;

/// Normalize an account key for matching
///
/// Lowercases and replaces spaces with underscores, so `"Test_User"`,
/// `"test user"` and `"TEST USER"` all compare equal.
pub fn normalize_account_key(key: &str) -> String {
    key.trim().to_lowercase().replace(' ', "_")
}

/// Check whether two account keys refer to the same account
pub fn account_keys_match(a: &str, b: &str) -> bool {
    normalize_account_key(a) == normalize_account_key(b)
}

/// An account the league tracks
///
/// `display_key` is the key used in history maps and reports; `username` is
/// the upstream profile name. They are usually identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAccount {
    pub display_key: String,
    pub username: String,
}

impl TrackedAccount {
    /// Create a tracked account whose display key is the username
    pub fn new(username: &str) -> Result<Self, DomainError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DomainError::InvalidAccountKey(
                "Account username cannot be empty".to_string(),
            ));
        }
        if username.chars().any(|c| c.is_control()) {
            return Err(DomainError::InvalidAccountKey(format!(
                "Account username contains control characters: {:?}",
                username
            )));
        }

        Ok(Self {
            display_key: username.to_string(),
            username: username.to_string(),
        })
    }

    /// Parse a comma separated list of usernames, skipping blanks
    pub fn parse_list(list: &str) -> Result<Vec<Self>, DomainError> {
        list.split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(Self::new)
            .collect()
    }
}

/// Progress in a single category (a language course)
///
/// Only `xp` takes part in delta computation; the rest is descriptive and
/// unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProgress {
    /// Upstream level (crowns)
    #[serde(default)]
    pub level: u32,
    pub xp: u64,
    #[serde(default)]
    pub from_language: String,
    #[serde(default)]
    pub learning_language: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CategoryProgress {
    pub fn new(level: u32, xp: u64, from_language: &str, learning_language: &str) -> Self {
        Self {
            level,
            xp,
            from_language: from_language.to_string(),
            learning_language: learning_language.to_string(),
            extra: Map::new(),
        }
    }
}

/// Goal thresholds the weekly report compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Goals {
    pub weekly_xp_goal: u64,
    pub streak_goal: u32,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            weekly_xp_goal: 500,
            streak_goal: 7,
        }
    }
}
