//! SQLite implementation of the snapshot store
//!
//! Each entry is kept as its original JSON document (so history reads back
//! losslessly) and normalized into `user_progress` and `language_progress`
//! rows, which back the per-account and per-category queries without
//! loading the full history.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Transaction};

use crate::domain::{
    normalize_account_key, parse_timestamp, AccountMap, AccountRecord, AccountSnapshot,
    SnapshotEntry, TIMESTAMP_FORMAT,
};
use crate::storage::{migrations, retention_cutoff, SnapshotStore, StorageError};

const BACKEND: &str = "sqlite";

/// One account's numbers on one day
#[derive(Debug, Clone, PartialEq)]
pub struct AccountHistoryPoint {
    pub date: NaiveDate,
    pub timestamp: Option<NaiveDateTime>,
    pub streak: u32,
    pub total_xp: u64,
    pub weekly_xp: u64,
    pub daily_xp: u64,
    pub error: Option<String>,
}

/// One category's numbers on one day
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryHistoryPoint {
    pub date: NaiveDate,
    pub timestamp: Option<NaiveDateTime>,
    pub xp: u64,
    pub weekly_xp: u64,
    pub daily_xp: u64,
}

/// Row counts and date range of a database
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseStats {
    pub daily_snapshots: u64,
    pub user_progress_entries: u64,
    pub language_progress_entries: u64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub database_size_bytes: u64,
}

/// SQLite-based storage implementation
///
/// Holds a single connection; the mutex only serializes calls made through
/// one instance.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    retention_days: Option<u32>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    ///
    /// Opens the database file and runs any necessary migrations to ensure
    /// the schema is up to date.
    pub fn new(db_path: PathBuf) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path).map_err(|e| StorageError::Unavailable {
            backend: BACKEND,
            reason: format!("Failed to open database {:?}: {}", db_path, e),
        })?;
        let storage = Self::with_connection(conn, Some(db_path.clone()))?;

        tracing::info!("SQLite storage initialized at: {:?}", db_path);
        Ok(storage)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StorageError> {
        // cascades from daily_snapshots depend on this
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(|e| StorageError::Unavailable {
                backend: BACKEND,
                reason: format!("Failed to enable foreign keys: {}", e),
            })?;

        migrations::initialize_database(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            retention_days: None,
        })
    }

    /// Set the retention horizon applied after each save
    pub fn with_retention(mut self, days: Option<u32>) -> Self {
        self.retention_days = days;
        self
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Unavailable {
            backend: BACKEND,
            reason: "connection lock poisoned".to_string(),
        })
    }

    fn write_entry(&self, entry: &SnapshotEntry) -> Result<(), StorageError> {
        let date = entry.date.format("%Y-%m-%d").to_string();
        let timestamp = entry
            .captured_at
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string());
        let data = serde_json::to_string(&entry.accounts)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // child rows go with the old snapshot through ON DELETE CASCADE
        tx.execute("DELETE FROM daily_snapshots WHERE date = ?1", params![date])?;
        tx.execute(
            "INSERT INTO daily_snapshots (date, timestamp, data) VALUES (?1, ?2, ?3)",
            params![date, timestamp, data],
        )?;
        let snapshot_id = tx.last_insert_rowid();

        for (account_key, record) in &entry.accounts {
            insert_account_rows(&tx, snapshot_id, account_key, record)?;
        }

        tx.commit()?;

        tracing::debug!(
            "Saved snapshot for {} with {} accounts",
            date,
            entry.accounts.len()
        );
        Ok(())
    }

    fn read_history(&self, limit: Option<u32>) -> Result<Vec<SnapshotEntry>, StorageError> {
        let conn = self.conn()?;

        let sql = if let Some(limit_val) = limit {
            format!(
                "SELECT date, timestamp, data FROM daily_snapshots
                 ORDER BY date DESC LIMIT {}",
                limit_val
            )
        } else {
            "SELECT date, timestamp, data FROM daily_snapshots ORDER BY date DESC".to_string()
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let date_str: String = row.get(0)?;
            let date = parse_date_column(&date_str, 0)?;
            let timestamp: Option<String> = row.get(1)?;
            let data: String = row.get(2)?;
            Ok((date, timestamp, data))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (date, timestamp, data) = row?;
            let accounts: AccountMap = serde_json::from_str(&data)?;
            history.push(SnapshotEntry {
                date,
                captured_at: timestamp.as_deref().and_then(parse_timestamp),
                accounts,
            });
        }

        // queried newest first so LIMIT keeps the most recent days
        history.reverse();
        Ok(history)
    }

    fn delete_before(&self, cutoff: NaiveDate) -> Result<usize, StorageError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM daily_snapshots WHERE date < ?1",
            params![cutoff.format("%Y-%m-%d").to_string()],
        )?;

        tracing::info!("Cleaned up {} snapshots older than {}", removed, cutoff);
        Ok(removed)
    }

    /// Remove snapshots older than `keep_days` days before `today`
    pub fn cleanup_old_data(&self, keep_days: u32, today: NaiveDate) -> Result<usize, StorageError> {
        self.delete_before(retention_cutoff(today, keep_days))
    }

    /// The most recent `days` snapshots of one account, oldest first
    pub fn account_history(
        &self,
        account: &str,
        days: u32,
    ) -> Result<Vec<AccountHistoryPoint>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ds.date, ds.timestamp, up.streak, up.total_xp, up.weekly_xp, up.daily_xp, up.error
             FROM daily_snapshots ds
             JOIN user_progress up ON ds.id = up.snapshot_id
             WHERE REPLACE(LOWER(up.username), ' ', '_') = ?1
                OR REPLACE(LOWER(up.account_key), ' ', '_') = ?1
             ORDER BY ds.date DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![normalize_account_key(account), days], |row| {
            let date_str: String = row.get(0)?;
            let timestamp: Option<String> = row.get(1)?;
            Ok(AccountHistoryPoint {
                date: parse_date_column(&date_str, 0)?,
                timestamp: timestamp.as_deref().and_then(parse_timestamp),
                streak: row.get(2)?,
                total_xp: read_count(row.get(3)?),
                weekly_xp: read_count(row.get(4)?),
                daily_xp: read_count(row.get(5)?),
                error: row.get(6)?,
            })
        })?;

        let mut points = Vec::new();
        for point in rows {
            points.push(point?);
        }
        points.reverse();
        Ok(points)
    }

    /// The most recent `days` snapshots of one category, oldest first
    pub fn category_history(
        &self,
        account: &str,
        category: &str,
        days: u32,
    ) -> Result<Vec<CategoryHistoryPoint>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ds.date, ds.timestamp, lp.xp, lp.weekly_xp, lp.daily_xp
             FROM daily_snapshots ds
             JOIN user_progress up ON ds.id = up.snapshot_id
             JOIN language_progress lp ON up.id = lp.user_progress_id
             WHERE (REPLACE(LOWER(up.username), ' ', '_') = ?1
                    OR REPLACE(LOWER(up.account_key), ' ', '_') = ?1)
               AND lp.language = ?2
             ORDER BY ds.date DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![normalize_account_key(account), category, days],
            |row| {
                let date_str: String = row.get(0)?;
                let timestamp: Option<String> = row.get(1)?;
                Ok(CategoryHistoryPoint {
                    date: parse_date_column(&date_str, 0)?,
                    timestamp: timestamp.as_deref().and_then(parse_timestamp),
                    xp: read_count(row.get(2)?),
                    weekly_xp: read_count(row.get(3)?),
                    daily_xp: read_count(row.get(4)?),
                })
            },
        )?;

        let mut points = Vec::new();
        for point in rows {
            points.push(point?);
        }
        points.reverse();
        Ok(points)
    }

    /// Row counts, date range and file size
    pub fn database_stats(&self) -> Result<DatabaseStats, StorageError> {
        let conn = self.conn()?;

        let count = |table: &str| -> Result<u64, StorageError> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(read_count(n))
        };

        let (first, last): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(date), MAX(date) FROM daily_snapshots",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let database_size_bytes = self
            .db_path
            .as_ref()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);

        Ok(DatabaseStats {
            daily_snapshots: count("daily_snapshots")?,
            user_progress_entries: count("user_progress")?,
            language_progress_entries: count("language_progress")?,
            first_date: first.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            last_date: last.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            database_size_bytes,
        })
    }
}

fn parse_date_column(raw: &str, index: usize) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        rusqlite::Error::InvalidColumnType(index, "Invalid date".to_string(), rusqlite::types::Type::Text)
    })
}

fn read_count(value: i64) -> u64 {
    value.max(0) as u64
}

fn write_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn insert_account_rows(
    tx: &Transaction<'_>,
    snapshot_id: i64,
    account_key: &str,
    record: &AccountRecord,
) -> Result<(), StorageError> {
    match record {
        AccountRecord::Snapshot(snapshot) => insert_snapshot_rows(tx, snapshot_id, account_key, snapshot),
        AccountRecord::Failed(failure) => {
            tx.execute(
                "INSERT INTO user_progress
                 (snapshot_id, account_key, username, name, last_check, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    snapshot_id,
                    account_key,
                    failure.username,
                    failure.username,
                    failure.last_check,
                    failure.error
                ],
            )?;
            Ok(())
        }
        AccountRecord::Unreadable(_) => {
            tx.execute(
                "INSERT INTO user_progress
                 (snapshot_id, account_key, username, name, last_check, error)
                 VALUES (?1, ?2, ?3, ?4, '', ?5)",
                params![
                    snapshot_id,
                    account_key,
                    record.username().unwrap_or(account_key),
                    account_key,
                    record.error()
                ],
            )?;
            Ok(())
        }
    }
}

fn insert_snapshot_rows(
    tx: &Transaction<'_>,
    snapshot_id: i64,
    account_key: &str,
    snapshot: &AccountSnapshot,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO user_progress
         (snapshot_id, account_key, username, name, streak, total_xp, weekly_xp, daily_xp, last_check, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
        params![
            snapshot_id,
            account_key,
            snapshot.username,
            snapshot.display_name(),
            snapshot.streak,
            write_count(snapshot.total_xp),
            write_count(snapshot.weekly_xp),
            write_count(snapshot.daily_xp),
            snapshot.last_check
        ],
    )?;
    let user_progress_id = tx.last_insert_rowid();

    for (language, progress) in &snapshot.language_progress {
        let weekly = snapshot.weekly_xp_per_language.get(language).copied().unwrap_or(0);
        let daily = snapshot.daily_xp_per_language.get(language).copied().unwrap_or(0);

        tx.execute(
            "INSERT INTO language_progress
             (user_progress_id, language, level, xp, from_language, learning_language, weekly_xp, daily_xp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user_progress_id,
                language,
                progress.level,
                write_count(progress.xp),
                progress.from_language,
                progress.learning_language,
                write_count(weekly),
                write_count(daily)
            ],
        )?;
    }

    Ok(())
}

#[async_trait]
impl SnapshotStore for SqliteStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn save_entry(&self, entry: &SnapshotEntry) -> Result<(), StorageError> {
        self.write_entry(entry)?;

        if let Some(days) = self.retention_days {
            self.delete_before(retention_cutoff(entry.date, days))?;
        }
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<SnapshotEntry>, StorageError> {
        self.read_history(None)
    }

    async fn trim_before(&self, cutoff: NaiveDate) -> Result<usize, StorageError> {
        self.delete_before(cutoff)
    }

    async fn get_weekly_progress(&self) -> Result<Vec<SnapshotEntry>, StorageError> {
        self.read_history(Some(7))
    }
}
