//! Database migration management
//!
//! This module handles creating and updating the SQLite schema for the
//! relational backend. Snapshots are stored both as the original JSON
//! document and normalized into per-account and per-category rows.

use rusqlite::Connection;

use crate::storage::StorageError;

/// Current database schema version
///
/// Increment this when you add new migrations
pub const CURRENT_VERSION: i32 = 1;

/// Initialize the database schema
///
/// Creates all required tables and indexes if they don't exist and records
/// the schema version for future migrations.
pub fn initialize_database(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let current_version = get_current_version(conn)?;

    if current_version < CURRENT_VERSION {
        run_migrations(conn, current_version)?;
        set_version(conn, CURRENT_VERSION)?;
    }

    Ok(())
}

/// Get the current database schema version
pub fn get_current_version(conn: &Connection) -> Result<i32, StorageError> {
    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get::<_, i32>(0)
        })
        .unwrap_or(0); // no row yet means a fresh database

    Ok(version)
}

fn set_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn run_migrations(conn: &Connection, from_version: i32) -> Result<(), StorageError> {
    if from_version < 1 {
        migration_v1(conn)?;
    }

    Ok(())
}

/// Migration to version 1: snapshot, account and category tables
fn migration_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS daily_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL UNIQUE,
            timestamp TEXT,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_progress (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL,
            account_key TEXT NOT NULL,
            username TEXT NOT NULL,
            name TEXT NOT NULL,
            streak INTEGER NOT NULL DEFAULT 0,
            total_xp INTEGER NOT NULL DEFAULT 0,
            weekly_xp INTEGER NOT NULL DEFAULT 0,
            daily_xp INTEGER NOT NULL DEFAULT 0,
            last_check TEXT NOT NULL,
            error TEXT,
            FOREIGN KEY (snapshot_id) REFERENCES daily_snapshots (id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS language_progress (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_progress_id INTEGER NOT NULL,
            language TEXT NOT NULL,
            level INTEGER NOT NULL DEFAULT 0,
            xp INTEGER NOT NULL,
            from_language TEXT NOT NULL,
            learning_language TEXT NOT NULL,
            weekly_xp INTEGER NOT NULL DEFAULT 0,
            daily_xp INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (user_progress_id) REFERENCES user_progress (id) ON DELETE CASCADE
        );",
    )?;

    create_indexes_v1(conn)?;

    tracing::info!("Applied migration v1: Created snapshot history schema");
    Ok(())
}

fn create_indexes_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_daily_snapshots_date
            ON daily_snapshots (date);
        CREATE INDEX IF NOT EXISTS idx_user_progress_username
            ON user_progress (username);
        CREATE INDEX IF NOT EXISTS idx_user_progress_snapshot
            ON user_progress (snapshot_id);
        CREATE INDEX IF NOT EXISTS idx_language_progress_user
            ON language_progress (user_progress_id);
        CREATE INDEX IF NOT EXISTS idx_language_progress_language
            ON language_progress (language);",
    )?;

    tracing::info!("Created database indexes for v1");
    Ok(())
}
