//! Domain module containing the league's core data types
//!
//! This module defines the history entities (SnapshotEntry, AccountRecord,
//! AccountSnapshot) and the calendar periods used by the delta engine.
//! These types mirror the persisted JSON layout so every storage backend
//! can read history written by any other.

pub mod period;
pub mod snapshot;
pub mod types;

// Re-export public types for easy access
pub use period::*;
pub use snapshot::*;
pub use types::*;

use thiserror::Error;

/// Errors that can occur during domain operations
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid account key: {0}")]
    InvalidAccountKey(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Unknown storage backend: {0}. Supported: 'json', 'sqlite', 'gist'")]
    UnknownBackend(String),
}
