//! Copying history between backends and checking the copy

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::domain::SnapshotEntry;
use crate::storage::{SnapshotStore, StorageError};

/// Outcome of a migration run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub total: usize,
    pub migrated: usize,
    /// Dates that could not be written, with the error
    pub failed: Vec<(NaiveDate, String)>,
}

impl MigrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.migrated == self.total
    }
}

/// Outcome of comparing two backends
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub entries_checked: usize,
    pub mismatches: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Moves snapshot history from one store to another
pub struct StorageMigrator;

impl StorageMigrator {
    /// Copy every entry of `source` into `target`, keeping dates and timestamps
    ///
    /// A failed entry is recorded and the run continues; only failing to read
    /// the source aborts.
    pub async fn migrate(
        source: &dyn SnapshotStore,
        target: &dyn SnapshotStore,
    ) -> Result<MigrationReport, StorageError> {
        tracing::info!(
            "Starting migration from {} to {}",
            source.backend_name(),
            target.backend_name()
        );

        let history = source.load_history().await?;
        let mut report = MigrationReport {
            total: history.len(),
            ..MigrationReport::default()
        };

        if history.is_empty() {
            tracing::info!("No history found in {} storage", source.backend_name());
            return Ok(report);
        }

        for entry in &history {
            match target.save_entry(entry).await {
                Ok(()) => {
                    report.migrated += 1;
                    if report.migrated % 10 == 0 {
                        tracing::info!("Migrated {}/{} entries...", report.migrated, report.total);
                    }
                }
                Err(e) => {
                    tracing::error!("Error migrating entry for {}: {}", entry.date, e);
                    report.failed.push((entry.date, e.to_string()));
                }
            }
        }

        tracing::info!(
            "Migration completed: {}/{} entries migrated successfully",
            report.migrated,
            report.total
        );
        Ok(report)
    }

    /// Compare both stores
    ///
    /// The full histories must be the same length. Of the last `last_n`
    /// entries it then checks dates, the account set of each entry, and for accounts with
    /// usable data the total XP, streak and per-category XP.
    pub async fn validate(
        source: &dyn SnapshotStore,
        target: &dyn SnapshotStore,
        last_n: usize,
    ) -> Result<ValidationReport, StorageError> {
        let source_history = source.load_history().await?;
        let target_history = target.load_history().await?;

        let source_tail = tail(&source_history, last_n);
        let target_tail = tail(&target_history, last_n);

        let mut report = ValidationReport {
            entries_checked: source_tail.len(),
            mismatches: Vec::new(),
        };

        if source_history.len() != target_history.len() {
            report.mismatches.push(format!(
                "History length mismatch: source={}, target={}",
                source_history.len(),
                target_history.len()
            ));
            return Ok(report);
        }

        for (source_entry, target_entry) in source_tail.iter().zip(target_tail) {
            compare_entries(source_entry, target_entry, &mut report.mismatches);
        }

        if report.passed() {
            tracing::info!("Migration validation passed for {} entries", report.entries_checked);
        } else {
            tracing::warn!(
                "Migration validation failed with {} mismatches",
                report.mismatches.len()
            );
        }
        Ok(report)
    }
}

fn tail(history: &[SnapshotEntry], n: usize) -> &[SnapshotEntry] {
    &history[history.len().saturating_sub(n)..]
}

fn compare_entries(source: &SnapshotEntry, target: &SnapshotEntry, mismatches: &mut Vec<String>) {
    if source.date != target.date {
        mismatches.push(format!("Date mismatch: {} != {}", source.date, target.date));
        return;
    }

    let source_keys: BTreeSet<&String> = source.accounts.keys().collect();
    let target_keys: BTreeSet<&String> = target.accounts.keys().collect();
    if source_keys != target_keys {
        mismatches.push(format!("Account set mismatch for {}", source.date));
        return;
    }

    for (key, record) in &source.accounts {
        let Some(expected) = record.snapshot() else {
            continue;
        };
        let Some(actual) = target.accounts.get(key).and_then(|r| r.snapshot()) else {
            mismatches.push(format!("{} on {}: snapshot missing in target", key, source.date));
            continue;
        };

        if expected.total_xp != actual.total_xp {
            mismatches.push(format!("{} on {}: total_xp", key, source.date));
        }
        if expected.streak != actual.streak {
            mismatches.push(format!("{} on {}: streak", key, source.date));
        }
        for (category, progress) in &expected.language_progress {
            let target_xp = actual.language_progress.get(category).map(|p| p.xp);
            if target_xp != Some(progress.xp) {
                mismatches.push(format!("{} on {}: {} xp", key, source.date, category));
            }
        }
    }
}
