/// Behaviour every snapshot store must share
use std::sync::Arc;

use chrono::NaiveDate;
use family_xp_league::*;
use tempfile::TempDir;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn accounts(total_xp: u64) -> AccountMap {
    let mut map = AccountMap::new();
    map.insert(
        "alice".to_string(),
        AccountSnapshot::new("alice", "Alice", 2, total_xp).into(),
    );
    map
}

fn local_stores(dir: &TempDir) -> Vec<Arc<dyn SnapshotStore>> {
    let config = StorageConfig {
        data_dir: dir.path().to_path_buf(),
        ..StorageConfig::default()
    };
    vec![
        config.open_backend(BackendKind::Json).unwrap(),
        config.open_backend(BackendKind::Sqlite).unwrap(),
    ]
}

#[tokio::test]
async fn test_save_is_idempotent_per_day() {
    let dir = TempDir::new().unwrap();
    for store in local_stores(&dir) {
        store.save(day("2026-01-11"), &accounts(10)).await.unwrap();
        store.save(day("2026-01-11"), &accounts(20)).await.unwrap();

        let history = store.load_history().await.unwrap();
        assert_eq!(history.len(), 1, "{}", store.backend_name());
        assert_eq!(history[0].find_account("alice").unwrap().total_xp, 20);
    }
}

#[tokio::test]
async fn test_save_entry_keeps_timestamp() {
    let dir = TempDir::new().unwrap();
    let stamp = day("2025-12-31").and_hms_micro_opt(23, 59, 1, 250_000).unwrap();

    for store in local_stores(&dir) {
        let entry = SnapshotEntry::new(day("2026-01-01"), stamp, accounts(10));
        store.save_entry(&entry).await.unwrap();

        let history = store.load_history().await.unwrap();
        assert_eq!(history[0].captured_at, Some(stamp), "{}", store.backend_name());
    }
}

#[tokio::test]
async fn test_trim_before_is_date_based() {
    let dir = TempDir::new().unwrap();
    for store in local_stores(&dir) {
        for (date, xp) in [("2026-01-01", 1), ("2026-01-05", 2), ("2026-01-09", 3)] {
            store.save(day(date), &accounts(xp)).await.unwrap();
        }

        let removed = store.trim_before(day("2026-01-05")).await.unwrap();
        assert_eq!(removed, 1, "{}", store.backend_name());

        let dates: Vec<NaiveDate> = store.load_history().await.unwrap().iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day("2026-01-05"), day("2026-01-09")]);
    }
}

#[tokio::test]
async fn test_empty_store_has_empty_weekly_progress() {
    let dir = TempDir::new().unwrap();
    for store in local_stores(&dir) {
        assert!(store.get_weekly_progress().await.unwrap().is_empty());
    }
}
