/// End-to-end runs against a mock profile API
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use family_xp_league::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn at(date: &str, time: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M:%S").unwrap()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Profile for `alice` whose XP can be changed between runs
struct AliceProfile {
    xp: Arc<Mutex<u64>>,
}

impl Respond for AliceProfile {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let xp = *self.xp.lock().unwrap();
        ResponseTemplate::new(200).set_body_json(json!({"users": [{
            "name": "Alice",
            "totalXp": xp,
            "streakData": {"currentStreak": {"length": 12}},
            "courses": [{"title": "Spanish", "xp": xp, "crowns": 4,
                         "fromLanguage": "en", "learningLanguage": "es"}]
        }]}))
    }
}

/// Profile API knowing `alice`, missing `ghost` and failing for `broken`
async fn profile_api(alice_xp: Arc<Mutex<u64>>) -> MockServer {
    let server = MockServer::start().await;
    let users = || Mock::given(method("GET")).and(path("/2017-06-30/users"));

    users()
        .and(query_param("username", "alice"))
        .respond_with(AliceProfile { xp: alice_xp })
        .mount(&server)
        .await;
    users()
        .and(query_param("username", "ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": []})))
        .mount(&server)
        .await;
    users()
        .and(query_param("username", "broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    server
}

fn config(server: &MockServer, data_dir: &TempDir, report_dir: &TempDir) -> LeagueConfig {
    LeagueConfig {
        accounts: TrackedAccount::parse_list("alice,ghost,broken").unwrap(),
        goals: Goals::default(),
        storage: StorageConfig {
            backend: BackendKind::Sqlite,
            data_dir: data_dir.path().to_path_buf(),
            ..StorageConfig::default()
        },
        fetch: FetchConfig {
            api_base: server.uri(),
            ..FetchConfig::default()
        },
        report_dir: report_dir.path().to_path_buf(),
    }
}

#[tokio::test]
async fn test_failed_accounts_become_error_records() {
    let xp = Arc::new(Mutex::new(1000));
    let server = profile_api(xp.clone()).await;
    let (data_dir, report_dir) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let runner = LeagueRunner::new(config(&server, &data_dir, &report_dir)).unwrap();

    let outcome = runner.check(at("2026-01-14", "08:00:00")).await.unwrap();

    assert_eq!(outcome.results["ghost"].error(), Some("User not found"));
    assert!(outcome.results["broken"]
        .error()
        .unwrap()
        .starts_with("API request failed"));
    assert_eq!(outcome.results["alice"].snapshot().unwrap().streak, 12);
    assert!(outcome.report_path.is_none());
    assert!(runner.store().load_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_daily_runs_accumulate_deltas() {
    let xp = Arc::new(Mutex::new(1000));
    let server = profile_api(xp.clone()).await;
    let (data_dir, report_dir) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let runner = LeagueRunner::new(config(&server, &data_dir, &report_dir)).unwrap();

    // Monday: first day tracked, nothing to compare against
    let first = runner.run_daily(at("2026-01-12", "07:00:00")).await.unwrap();
    assert_eq!(first.results["alice"].snapshot().unwrap().weekly_xp, 0);

    *xp.lock().unwrap() = 1150;
    let second = runner.run_daily(at("2026-01-13", "07:00:00")).await.unwrap();
    let alice = second.results["alice"].snapshot().unwrap();
    assert_eq!(alice.daily_xp, 150);
    assert_eq!(alice.weekly_xp, 150);
    assert_eq!(alice.weekly_xp_per_language["Spanish"], 150);

    let path = second.report_path.unwrap();
    assert!(path.ends_with("daily_report_20260113.txt"));
    assert!(std::fs::read_to_string(path).unwrap().contains("alice: 12 day streak | 150 weekly XP"));

    let history = runner.store().load_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].find_account("alice").unwrap().daily_xp, 150);
}

#[tokio::test]
async fn test_weekly_run_on_monday_reports_completed_week() {
    let xp = Arc::new(Mutex::new(28272));
    let server = profile_api(xp.clone()).await;
    let (data_dir, report_dir) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let runner = LeagueRunner::new(config(&server, &data_dir, &report_dir)).unwrap();

    for (date, total) in [
        ("2026-01-11", 28272),
        ("2026-01-13", 28295),
        ("2026-01-15", 28570),
        ("2026-01-18", 28570),
    ] {
        *xp.lock().unwrap() = total;
        runner.run_daily(at(date, "07:00:00")).await.unwrap();
    }

    // Monday 2026-01-19, no practice since Sunday
    let outcome = runner.run_weekly(at("2026-01-19", "07:00:00")).await.unwrap();

    let reported = outcome.results["alice"].snapshot().unwrap();
    assert_eq!(reported.weekly_xp, 298);
    assert!(outcome.report.contains("Week ending: 2026-01-18"));
    assert!(outcome.report.contains("Weekly XP: 298"));
    assert!(outcome.report_path.unwrap().ends_with("weekly_report_20260119.txt"));

    let history = runner.store().load_history().await.unwrap();
    let persisted = history.last().unwrap();
    assert_eq!(persisted.date, day("2026-01-19"));
    assert_eq!(persisted.find_account("alice").unwrap().weekly_xp, 0);
}

#[tokio::test]
async fn test_unreadable_store_fails_the_run() {
    let xp = Arc::new(Mutex::new(1000));
    let server = profile_api(xp).await;
    let (data_dir, report_dir) = (TempDir::new().unwrap(), TempDir::new().unwrap());

    let mut config = config(&server, &data_dir, &report_dir);
    config.storage.backend = BackendKind::Json;
    std::fs::write(data_dir.path().join("league_history.json"), "{ broken").unwrap();

    let runner = LeagueRunner::new(config).unwrap();
    let result = runner.run_daily(at("2026-01-12", "07:00:00")).await;

    assert!(matches!(result, Err(LeagueError::Storage(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_migrate_between_configured_backends() {
    let xp = Arc::new(Mutex::new(500));
    let server = profile_api(xp).await;
    let (data_dir, report_dir) = (TempDir::new().unwrap(), TempDir::new().unwrap());

    let mut config = config(&server, &data_dir, &report_dir);
    config.storage.backend = BackendKind::Json;
    let runner = LeagueRunner::new(config.clone()).unwrap();
    runner.run_daily(at("2026-01-12", "07:00:00")).await.unwrap();

    let (migration, validation) =
        LeagueRunner::migrate(&config.storage, BackendKind::Json, BackendKind::Sqlite)
            .await
            .unwrap();
    assert_eq!(migration.migrated, 1);
    assert!(validation.passed());

    let stats = LeagueRunner::stats(&config.storage).unwrap();
    assert_eq!(stats.daily_snapshots, 1);
    assert_eq!(stats.user_progress_entries, 3);
    assert_eq!(stats.first_date, Some(day("2026-01-12")));

    let same = LeagueRunner::migrate(&config.storage, BackendKind::Json, BackendKind::Json).await;
    assert!(matches!(same, Err(LeagueError::Configuration(_))));
}
