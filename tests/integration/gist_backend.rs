/// Gist backend against a mock GitHub API
use chrono::NaiveDate;
use family_xp_league::*;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{count, header, FakeGist};

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn accounts(total_xp: u64) -> AccountMap {
    let mut map = AccountMap::new();
    map.insert(
        "alice".to_string(),
        AccountSnapshot::new("alice", "Alice", 3, total_xp).into(),
    );
    map
}

async fn gist_store(gist: &FakeGist) -> (MockServer, GistStorage) {
    let server = gist.serve().await;
    let credentials = GistCredentials::new("abc", "secret-token").with_api_base(server.uri());
    let store = GistStorage::new(credentials).unwrap();
    (server, store)
}

#[tokio::test]
async fn test_missing_history_file_is_empty() {
    let gist = FakeGist::default();
    let (_server, store) = gist_store(&gist).await;

    assert!(store.load_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_requests_carry_github_headers() {
    let gist = FakeGist::default();
    let (server, store) = gist_store(&gist).await;

    store.load_history().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    assert_eq!(request.method.as_str(), "GET");
    assert_eq!(request.url.path(), "/gists/abc");
    assert_eq!(header(request, "authorization"), Some("Bearer secret-token"));
    assert_eq!(header(request, "accept"), Some("application/vnd.github+json"));
    assert_eq!(header(request, "x-github-api-version"), Some("2022-11-28"));
}

#[tokio::test]
async fn test_save_then_load_round_trip() {
    let gist = FakeGist::default();
    let (_server, store) = gist_store(&gist).await;

    store.save(day("2026-01-12"), &accounts(200)).await.unwrap();
    store.save(day("2026-01-11"), &accounts(100)).await.unwrap();
    store.save(day("2026-01-12"), &accounts(250)).await.unwrap();

    let history = store.load_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].date, day("2026-01-11"));
    assert_eq!(history[1].find_account("alice").unwrap().total_xp, 250);

    let stored: serde_json::Value = serde_json::from_str(&gist.content().unwrap()).unwrap();
    assert_eq!(stored[1]["results"]["alice"]["total_xp"], 250);
}

#[tokio::test]
async fn test_reads_are_cached_until_cleared() {
    let gist = FakeGist::with_content(
        r#"[{"date": "2026-01-11", "timestamp": "2026-01-11T08:00:00", "results": {}}]"#,
    );
    let (server, store) = gist_store(&gist).await;

    store.load_history().await.unwrap();
    store.load_history().await.unwrap();
    assert_eq!(count(&server, "GET").await, 1);

    store.clear_cache().await;
    store.load_history().await.unwrap();
    assert_eq!(count(&server, "GET").await, 2);
}

#[tokio::test]
async fn test_writes_invalidate_cache() {
    let gist = FakeGist::default();
    let (server, store) = gist_store(&gist).await;

    store.save(day("2026-01-11"), &accounts(100)).await.unwrap();
    let history = store.load_history().await.unwrap();

    assert_eq!(history.len(), 1);
    assert_eq!(count(&server, "PATCH").await, 1);
    // one read before the write, one after it
    assert_eq!(count(&server, "GET").await, 2);
}

#[tokio::test]
async fn test_invalid_content_starts_fresh() {
    let gist = FakeGist::with_content("this is not json");
    let (_server, store) = gist_store(&gist).await;

    assert!(store.load_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_http_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let credentials = GistCredentials::new("abc", "token").with_api_base(server.uri());
    let store = GistStorage::new(credentials).unwrap();

    let result = store.load_history().await;
    assert!(matches!(result, Err(StorageError::Unavailable { .. })));
}

#[tokio::test]
async fn test_trim_before_rewrites_gist() {
    let gist = FakeGist::default();
    let (_server, store) = gist_store(&gist).await;

    for (date, xp) in [("2026-01-01", 1), ("2026-01-02", 2), ("2026-01-03", 3)] {
        store.save(day(date), &accounts(xp)).await.unwrap();
    }

    assert_eq!(store.trim_before(day("2026-01-02")).await.unwrap(), 1);
    assert_eq!(store.load_history().await.unwrap().len(), 2);
}
