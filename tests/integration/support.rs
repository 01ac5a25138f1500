//! Mock HTTP endpoints for exercising the network-facing code

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use wiremock::matchers::path_regex;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Value of header `name` on a recorded request
pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|value| value.to_str().ok())
}

/// Requests the server has seen with HTTP method `verb`
pub async fn count(server: &MockServer, verb: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == verb)
        .count()
}

/// In-memory stand-in for one gist holding `league_history.json`
#[derive(Clone, Default)]
pub struct FakeGist {
    content: Arc<Mutex<Option<String>>>,
}

impl FakeGist {
    pub fn with_content(content: &str) -> Self {
        Self {
            content: Arc::new(Mutex::new(Some(content.to_string()))),
        }
    }

    pub fn content(&self) -> Option<String> {
        self.content.lock().unwrap().clone()
    }

    /// Start a mock server answering `/gists/{id}` from this gist
    pub async fn serve(&self) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(path_regex(r"^/gists/[^/]+$"))
            .respond_with(self.clone())
            .mount(&server)
            .await;
        server
    }
}

impl Respond for FakeGist {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match request.method.as_str() {
            "GET" => {
                let files = match self.content() {
                    Some(content) => json!({"league_history.json": {"content": content}}),
                    None => json!({}),
                };
                ResponseTemplate::new(200).set_body_json(json!({"id": "abc", "files": files}))
            }
            "PATCH" => {
                let payload: Value = serde_json::from_slice(&request.body).unwrap();
                let content = payload["files"]["league_history.json"]["content"]
                    .as_str()
                    .unwrap()
                    .to_string();
                *self.content.lock().unwrap() = Some(content);
                ResponseTemplate::new(200).set_body_json(json!({}))
            }
            _ => ResponseTemplate::new(405),
        }
    }
}
