//! End-to-end tests for the HTTP API.
//!
//! The server runs on an ephemeral port with a real SQLite store and
//! deterministic doubles for the embedding and chat providers.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use reply_harness::config::{Config, LlmConfig, RetrievalConfig, DEFAULT_FALLBACK_REPLY};
use reply_harness::db;
use reply_harness::embedding::EmbeddingProvider;
use reply_harness::error::{ReplyError, Result};
use reply_harness::llm::{ChatModel, Decoding};
use reply_harness::migrate;
use reply_harness::pipeline::ReplyPipeline;
use reply_harness::reply::ReplyGenerator;
use reply_harness::server;
use reply_harness::store::SqliteStore;

/// Letter-frequency vectors: texts sharing letters land close together.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        26
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(ReplyError::Input("text must not be empty".into()));
        }
        let mut v = vec![0.0f32; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        v[0] += 0.01;
        Ok(v)
    }
}

struct CannedModel {
    reply: &'static str,
    delay: Duration,
}

#[async_trait]
impl ChatModel for CannedModel {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, _prompt: &str, _decoding: Decoding) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.to_string())
    }
}

struct TestServer {
    _tmp: TempDir,
    addr: SocketAddr,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

async fn start_server(model: CannedModel, timeout: Duration) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("reply.sqlite");

    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();

    let generator = ReplyGenerator::new(Arc::new(model), &LlmConfig::default()).with_timeout(timeout);
    let pipeline = ReplyPipeline::new(
        Arc::new(LetterEmbedder),
        Arc::new(SqliteStore::new(pool)),
        generator,
        &RetrievalConfig::default(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, Arc::new(pipeline)));

    TestServer {
        _tmp: tmp,
        addr,
        client: reqwest::Client::new(),
    }
}

async fn quick_server() -> TestServer {
    start_server(
        CannedModel {
            reply: "  Thanks for your note, we are on it.  ",
            delay: Duration::ZERO,
        },
        Duration::from_secs(30),
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let srv = quick_server().await;
    let resp = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "OK");
    assert_eq!(body["message"], "Reply assistant API ready");
}

#[tokio::test]
async fn test_ingest_then_generate_reply() {
    let srv = quick_server().await;
    let acme = [
        "Thanks for reaching out, we'll respond soon.",
        "We appreciate your patience.",
    ];

    let (status, body) = srv
        .post("/api/ingest", json!({ "companyName": "acme", "emails": acme }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "ok": true, "inserted": 2 }));

    let (status, body) = srv
        .post(
            "/api/generate-reply",
            json!({ "companyName": "acme", "body": "When will my order ship?" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["reply"], "Thanks for your note, we are on it.");

    let snippets = body["snippets"].as_array().unwrap();
    assert_eq!(snippets.len(), 2);
    for s in snippets {
        assert!(acme.contains(&s.as_str().unwrap()));
    }
}

#[tokio::test]
async fn test_snippets_are_scoped_and_bounded() {
    let srv = quick_server().await;
    let acme: Vec<String> = (0..8).map(|i| format!("Acme reply number {}", i)).collect();
    srv.post("/api/ingest", json!({ "companyName": "acme", "emails": acme }))
        .await;
    srv.post(
        "/api/ingest",
        json!({ "companyName": "globex", "emails": ["Globex handles everything."] }),
    )
    .await;

    let (status, body) = srv
        .post(
            "/api/generate-reply",
            json!({ "companyName": "acme", "body": "Globex handles everything." }),
        )
        .await;
    assert_eq!(status, 200);

    let snippets = body["snippets"].as_array().unwrap();
    assert_eq!(snippets.len(), 5);
    assert!(snippets
        .iter()
        .all(|s| s.as_str().unwrap().starts_with("Acme reply number")));
}

#[tokio::test]
async fn test_unknown_company_gets_reply_without_snippets() {
    let srv = quick_server().await;
    let (status, body) = srv
        .post(
            "/api/generate-reply",
            json!({ "companyName": "initech", "body": "Hello there" }),
        )
        .await;
    assert_eq!(status, 200);
    assert!(!body["reply"].as_str().unwrap().is_empty());
    assert_eq!(body["snippets"], json!([]));
}

#[tokio::test]
async fn test_missing_fields_rejected() {
    let srv = quick_server().await;

    let (status, body) = srv
        .post("/api/generate-reply", json!({ "companyName": "acme" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = srv
        .post("/api/generate-reply", json!({ "companyName": " ", "body": "hi" }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = srv
        .post("/api/ingest", json!({ "emails": ["hi"] }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = srv
        .post("/api/ingest", json!({ "companyName": "acme", "emails": ["ok", ""] }))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let srv = quick_server().await;
    let resp = srv
        .client
        .post(srv.url("/api/generate-reply"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_slow_model_returns_fallback() {
    let srv = start_server(
        CannedModel {
            reply: "too late",
            delay: Duration::from_secs(10),
        },
        Duration::from_millis(200),
    )
    .await;
    srv.post(
        "/api/ingest",
        json!({ "companyName": "acme", "emails": ["We appreciate your patience."] }),
    )
    .await;

    let (status, body) = srv
        .post(
            "/api/generate-reply",
            json!({ "companyName": "acme", "body": "Any update?" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["reply"], DEFAULT_FALLBACK_REPLY);
    assert_eq!(body["snippets"], json!(["We appreciate your patience."]));
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let srv = quick_server().await;
    let resp = srv
        .client
        .get(srv.url("/health"))
        .header("origin", "chrome-extension://abcdef")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap()),
        Some("*")
    );
}
