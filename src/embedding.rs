//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`GeminiProvider`]**: calls the Generative Language `embedContent` endpoint.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Also provides vector utilities used by the example stores:
//! - [`cosine_similarity`] / [`cosine_distance`]: compare two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # No Retries
//!
//! Every call to [`EmbeddingProvider::embed`] issues exactly one HTTP request.
//! Failures surface immediately as [`ReplyError::Provider`] so that request
//! latency stays bounded by the configured timeout.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{ReplyError, Result};
use crate::http::{self, post_json, require_env};

/// Trait for embedding providers.
///
/// One long-lived instance per process is created by [`create_provider`]
/// and shared behind an `Arc`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"embedding-001"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    ///
    /// Callers reject vectors of any other length.
    fn dims(&self) -> usize;
    /// Embed one text. Blank text is rejected with [`ReplyError::Input`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(ReplyError::provider("disabled", "embedding provider is disabled"))
    }
}

fn require_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ReplyError::Input("text to embed must not be empty".into()));
    }
    Ok(())
}

fn require_dims(config: &EmbeddingConfig, provider: &str) -> Result<usize> {
    config
        .dims
        .ok_or_else(|| ReplyError::Config(format!("embedding.dims required for {provider}")))
}

fn embedding_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    http::client(Duration::from_secs(config.timeout_secs))
}

/// Every element must be a JSON number; anything else is a provider fault.
fn json_to_vec(provider: &str, values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                ReplyError::provider(provider, format!("non-numeric embedding value at index {i}"))
            })
        })
        .collect()
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini `embedContent` API.
///
/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let dims = require_dims(config, "Gemini")?;
        Self::with_api_key(config, require_env("GEMINI_API_KEY")?, dims)
    }

    fn with_api_key(config: &EmbeddingConfig, api_key: String, dims: usize) -> Result<Self> {
        Ok(Self {
            client: embedding_client(config)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "embedding-001".to_string()),
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        require_text(text)?;
        debug!(provider = "gemini", text_len = text.len(), "embedding text");

        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url, self.model
        );
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        });
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key);

        let json = post_json("gemini", request, &body).await?;
        parse_gemini_response(&json)
    }
}

/// Extracts `embedding.values` from an `embedContent` response.
fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let values = json
        .get("embedding")
        .and_then(|e| e.get("values"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| ReplyError::provider("gemini", "response missing embedding.values"))?;
    json_to_vec("gemini", values)
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI `POST /v1/embeddings` API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let dims = require_dims(config, "OpenAI")?;
        Self::with_api_key(config, require_env("OPENAI_API_KEY")?, dims)
    }

    fn with_api_key(config: &EmbeddingConfig, api_key: String, dims: usize) -> Result<Self> {
        Ok(Self {
            client: embedding_client(config)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        require_text(text)?;
        debug!(provider = "openai", text_len = text.len(), "embedding text");

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let request = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key));

        let json = post_json("openai", request, &body).await?;
        parse_openai_response(&json)
    }
}

/// Extracts the first `data[].embedding` array from an embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| ReplyError::provider("openai", "response missing data[0].embedding"))?;
    json_to_vec("openai", embedding)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| ReplyError::Config("embedding.model required for Ollama".into()))?;
        Ok(Self {
            client: embedding_client(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            dims: require_dims(config, "Ollama")?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        require_text(text)?;
        debug!(provider = "ollama", text_len = text.len(), "embedding text");

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let request = self.client.post(format!("{}/api/embed", self.url));

        let json = post_json("ollama", request, &body).await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .and_then(|e| e.as_array())
        .ok_or_else(|| ReplyError::provider("ollama", "response missing embeddings[0]"))?;
    json_to_vec("ollama", embedding)
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"gemini"` | [`GeminiProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
///
/// # Errors
///
/// Returns [`ReplyError::Config`] for unknown provider names or missing
/// credentials. Callers run this once at startup.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => Err(ReplyError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use reply_harness::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance, `1 - cosine_similarity`, in `[0.0, 2.0]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::StubServer;
    use serde_json::json;

    fn config(provider: &str, url: &str, model: Option<&str>, dims: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.into(),
            model: model.map(str::to_string),
            dims: Some(dims),
            url: Some(url.to_string()),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_gemini_response() {
        let json = json!({ "embedding": { "values": [0.5, -0.25, 1.0] } });
        assert_eq!(parse_gemini_response(&json).unwrap(), vec![0.5, -0.25, 1.0]);
        assert!(parse_gemini_response(&json!({})).is_err());
    }

    #[test]
    fn test_parse_openai_response() {
        let json = json!({ "data": [{ "index": 0, "embedding": [1.0, 2.0] }] });
        assert_eq!(parse_openai_response(&json).unwrap(), vec![1.0, 2.0]);
        assert!(parse_openai_response(&json!({ "data": [] })).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({ "embeddings": [[0.1, 0.2]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![0.1, 0.2]);
        assert!(parse_ollama_response(&json!({ "embeddings": "x" })).is_err());
    }

    #[test]
    fn test_non_numeric_values_rejected() {
        let json = json!({ "data": [{ "embedding": [1.0, null, 3.0] }] });
        let err = parse_openai_response(&json).unwrap_err();
        assert!(matches!(err, ReplyError::Provider { .. }));
        assert!(err.to_string().contains("index 1"));

        let json = json!({ "embedding": { "values": [0.5, "x"] } });
        assert!(parse_gemini_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_gemini_request_shape() {
        let stub = StubServer::start(json!({ "embedding": { "values": [0.1, 0.2, 0.3] } })).await;
        let provider =
            GeminiProvider::with_api_key(&config("gemini", &stub.url, None, 3), "g-key".into(), 3)
                .unwrap();

        let vector = provider.embed("When will my order ship?").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);

        let req = stub.only_request();
        assert_eq!(req.path, "/v1beta/models/embedding-001:embedContent");
        assert_eq!(req.header("x-goog-api-key"), Some("g-key"));
        assert_eq!(req.body["model"], "models/embedding-001");
        assert_eq!(
            req.body["content"]["parts"][0]["text"],
            "When will my order ship?"
        );
    }

    #[tokio::test]
    async fn test_openai_request_shape() {
        let stub = StubServer::start(json!({ "data": [{ "index": 0, "embedding": [1.0, 0.0] }] })).await;
        let provider =
            OpenAIProvider::with_api_key(&config("openai", &stub.url, None, 2), "o-key".into(), 2)
                .unwrap();

        assert_eq!(provider.embed("hello").await.unwrap(), vec![1.0, 0.0]);

        let req = stub.only_request();
        assert_eq!(req.path, "/v1/embeddings");
        assert_eq!(req.header("authorization"), Some("Bearer o-key"));
        assert_eq!(req.body, json!({ "model": "text-embedding-3-small", "input": ["hello"] }));
    }

    #[tokio::test]
    async fn test_ollama_request_shape() {
        let stub = StubServer::start(json!({ "embeddings": [[0.25, 0.75]] })).await;
        let provider =
            OllamaProvider::new(&config("ollama", &stub.url, Some("nomic-embed-text"), 2)).unwrap();

        assert_eq!(provider.embed("hello").await.unwrap(), vec![0.25, 0.75]);

        let req = stub.only_request();
        assert_eq!(req.path, "/api/embed");
        assert_eq!(req.body, json!({ "model": "nomic-embed-text", "input": ["hello"] }));
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = DisabledProvider.embed("hello").await.unwrap_err();
        assert!(matches!(err, ReplyError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_blank_text_is_input_error() {
        let provider = OllamaProvider::new(&config(
            "ollama",
            "http://127.0.0.1:9",
            Some("nomic-embed-text"),
            4,
        ))
        .unwrap();
        let err = provider.embed("   ").await.unwrap_err();
        assert!(matches!(err, ReplyError::Input(_)));
    }

    #[test]
    fn test_create_provider_unknown() {
        let cfg = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_provider(&cfg),
            Err(ReplyError::Config(_))
        ));
    }
}
