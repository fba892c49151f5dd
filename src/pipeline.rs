//! Reply pipeline orchestrator.
//!
//! [`ReplyPipeline`] composes an [`EmbeddingProvider`], an [`ExampleStore`],
//! and a [`ReplyGenerator`]:
//!
//! ```text
//! reply:  body ──embed──▶ vector ──search(company, k)──▶ neighbors ──generate──▶ ReplyResult
//! ingest: texts ──embed each──▶ records ──insert_batch──▶ count
//! ```
//!
//! All collaborators are injected, so tests substitute doubles for every
//! remote service.

use std::sync::Arc;
use tracing::{error, info};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{ReplyError, Result};
use crate::llm;
use crate::models::{company_key, ExampleRecord, Neighbor, Query, ReplyResult};
use crate::reply::ReplyGenerator;
use crate::store::{self, ExampleStore};

pub struct ReplyPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ExampleStore>,
    generator: ReplyGenerator,
    top_k: usize,
    max_distance: Option<f32>,
}

impl ReplyPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ExampleStore>,
        generator: ReplyGenerator,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            top_k: retrieval.top_k,
            max_distance: retrieval.max_distance,
        }
    }

    /// Build every collaborator from configuration.
    ///
    /// This is where missing credentials are detected: provider constructors
    /// fail with [`ReplyError::Config`] before any request is served.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        if !config.embedding.is_enabled() {
            anyhow::bail!("Embedding provider is disabled. Set [embedding] provider in config.");
        }
        let embedder = embedding::create_provider(&config.embedding)?;
        let model = llm::create_chat_model(&config.llm)?;
        let store = store::open_store(config).await?;
        info!(
            embedding = embedder.model_name(),
            dims = embedder.dims(),
            llm = model.model_name(),
            store = store.backend_name(),
            "pipeline ready"
        );
        Ok(Self::new(
            embedder,
            store,
            ReplyGenerator::new(model, &config.llm),
            &config.retrieval,
        ))
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed one text, rejecting vectors whose width is not the provider's
    /// declared `dims()`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(text).await?;
        let dims = self.embedder.dims();
        if vector.len() != dims {
            return Err(ReplyError::provider(
                self.embedder.model_name(),
                format!("expected {} dims, got {}", dims, vector.len()),
            ));
        }
        Ok(vector)
    }

    /// Embed `text` and return the closest examples for `company`.
    ///
    /// Neighbors beyond `retrieval.max_distance` (when set) are dropped.
    pub async fn similar(&self, company: &str, text: &str, k: usize) -> Result<Vec<Neighbor>> {
        let vector = self.embed(text).await.map_err(|e| {
            error!(company, error = %e, "query embedding failed");
            e
        })?;
        let mut neighbors = self.store.search(company, &vector, k).await.map_err(|e| {
            error!(company, backend = self.store.backend_name(), error = %e, "similarity search failed");
            e
        })?;
        if let Some(max) = self.max_distance {
            neighbors.retain(|n| n.distance <= max);
        }
        Ok(neighbors)
    }

    /// Draft a reply for `query`.
    ///
    /// A blank body returns the fallback without any remote call. Embedding
    /// and store failures propagate; generation problems never do.
    pub async fn generate_reply(&self, query: &Query) -> Result<ReplyResult> {
        if query.incoming_text.trim().is_empty() {
            return Ok(ReplyResult {
                reply: self.generator.fallback().to_string(),
                snippets: Vec::new(),
            });
        }

        let neighbors = self
            .similar(&query.company_name, &query.incoming_text, self.top_k)
            .await?;
        let snippets: Vec<String> = neighbors.into_iter().map(|n| n.text).collect();

        let reply = self
            .generator
            .generate(&query.incoming_text, &query.company_name, &snippets)
            .await;

        info!(
            company = %company_key(&query.company_name),
            snippets = snippets.len(),
            "reply generated"
        );
        Ok(ReplyResult { reply, snippets })
    }

    /// Embed `texts` and store them under `company`. Returns the number stored.
    ///
    /// Embeddings run one at a time; the first failure aborts the whole
    /// ingestion and nothing is stored.
    pub async fn ingest(&self, company: &str, texts: &[String]) -> Result<usize> {
        if company_key(company).is_empty() {
            return Err(ReplyError::Input("company name must not be empty".into()));
        }
        if texts.is_empty() {
            return Ok(0);
        }

        let mut records = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let vector = self.embed(text).await.map_err(|e| {
                error!(company, index = i, error = %e, "embedding failed during ingestion");
                e
            })?;
            records.push(ExampleRecord::new(company, text.clone(), vector));
        }

        let inserted = self.store.insert_batch(&records).await?;
        info!(company = %company_key(company), inserted, "ingested examples");
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, DEFAULT_FALLBACK_REPLY};
    use crate::llm::{ChatModel, Decoding};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic letter-frequency embedder; fails on texts containing "FAIL".
    struct LetterEmbedder {
        calls: AtomicUsize,
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.trim().is_empty() {
                return Err(ReplyError::Input("empty".into()));
            }
            if text.contains("FAIL") {
                return Err(ReplyError::provider("letters", "boom"));
            }
            let mut v = vec![0.0f32; 26];
            for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
            Ok(v)
        }
    }

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, _prompt: &str, _decoding: Decoding) -> Result<String> {
            Ok("We will look into it right away.".into())
        }
    }

    fn pipeline(retrieval: RetrievalConfig) -> (ReplyPipeline, Arc<LetterEmbedder>, Arc<InMemoryStore>) {
        let embedder = Arc::new(LetterEmbedder {
            calls: AtomicUsize::new(0),
            dims: 26,
        });
        let store = Arc::new(InMemoryStore::new());
        let generator = ReplyGenerator::new(Arc::new(EchoModel), &LlmConfig::default());
        let p = ReplyPipeline::new(embedder.clone(), store.clone(), generator, &retrieval);
        (p, embedder, store)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ingest_then_search_finds_exact_text() {
        let (p, _, _) = pipeline(RetrievalConfig::default());
        let n = p.ingest("acme", &texts(&["a", "b", "c"])).await.unwrap();
        assert_eq!(n, 3);

        let neighbors = p.similar("acme", "a", 3).await.unwrap();
        assert_eq!(neighbors[0].text, "a");
        assert!(neighbors[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_generate_reply_uses_company_examples_only() {
        let (p, _, _) = pipeline(RetrievalConfig::default());
        p.ingest(
            "acme",
            &texts(&[
                "Thanks for reaching out, we'll respond soon.",
                "We appreciate your patience.",
            ]),
        )
        .await
        .unwrap();
        p.ingest("globex", &texts(&["Globex never sleeps."]))
            .await
            .unwrap();

        let result = p
            .generate_reply(&Query {
                incoming_text: "When will my order ship?".into(),
                company_name: "acme".into(),
            })
            .await
            .unwrap();
        assert!(!result.reply.is_empty());
        assert!(result.snippets.len() <= 5);
        assert_eq!(result.snippets.len(), 2);
        assert!(result.snippets.iter().all(|s| s != "Globex never sleeps."));
    }

    #[tokio::test]
    async fn test_blank_body_skips_remote_calls() {
        let (p, embedder, _) = pipeline(RetrievalConfig::default());
        let result = p
            .generate_reply(&Query {
                incoming_text: "  ".into(),
                company_name: "acme".into(),
            })
            .await
            .unwrap();
        assert_eq!(result.reply, DEFAULT_FALLBACK_REPLY);
        assert!(result.snippets.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_ingestion() {
        let (p, _, store) = pipeline(RetrievalConfig::default());
        let err = p
            .ingest("acme", &texts(&["first", "FAIL here", "third"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplyError::Provider { .. }));
        assert_eq!(store.count("acme").await, 0);
    }

    #[tokio::test]
    async fn test_vector_width_must_match_provider_dims() {
        let embedder = Arc::new(LetterEmbedder {
            calls: AtomicUsize::new(0),
            dims: 768,
        });
        let store = Arc::new(InMemoryStore::new());
        let generator = ReplyGenerator::new(Arc::new(EchoModel), &LlmConfig::default());
        let p = ReplyPipeline::new(embedder, store.clone(), generator, &RetrievalConfig::default());

        let err = p.ingest("acme", &texts(&["hello"])).await.unwrap_err();
        assert!(matches!(err, ReplyError::Provider { .. }));
        assert_eq!(store.count("acme").await, 0);

        let err = p.similar("acme", "hello", 5).await.unwrap_err();
        assert!(matches!(err, ReplyError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let (p, embedder, _) = pipeline(RetrievalConfig::default());
        assert_eq!(p.ingest("acme", &[]).await.unwrap(), 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_company_rejected() {
        let (p, _, _) = pipeline(RetrievalConfig::default());
        let err = p.ingest("  ", &texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, ReplyError::Input(_)));
    }

    #[tokio::test]
    async fn test_max_distance_filters_neighbors() {
        let (p, _, _) = pipeline(RetrievalConfig {
            top_k: 5,
            max_distance: Some(0.1),
        });
        p.ingest("acme", &texts(&["abc", "xyz"])).await.unwrap();
        let neighbors = p.similar("acme", "abc", 5).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].text, "abc");
    }

    #[tokio::test]
    async fn test_top_k_bounds_snippets() {
        let (p, _, _) = pipeline(RetrievalConfig {
            top_k: 2,
            max_distance: None,
        });
        p.ingest("acme", &texts(&["one", "two", "three", "four"]))
            .await
            .unwrap();
        let result = p
            .generate_reply(&Query {
                incoming_text: "one more".into(),
                company_name: "ACME".into(),
            })
            .await
            .unwrap();
        assert_eq!(result.snippets.len(), 2);
    }
}
