//! Storage abstraction for example emails.
//!
//! The [`ExampleStore`] trait defines the two operations the pipeline needs:
//! appending embedded examples for a company and a company-scoped
//! nearest-neighbor lookup. Backends:
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | `sqlite` | [`SqliteStore`] | Embedded table, brute-force cosine scan |
//! | `supabase` | [`SupabaseStore`] | Hosted PostgREST insert + `match_company_emails` RPC |
//! | `memory` | [`InMemoryStore`] | In-process, for tests and development |
//!
//! Distances are cosine distances (`1 - cosine similarity`); results are
//! ordered ascending. Lookups never cross company boundaries.

pub mod memory;
pub mod sqlite;
pub mod supabase;

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::cosine_distance;
use crate::error::{ReplyError, Result};
use crate::models::{ExampleRecord, Neighbor};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;

/// Append-only collection of [`ExampleRecord`]s with similarity search.
///
/// Implementations must be `Send + Sync`; one instance is shared by all
/// requests for the lifetime of the process.
#[async_trait]
pub trait ExampleStore: Send + Sync {
    /// Short backend identifier used in logs and errors.
    fn backend_name(&self) -> &str;

    /// Append all records in one batch. Returns the number stored.
    ///
    /// Either every record is stored or none is.
    async fn insert_batch(&self, records: &[ExampleRecord]) -> Result<usize>;

    /// Return up to `k` texts of `company` closest to `query`, ascending by distance.
    ///
    /// Returns an empty vec when the company has no records.
    async fn search(&self, company: &str, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;
}

pub(crate) fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(ReplyError::Input("k must be >= 1".into()));
    }
    Ok(())
}

/// `got` is the width of an incoming vector, `expected` the stored width.
pub(crate) fn check_dims(got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(ReplyError::DimensionMismatch {
            query: got,
            stored: expected,
        });
    }
    Ok(())
}

/// Validate a batch before anything is written.
///
/// Every embedding in one batch must have the same width as the first.
pub(crate) fn check_records(records: &[ExampleRecord]) -> Result<()> {
    let width = records.first().map(|r| r.embedding.len());
    for rec in records {
        if rec.company.is_empty() {
            return Err(ReplyError::Input("company must not be empty".into()));
        }
        if rec.text.trim().is_empty() {
            return Err(ReplyError::Input("example text must not be empty".into()));
        }
        if rec.embedding.is_empty() {
            return Err(ReplyError::Input("example embedding must not be empty".into()));
        }
        if let Some(width) = width {
            check_dims(rec.embedding.len(), width)?;
        }
    }
    Ok(())
}

/// Rank stored `(text, vector)` pairs by cosine distance to `query`.
///
/// The sort is stable, so equal distances keep the order of `rows`.
pub(crate) fn rank_neighbors<'a, I>(query: &[f32], rows: I, k: usize) -> Result<Vec<Neighbor>>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut neighbors = Vec::new();
    for (text, vector) in rows {
        if vector.len() != query.len() {
            return Err(ReplyError::DimensionMismatch {
                query: query.len(),
                stored: vector.len(),
            });
        }
        neighbors.push(Neighbor {
            text: text.to_string(),
            distance: cosine_distance(query, vector),
        });
    }

    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    neighbors.truncate(k);
    Ok(neighbors)
}

/// Open the store selected by `[store].backend`.
///
/// For `sqlite` this connects and applies the schema; for `supabase` it
/// reads the credentials from the environment. Missing credentials fail here,
/// at startup.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ExampleStore>> {
    match config.store.backend.as_str() {
        "sqlite" => {
            let pool = crate::db::connect(config).await?;
            crate::migrate::apply_schema(&pool).await?;
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        "supabase" => {
            let dims = config
                .embedding
                .dims
                .context("embedding.dims is required for the supabase backend")?;
            Ok(Arc::new(SupabaseStore::from_env(
                dims,
                config.embedding.timeout_secs,
            )?))
        }
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        other => anyhow::bail!("Unknown store backend: {}", other),
    }
}
