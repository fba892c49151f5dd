//! In-memory [`ExampleStore`] implementation for testing and development.
//!
//! Records are kept per company key in insertion order behind a
//! `tokio::sync::RwLock`. Search is brute-force cosine distance.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{company_key, ExampleRecord, Neighbor};

use super::{check_dims, check_k, check_records, rank_neighbors, ExampleStore};

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    companies: RwLock<HashMap<String, Vec<ExampleRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored for `company`.
    pub async fn count(&self, company: &str) -> usize {
        let companies = self.companies.read().await;
        companies.get(&company_key(company)).map_or(0, Vec::len)
    }
}

#[async_trait]
impl ExampleStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn insert_batch(&self, records: &[ExampleRecord]) -> Result<usize> {
        check_records(records)?;
        let mut companies = self.companies.write().await;
        for rec in records {
            let stored = companies
                .get(&company_key(&rec.company))
                .and_then(|existing| existing.first());
            if let Some(first) = stored {
                check_dims(rec.embedding.len(), first.embedding.len())?;
            }
        }
        for rec in records {
            companies
                .entry(company_key(&rec.company))
                .or_default()
                .push(rec.clone());
        }
        Ok(records.len())
    }

    async fn search(&self, company: &str, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_k(k)?;
        let companies = self.companies.read().await;
        let Some(records) = companies.get(&company_key(company)) else {
            return Ok(Vec::new());
        };
        rank_neighbors(
            query,
            records
                .iter()
                .map(|r| (r.text.as_str(), r.embedding.as_slice())),
            k,
        )
    }
}
