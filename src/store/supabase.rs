//! Hosted [`ExampleStore`] backed by a Supabase (PostgREST + pgvector) project.
//!
//! Inserts go to the `company_emails` table; lookups call the
//! `match_company_emails(c_name, q_embedding, k)` RPC, which runs the
//! nearest-neighbor query server-side and returns `{ text_snippet, distance }`
//! rows.
//!
//! Credentials come from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{ReplyError, Result};
use crate::http::{self, require_env};
use crate::models::{company_key, ExampleRecord, Neighbor};

use super::{check_dims, check_k, check_records, ExampleStore};

const BACKEND: &str = "supabase";

/// Supabase implementation of the [`ExampleStore`] trait.
pub struct SupabaseStore {
    client: reqwest::Client,
    url: String,
    api_key: String,
    dims: usize,
}

#[derive(Serialize)]
struct InsertRow<'a> {
    company_name: String,
    text_snippet: &'a str,
    embedding: &'a [f32],
}

#[derive(Serialize)]
struct MatchParams<'a> {
    c_name: String,
    q_embedding: &'a [f32],
    k: usize,
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    text_snippet: String,
    distance: f32,
}

impl SupabaseStore {
    /// `dims` is the dimension of the vectors in the `company_emails` table.
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        dims: usize,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http::client(Duration::from_secs(timeout_secs))?,
            url: url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            dims,
        })
    }

    pub fn from_env(dims: usize, timeout_secs: u64) -> Result<Self> {
        Self::new(
            require_env("SUPABASE_URL")?,
            require_env("SUPABASE_ANON_KEY")?,
            dims,
            timeout_secs,
        )
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/rest/v1/{}", self.url, path))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            error!(backend = BACKEND, error = %e, "request failed");
            ReplyError::backend(BACKEND, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(backend = BACKEND, %status, "request rejected");
            return Err(ReplyError::backend(
                BACKEND,
                format!("HTTP {}: {}", status, body),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ExampleStore for SupabaseStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    async fn insert_batch(&self, records: &[ExampleRecord]) -> Result<usize> {
        check_records(records)?;
        // The table's vector column has a fixed width.
        for rec in records {
            check_dims(rec.embedding.len(), self.dims)?;
        }
        let rows: Vec<InsertRow<'_>> = records
            .iter()
            .map(|r| InsertRow {
                company_name: company_key(&r.company),
                text_snippet: &r.text,
                embedding: &r.embedding,
            })
            .collect();

        let request = self
            .request("company_emails")
            .header("Prefer", "return=representation")
            .json(&rows);
        let inserted: Vec<serde_json::Value> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ReplyError::backend(BACKEND, format!("invalid insert response: {e}")))?;

        debug!(count = inserted.len(), "stored example batch");
        Ok(inserted.len())
    }

    async fn search(&self, company: &str, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_k(k)?;
        check_dims(query.len(), self.dims)?;

        let params = MatchParams {
            c_name: company_key(company),
            q_embedding: query,
            k,
        };
        let request = self.request("rpc/match_company_emails").json(&params);
        let rows: Vec<MatchRow> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ReplyError::backend(BACKEND, format!("invalid rpc response: {e}")))?;

        Ok(into_neighbors(rows, k))
    }
}

/// The RPC already orders by distance; re-sort stably in case it does not.
fn into_neighbors(rows: Vec<MatchRow>, k: usize) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = rows
        .into_iter()
        .map(|r| Neighbor {
            text: r.text_snippet,
            distance: r.distance,
        })
        .collect();
    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    neighbors.truncate(k);
    neighbors
}
