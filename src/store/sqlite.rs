//! SQLite-backed [`ExampleStore`] implementation.
//!
//! Each example is one row of `example_emails` with its vector stored as a
//! little-endian f32 BLOB. Search loads the company's rows and ranks them by
//! cosine distance in Rust.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::models::{company_key, ExampleRecord, Neighbor};

use super::{check_dims, check_k, check_records, rank_neighbors, ExampleStore};

/// SQLite implementation of the [`ExampleStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored examples for `company`.
    pub async fn count(&self, company: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM example_emails WHERE company = ?")
            .bind(company_key(company))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ExampleStore for SqliteStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn insert_batch(&self, records: &[ExampleRecord]) -> Result<usize> {
        check_records(records)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        // Batch widths are uniform; each company's existing rows fix its width.
        let mut seen: Vec<String> = Vec::new();
        for rec in records {
            let company = company_key(&rec.company);
            if seen.contains(&company) {
                continue;
            }
            let stored: Option<i64> =
                sqlx::query_scalar("SELECT dims FROM example_emails WHERE company = ? LIMIT 1")
                    .bind(&company)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(stored) = stored {
                check_dims(rec.embedding.len(), stored as usize)?;
            }
            seen.push(company);
        }

        for rec in records {
            sqlx::query(
                r#"
                INSERT INTO example_emails (id, company, text, embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(company_key(&rec.company))
            .bind(&rec.text)
            .bind(vec_to_blob(&rec.embedding))
            .bind(rec.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = records.len(), "stored example batch");
        Ok(records.len())
    }

    async fn search(&self, company: &str, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_k(k)?;

        let rows = sqlx::query(
            "SELECT text, embedding FROM example_emails WHERE company = ? ORDER BY rowid",
        )
        .bind(company_key(company))
        .fetch_all(&self.pool)
        .await?;

        let decoded: Vec<(String, Vec<f32>)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (row.get("text"), blob_to_vec(&blob))
            })
            .collect();

        rank_neighbors(
            query,
            decoded.iter().map(|(t, v)| (t.as_str(), v.as_slice())),
            k,
        )
    }
}
