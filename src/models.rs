//! Core data models used throughout the reply pipeline.
//!
//! These types represent the stored examples, lookup results, and replies
//! that flow through ingestion and reply generation.

use serde::{Deserialize, Serialize};

/// Normalize a company name into its storage key (trimmed, lowercased).
pub fn company_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A stored example email belonging to one company.
#[derive(Debug, Clone)]
pub struct ExampleRecord {
    pub company: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl ExampleRecord {
    pub fn new(company: &str, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            company: company_key(company),
            text: text.into(),
            embedding,
        }
    }
}

/// One incoming email to draft a reply for.
#[derive(Debug, Clone)]
pub struct Query {
    pub incoming_text: String,
    pub company_name: String,
}

/// A lookup result. Lower distance means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub text: String,
    pub distance: f32,
}

/// The drafted reply and the example texts that informed it.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyResult {
    pub reply: String,
    pub snippets: Vec<String>,
}
