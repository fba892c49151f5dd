//! Error types for the reply pipeline.
//!
//! Model-quality problems (empty output, timeouts) never show up here: the
//! reply generator absorbs them into the fallback reply. What remains are
//! caller mistakes, remote failures, and startup configuration errors.

use thiserror::Error;

/// Errors that can occur while embedding, storing, searching, or generating.
#[derive(Debug, Error)]
pub enum ReplyError {
    /// Caller-supplied data is invalid (blank text, missing field, `k == 0`).
    #[error("invalid input: {0}")]
    Input(String),

    /// A remote provider (embedding or chat model) returned an error.
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The example store could not be reached or rejected the operation.
    #[error("store unavailable ({backend}): {message}")]
    BackendUnavailable {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A query or incoming example vector does not have the dimension of
    /// the vectors already stored.
    #[error("dimension mismatch: vector has {query} dims, stored records have {stored}")]
    DimensionMismatch {
        /// Width of the incoming vector.
        query: usize,
        /// Width of the stored vectors.
        stored: usize,
    },

    /// Missing credentials or an unusable configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReplyError {
    pub(crate) fn provider(provider: &str, message: impl Into<String>) -> Self {
        ReplyError::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn backend(backend: &str, message: impl Into<String>) -> Self {
        ReplyError::BackendUnavailable {
            backend: backend.to_string(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for ReplyError {
    fn from(err: sqlx::Error) -> Self {
        ReplyError::backend("sqlite", err.to_string())
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ReplyError>;
