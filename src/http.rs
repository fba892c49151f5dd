//! Shared plumbing for the hosted-service clients (embedding, chat, Supabase).

use std::time::Duration;
use tracing::error;

use crate::error::{ReplyError, Result};

/// Read a credential from the environment. Unset or blank is a config error.
pub(crate) fn require_env(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ReplyError::Config(format!("{var} environment variable not set")))
}

pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ReplyError::Config(format!("failed to build HTTP client: {e}")))
}

/// Send a JSON request and return the parsed JSON body.
///
/// Transport failures, non-2xx statuses, and undecodable bodies all map to
/// [`ReplyError::Provider`] tagged with `provider`.
pub(crate) async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let response = request.json(body).send().await.map_err(|e| {
        error!(provider, error = %e, "provider request failed");
        ReplyError::provider(provider, e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        error!(provider, %status, "provider API returned an error");
        return Err(ReplyError::provider(
            provider,
            format!("API error {}: {}", status, body_text),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| ReplyError::provider(provider, format!("invalid response body: {e}")))
}
