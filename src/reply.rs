//! Reply generation: prompt → chat model under a deadline → post-processing.
//!
//! [`ReplyGenerator::generate`] never fails. Blank input, provider errors,
//! empty output, and timeouts all produce the configured fallback reply.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::deadline::{run_with_deadline, Settled};
use crate::llm::{ChatModel, Decoding};
use crate::prompt;

pub struct ReplyGenerator {
    model: Arc<dyn ChatModel>,
    decoding: Decoding,
    timeout: Duration,
    fallback: String,
}

impl ReplyGenerator {
    pub fn new(model: Arc<dyn ChatModel>, config: &LlmConfig) -> Self {
        Self {
            model,
            decoding: Decoding::from(config),
            timeout: Duration::from_secs(config.timeout_secs),
            fallback: config.fallback_reply.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Draft a reply to `incoming_text` in the tone of `examples`.
    pub async fn generate(
        &self,
        incoming_text: &str,
        company_name: &str,
        examples: &[String],
    ) -> String {
        if incoming_text.trim().is_empty() {
            return self.fallback.clone();
        }

        let prompt = prompt::assemble(incoming_text, company_name, examples);
        let model = self.model.clone();
        let decoding = self.decoding;
        let settled = run_with_deadline(self.timeout, async move {
            model.complete(&prompt, decoding).await
        })
        .await;

        match settled {
            Settled::Completed(Ok(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    warn!(model = self.model.model_name(), "model returned empty text, using fallback");
                    self.fallback.clone()
                } else {
                    info!(model = self.model.model_name(), reply_len = trimmed.len(), "generated reply");
                    trimmed.to_string()
                }
            }
            Settled::Completed(Err(e)) => {
                warn!(model = self.model.model_name(), error = %e, "completion failed, using fallback");
                self.fallback.clone()
            }
            Settled::Abandoned => self.fallback.clone(),
        }
    }
}
