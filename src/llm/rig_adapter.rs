//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Default token cap; Anthropic rejects requests without one.
const DEFAULT_MAX_TOKENS: u64 = 1024;

/// Wraps any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut builder = self.model.completion_request(request.prompt());
        if let Some(preamble) = request.system_prompt() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature as f64);
        }
        builder = builder.max_tokens(
            request
                .max_tokens
                .map(u64::from)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        );

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })?;

        let content: String = response
            .choice
            .into_iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "empty completion".to_string(),
            });
        }

        Ok(CompletionResponse { content })
    }
}
