//! Optional LLM backends for personalizing recommendations.
//!
//! rig-core does the HTTP work; `RigAdapter` exposes its completion models
//! through the crate's `LlmProvider` trait.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::config::LlmSettings;
use crate::error::LlmError;

/// Which hosted model family personalizes recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// Environment variable holding this backend's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Model used when `FUNNEL_LLM_MODEL` is unset.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o",
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "gpt" => Ok(Self::OpenAi),
            other => Err(format!("unknown LLM backend: {other}")),
        }
    }
}

/// Build the provider selected by `settings`.
pub fn create_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let key = settings.api_key.expose_secret();
    let client_error = |e: String| LlmError::RequestFailed {
        provider: settings.backend.to_string(),
        reason: format!("client setup failed: {e}"),
    };

    let provider: Arc<dyn LlmProvider> = match settings.backend {
        LlmBackend::Anthropic => {
            use rig::providers::anthropic;
            let client: rig::client::Client<anthropic::client::AnthropicExt> =
                anthropic::Client::new(key).map_err(|e| client_error(e.to_string()))?;
            Arc::new(RigAdapter::new(
                client.completion_model(&settings.model),
                &settings.model,
            ))
        }
        LlmBackend::OpenAi => {
            use rig::providers::openai;
            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(key).map_err(|e| client_error(e.to_string()))?;
            Arc::new(RigAdapter::new(
                client.completion_model(&settings.model),
                &settings.model,
            ))
        }
    };

    tracing::info!(backend = %settings.backend, model = %settings.model, "LLM provider ready");
    Ok(provider)
}
