//! Provider-neutral completion types and the `LlmProvider` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// All system messages joined into one preamble.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// All non-system messages joined into the prompt text.
    pub fn prompt(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// An LLM that can complete a prompt.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Run a single completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_splits_system_and_prompt() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("Be terse."),
            ChatMessage::user("Hello"),
            ChatMessage::system("Answer in JSON."),
        ])
        .with_max_tokens(100);

        assert_eq!(request.system_prompt().unwrap(), "Be terse.\n\nAnswer in JSON.");
        assert_eq!(request.prompt(), "Hello");
        assert_eq!(request.max_tokens, Some(100));
    }

    #[test]
    fn request_without_system_prompt() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Hi")]);
        assert!(request.system_prompt().is_none());
    }
}
