//! Model provider seam.
//!
//! The pipeline talks to the language model through `ChatModel` so that a
//! scripted implementation can stand in for the remote provider in tests.
//! The provider is a fallible remote dependency: it may return free text
//! containing zero or one structured payload, may fail with rate limits or
//! outages, and is never trusted for input validation.

use crate::model::{ConversationTurn, TurnRole};
use async_trait::async_trait;
use openai::{Message, Request};
use thiserror::Error;

/// The remote model call failed or returned a non-success response.
#[derive(Debug, Error)]
#[error("model provider unavailable: {0}")]
pub struct ProviderError(pub String);

/// One chat-completion call: system prompt, bounded history, new user turn.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        history: &[ConversationTurn],
        user: &str,
    ) -> Result<String, ProviderError>;
}

/// Generation settings for the OpenAI-backed model.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 300,
            temperature: 0.7,
        }
    }
}

/// OpenAI-backed chat model.
pub struct OpenAiModel {
    client: openai::Client,
    settings: ModelSettings,
}

impl OpenAiModel {
    pub fn new(client: openai::Client) -> Self {
        Self {
            client,
            settings: ModelSettings::default(),
        }
    }

    /// Create a model from the OPENAI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, ProviderError> {
        let client = openai::Client::from_env().map_err(|e| ProviderError(e.to_string()))?;
        Ok(Self::new(client))
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    async fn complete(
        &self,
        system: &str,
        history: &[ConversationTurn],
        user: &str,
    ) -> Result<String, ProviderError> {
        let mut messages = vec![Message::system(system)];
        for turn in history {
            messages.push(match turn.role {
                TurnRole::User => Message::user(&turn.content),
                TurnRole::Assistant => Message::assistant(&turn.content),
            });
        }
        messages.push(Message::user(user));

        let mut request = Request::new(messages)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);
        if let Some(ref model) = self.settings.model {
            request = request.with_model(model);
        }

        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| ProviderError(e.to_string()))?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_original_limits() {
        let settings = ModelSettings::default();
        assert_eq!(settings.max_tokens, 300);
        assert_eq!(settings.temperature, 0.7);
        assert!(settings.model.is_none());
    }
}
