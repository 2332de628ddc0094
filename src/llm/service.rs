use std::sync::Arc;

use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest, ChatSettings, TokenStream};
use crate::core::errors::LlmError;

/// Model Client facade used by the chat layer and the RAG tools.
///
/// Holds the provider plus the default sampling settings and embedding model
/// resolved from config at startup.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    settings: ChatSettings,
    embedding_model: String,
}

impl LlmService {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        settings: ChatSettings,
        embedding_model: String,
    ) -> Self {
        Self {
            provider,
            settings,
            embedding_model,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Streams the completion for `messages`. Falls back to the service
    /// defaults when `settings` is `None`.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        settings: Option<&ChatSettings>,
    ) -> Result<TokenStream, LlmError> {
        let settings = settings.unwrap_or(&self.settings).clone();
        tracing::debug!(
            "Streaming completion: model={}, messages={}",
            settings.model,
            messages.len()
        );
        self.provider
            .stream_chat(ChatRequest::new(messages, settings))
            .await
    }

    /// Non-streaming completion; returns the full reply text.
    pub async fn complete_text(
        &self,
        messages: Vec<ChatMessage>,
        settings: Option<&ChatSettings>,
    ) -> Result<String, LlmError> {
        let settings = settings.unwrap_or(&self.settings).clone();
        self.provider.chat(ChatRequest::new(messages, settings)).await
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.provider.embed(inputs, &self.embedding_model).await
    }
}
