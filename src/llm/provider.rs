use async_trait::async_trait;

use super::types::{ChatRequest, TokenStream};
use crate::core::errors::LlmError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// chat completion (streaming)
    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, LlmError>;

    /// generate embeddings, one vector per input in input order
    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, LlmError>;
}
