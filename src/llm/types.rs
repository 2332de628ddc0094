use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::errors::LlmError;

/// Incremental text fragments of one streamed completion.
pub type TokenStream = mpsc::Receiver<Result<String, LlmError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl ChatSettings {
    /// Same model, deterministic sampling. Used for classification calls.
    pub fn deterministic(&self) -> Self {
        Self {
            temperature: 0.0,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub settings: ChatSettings,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, settings: ChatSettings) -> Self {
        Self { messages, settings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let value = serde_json::to_value(ChatMessage::system("You are a helpful assistant.")).unwrap();
        assert_eq!(
            value,
            json!({"role": "system", "content": "You are a helpful assistant."})
        );
    }

    #[test]
    fn deterministic_only_zeroes_temperature() {
        let settings = crate::core::config::LlmSettings::default().chat_settings();
        let det = settings.deterministic();
        assert_eq!(det.temperature, 0.0);
        assert_eq!(det.model, settings.model);
        assert_eq!(det.max_tokens, settings.max_tokens);
    }
}
