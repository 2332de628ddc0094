use std::env;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::*;
use crate::core::errors::ApiError;
use crate::llm::types::ChatSettings;

/// Typed view over the merged YAML configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub llm: LlmSettings,
    pub chat: ChatDefaults,
    pub rag: RagSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl LlmSettings {
    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatDefaults {
    pub system_prompt: String,
    pub greeting: String,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunks: usize,
    pub retriever_top_k: usize,
    pub top_k: usize,
    pub rrf_k: f32,
    pub summarize_concurrency: usize,
    pub max_context_chars: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_chunks: DEFAULT_MAX_CHUNKS,
            retriever_top_k: DEFAULT_RETRIEVER_TOP_K,
            top_k: DEFAULT_TOP_K,
            rrf_k: DEFAULT_RRF_K,
            summarize_concurrency: DEFAULT_SUMMARIZE_CONCURRENCY,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub allowed_origins: Vec<String>,
}

impl ServerSettings {
    pub fn effective_origins(&self) -> Vec<String> {
        let origins: Vec<String> = self
            .allowed_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() {
            return default_local_origins();
        }
        origins
    }
}

impl AppSettings {
    /// Resolves typed settings from a merged config value, then applies
    /// `OPENAI_API_KEY` / `OPENAI_BASE_URL` from the environment.
    pub fn from_config(config: &Value) -> Result<Self, ApiError> {
        let mut settings = Self::from_value(config)?;
        settings.apply_env(|key| env::var(key).ok());
        Ok(settings)
    }

    fn from_value(config: &Value) -> Result<Self, ApiError> {
        if config.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(config.clone())
            .map_err(|err| ApiError::BadRequest(format!("Invalid config: {}", err)))
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let has_key = self
            .llm
            .api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false);
        if !has_key {
            self.llm.api_key = lookup(API_KEY_ENV).filter(|key| !key.trim().is_empty());
        }
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.llm.base_url = base_url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let settings = AppSettings::from_value(&json!({"chat": {"greeting": "Hi"}})).unwrap();

        assert_eq!(settings.chat.greeting, "Hi");
        assert_eq!(settings.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(settings.llm.model, DEFAULT_CHAT_MODEL);
        assert_eq!(settings.llm.max_tokens, 500);
        assert_eq!(settings.rag.summarize_concurrency, 3);
    }

    #[test]
    fn env_key_fills_only_missing_credential() {
        let mut settings = AppSettings::default();
        settings.apply_env(|key| match key {
            API_KEY_ENV => Some("sk-env".to_string()),
            _ => None,
        });
        assert_eq!(settings.llm.api_key.as_deref(), Some("sk-env"));

        let mut configured = AppSettings::from_value(&json!({"llm": {"api_key": "sk-file"}})).unwrap();
        configured.apply_env(|key| match key {
            API_KEY_ENV => Some("sk-env".to_string()),
            BASE_URL_ENV => Some("http://localhost:1234/v1".to_string()),
            _ => None,
        });
        assert_eq!(configured.llm.api_key.as_deref(), Some("sk-file"));
        assert_eq!(configured.llm.base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn blank_origin_list_uses_local_defaults() {
        let server = ServerSettings {
            allowed_origins: vec!["  ".to_string()],
        };
        assert_eq!(server.effective_origins(), default_local_origins());
    }

    #[test]
    fn chat_settings_mirror_llm_section() {
        let settings = LlmSettings::default();
        let chat = settings.chat_settings();
        assert_eq!(chat.model, "gpt-3.5-turbo");
        assert!((chat.temperature - 0.7).abs() < f64::EPSILON);
        assert!((chat.top_p - 1.0).abs() < f64::EPSILON);
    }
}
