pub mod openai;
pub mod provider;
pub mod service;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::LlmProvider;
pub use service::LlmService;
pub use types::{ChatMessage, ChatRequest, ChatSettings, Role, TokenStream};
