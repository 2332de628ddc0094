use serde::Serialize;

use crate::core::errors::LlmError;
use crate::llm::{ChatMessage, LlmService, Role};

/// Turns of prior conversation shown to the classifier.
const ROUTER_HISTORY_MESSAGES: usize = 6;

const ROUTER_INSTRUCTIONS: &str = "You route user requests for a document assistant.\n\
Classify the latest user request into exactly one category:\n\
(1) the user wants a summary of the uploaded document\n\
(2) the user asks a question that should be answered from the uploaded documents\n\
(3) the user is chatting, greeting, or asking something unrelated to the documents\n\
Reply with the tag only: (1), (2) or (3). Do not add any other text.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Summarize,
    RetrieveContext,
    Converse,
}

impl Intent {
    /// Accepts `(1)`, `(2)`, `(3)` and the bare digits; nothing else.
    pub fn parse(reply: &str) -> Option<Self> {
        let trimmed = reply.trim();
        let tag = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        match tag {
            "1" => Some(Intent::Summarize),
            "2" => Some(Intent::RetrieveContext),
            "3" => Some(Intent::Converse),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Intent::Summarize => "(1)",
            Intent::RetrieveContext => "(2)",
            Intent::Converse => "(3)",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Summarize => "summarize",
            Intent::RetrieveContext => "retrieve_context",
            Intent::Converse => "converse",
        }
    }
}

#[derive(Clone)]
pub struct IntentRouter {
    llm: LlmService,
}

impl IntentRouter {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    /// One deterministic, non-streaming classification call. An unrecognized
    /// reply is an error; no intent is guessed.
    pub async fn classify(&self, query: &str, history: &[ChatMessage]) -> Result<Intent, LlmError> {
        let messages = vec![
            ChatMessage::system(ROUTER_INSTRUCTIONS),
            ChatMessage::user(format!(
                "Conversation so far:\n{}\n\nLatest request:\n{}",
                recent_turns(history),
                query
            )),
        ];
        let settings = self.llm.settings().deterministic();
        let reply = self.llm.complete_text(messages, Some(&settings)).await?;

        match Intent::parse(&reply) {
            Some(intent) => {
                tracing::debug!("Routed query to {}", intent.as_str());
                Ok(intent)
            }
            None => {
                tracing::warn!("Router returned an unrecognized tag: {:?}", reply);
                Err(LlmError::Classification(reply.trim().to_string()))
            }
        }
    }
}

fn recent_turns(history: &[ChatMessage]) -> String {
    let turns: Vec<String> = history
        .iter()
        .filter(|message| message.role != Role::System)
        .rev()
        .take(ROUTER_HISTORY_MESSAGES)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|message| format!("{}: {}", message.role.as_str(), message.content))
        .collect();
    if turns.is_empty() {
        "(none)".to_string()
    } else {
        turns.join("\n")
    }
}
