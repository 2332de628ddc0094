//! Chat lifecycle callbacks: session start, one user turn, session end.

use async_trait::async_trait;
use serde::Serialize;

use crate::agent::{Intent, IntentRouter, ToolHandlers};
use crate::core::config::ChatDefaults;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, LlmService, TokenStream};
use crate::session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Active { session_id: String },
}

impl SessionPhase {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionPhase::Idle => None,
            SessionPhase::Active { session_id } => Some(session_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Chat,
    Rag,
}

impl ChatMode {
    pub fn parse(value: Option<&str>) -> Result<Self, ApiError> {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("chat") => Ok(ChatMode::Chat),
            Some("rag") => Ok(ChatMode::Rag),
            Some(other) => Err(ApiError::BadRequest(format!("Unknown chat mode: {}", other))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChatMode::Chat => "chat",
            ChatMode::Rag => "rag",
        }
    }
}

/// Receives a turn's output as it is produced.
#[async_trait]
pub trait TokenSink: Send {
    async fn send_token(&mut self, token: &str) -> Result<(), ApiError>;

    async fn send_intent(&mut self, _intent: Intent) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatStart {
    pub session_id: String,
    pub greeting: String,
}

#[derive(Clone)]
pub struct ChatController {
    sessions: SessionStore,
    llm: LlmService,
    router: IntentRouter,
    tools: ToolHandlers,
    defaults: ChatDefaults,
}

impl ChatController {
    pub fn new(
        sessions: SessionStore,
        llm: LlmService,
        router: IntentRouter,
        tools: ToolHandlers,
        defaults: ChatDefaults,
    ) -> Self {
        Self {
            sessions,
            llm,
            router,
            tools,
            defaults,
        }
    }

    /// `Idle → Active`: opens a session seeded with the system prompt. An
    /// already active phase keeps its session.
    pub async fn on_chat_start(&self, phase: &mut SessionPhase) -> ChatStart {
        let session_id = match phase.session_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self
                    .sessions
                    .create_session(&self.defaults.system_prompt)
                    .await;
                *phase = SessionPhase::Active {
                    session_id: id.clone(),
                };
                tracing::info!("Chat session {} started", id);
                id
            }
        };
        ChatStart {
            session_id,
            greeting: self.defaults.greeting.clone(),
        }
    }

    /// Runs one turn and returns the recorded assistant message. If the
    /// reply stream fails, the user message stays in history and nothing
    /// else is appended.
    pub async fn on_message(
        &self,
        session_id: &str,
        text: &str,
        mode: ChatMode,
        sink: &mut dyn TokenSink,
    ) -> Result<ChatMessage, ApiError> {
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest("message must not be empty".to_string()));
        }

        self.sessions
            .add_message(session_id, ChatMessage::user(text))
            .await?;
        let history = self.sessions.get_history(session_id).await?;

        let stream = match mode {
            ChatMode::Chat => self.llm.complete(history, None).await?,
            ChatMode::Rag => {
                let earlier = &history[..history.len().saturating_sub(1)];
                let intent = self.router.classify(text, earlier).await?;
                sink.send_intent(intent).await?;
                self.tools.dispatch(intent, text, &history).await?
            }
        };

        let reply = forward_tokens(stream, sink).await?;
        let message = ChatMessage::assistant(reply);
        self.sessions
            .add_message(session_id, message.clone())
            .await?;
        Ok(message)
    }

    pub async fn on_chat_end(&self, phase: &mut SessionPhase) {
        if let SessionPhase::Active { session_id } = std::mem::take(phase) {
            self.sessions.delete_session(&session_id).await;
            tracing::info!("Chat session {} ended", session_id);
        }
    }
}

async fn forward_tokens(mut stream: TokenStream, sink: &mut dyn TokenSink) -> Result<String, ApiError> {
    let mut full_response = String::new();
    while let Some(chunk) = stream.recv().await {
        let token = chunk?;
        if token.is_empty() {
            continue;
        }
        full_response.push_str(&token);
        sink.send_token(&token).await?;
    }
    Ok(full_response)
}
