//! Process-held conversation histories, one per chat connection.
//!
//! Histories are append-only: messages are never edited, removed or
//! reordered while the session lives. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::llm::types::ChatMessage;

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

#[derive(Debug)]
struct ChatSession {
    history: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, ChatSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session whose history starts with the system prompt.
    pub async fn create_session(&self, system_prompt: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let session = ChatSession {
            history: vec![ChatMessage::system(system_prompt)],
            created_at: Utc::now(),
        };
        self.sessions.write().await.insert(id.clone(), session);
        tracing::debug!("Session {} started", id);
        id
    }

    /// Appends one message and returns the new history length.
    pub async fn add_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<usize, ApiError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))?;
        session.history.push(message);
        Ok(session.history.len())
    }

    pub async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|session| session.history.clone())
            .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::debug!("Session {} discarded", session_id);
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| SessionInfo {
                id: id.clone(),
                created_at: session.created_at,
                message_count: session.history.len(),
            })
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }
}
