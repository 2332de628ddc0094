use serde::{Deserialize, Serialize};

use crate::agent::Intent;
use crate::chat::ChatMode;

#[derive(Debug, Deserialize, Default)]
pub struct WsIncomingMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub message: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoingMessage {
    SessionStarted {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Greeting {
        message: String,
    },
    Intent {
        intent: Intent,
        tag: &'static str,
    },
    Chunk {
        message: String,
        mode: ChatMode,
    },
    Done {
        message: String,
        mode: ChatMode,
    },
    Error {
        message: String,
    },
}
