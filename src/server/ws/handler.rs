use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use super::protocol::{WsIncomingMessage, WsOutgoingMessage};
use crate::agent::Intent;
use crate::chat::{ChatMode, SessionPhase, TokenSink};
use crate::core::errors::ApiError;
use crate::state::AppState;

type WsSender = SplitSink<WebSocket, Message>;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin = headers.get("origin").and_then(|v| v.to_str().ok());
    let origin_ok = origin_allowed(origin, &state.settings.server.effective_origins());
    if !origin_ok {
        tracing::warn!("Rejecting WebSocket from origin {:?}", origin);
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, origin_ok))
}

/// One chat session per connection: started on connect, discarded on close.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, origin_ok: bool) {
    let (mut sender, mut receiver) = socket.split();

    if !origin_ok {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4003,
                reason: "Forbidden: Invalid Origin".into(),
            })))
            .await;
        return;
    }

    let mut phase = SessionPhase::Idle;
    let start = state.chat.on_chat_start(&mut phase).await;
    let opened = async {
        send_json(
            &mut sender,
            &WsOutgoingMessage::SessionStarted {
                session_id: start.session_id,
            },
        )
        .await?;
        send_json(
            &mut sender,
            &WsOutgoingMessage::Greeting {
                message: start.greeting,
            },
        )
        .await
    }
    .await;

    if opened.is_ok() {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let result = match serde_json::from_str::<WsIncomingMessage>(&text) {
                        Ok(incoming) => handle_message(&mut sender, &state, &phase, incoming).await,
                        Err(err) => Err(ApiError::BadRequest(format!("Invalid message: {}", err))),
                    };
                    if let Err(err) = result {
                        tracing::warn!("Chat turn failed: {}", err);
                        let payload = WsOutgoingMessage::Error {
                            message: err.to_string(),
                        };
                        if send_json(&mut sender, &payload).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    }

    state.chat.on_chat_end(&mut phase).await;
}

async fn handle_message(
    sender: &mut WsSender,
    state: &AppState,
    phase: &SessionPhase,
    data: WsIncomingMessage,
) -> Result<(), ApiError> {
    match data.msg_type.as_deref() {
        None | Some("message") => {}
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "Unsupported message type: {}",
                other
            )))
        }
    }

    let message_text = data.message.unwrap_or_default();
    let Some(session_id) = phase.session_id() else {
        return Err(ApiError::BadRequest("No active chat session".to_string()));
    };
    let mode = ChatMode::parse(data.mode.as_deref())?;

    let mut sink = WsTokenSink {
        sender: &mut *sender,
        mode,
    };
    let reply = state
        .chat
        .on_message(session_id, &message_text, mode, &mut sink)
        .await?;

    send_json(
        sender,
        &WsOutgoingMessage::Done {
            message: reply.content,
            mode,
        },
    )
    .await
}

/// Forwards a turn's tokens to the socket as `chunk` messages.
struct WsTokenSink<'a> {
    sender: &'a mut WsSender,
    mode: ChatMode,
}

#[async_trait]
impl TokenSink for WsTokenSink<'_> {
    async fn send_token(&mut self, token: &str) -> Result<(), ApiError> {
        let payload = WsOutgoingMessage::Chunk {
            message: token.to_string(),
            mode: self.mode,
        };
        send_json(self.sender, &payload).await
    }

    async fn send_intent(&mut self, intent: Intent) -> Result<(), ApiError> {
        let payload = WsOutgoingMessage::Intent {
            intent,
            tag: intent.tag(),
        };
        send_json(self.sender, &payload).await
    }
}

pub async fn send_json(sender: &mut WsSender, payload: &WsOutgoingMessage) -> Result<(), ApiError> {
    let text = serde_json::to_string(payload).map_err(ApiError::internal)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}

/// Browsers always send `Origin`; local non-browser clients may omit it.
fn origin_allowed(origin: Option<&str>, allowed: &[String]) -> bool {
    let Some(origin) = origin else {
        return true;
    };
    allowed
        .iter()
        .any(|entry| origin == entry || origin.starts_with(&format!("{}/", entry)))
}
