//! In-process `LlmProvider` double for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest, ChatSettings, TokenStream};
use crate::core::errors::LlmError;

type Responder = Box<dyn Fn(&ChatRequest) -> Result<String, LlmError> + Send + Sync>;
type Delay = Box<dyn Fn(&ChatRequest) -> Duration + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub settings: ChatSettings,
    pub streamed: bool,
}

impl RecordedCall {
    pub fn last_content(&self) -> &str {
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

pub struct ScriptedProvider {
    responder: Responder,
    delay: Delay,
    stream_tokens: Option<Vec<String>>,
    fail_stream_after_tokens: bool,
    calls: Mutex<Vec<RecordedCall>>,
    embed_models: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            responder: Box::new(|_| Ok("ok".to_string())),
            delay: Box::new(|_| Duration::ZERO),
            stream_tokens: None,
            fail_stream_after_tokens: false,
            calls: Mutex::new(Vec::new()),
            embed_models: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every streamed completion yields exactly these tokens.
    pub fn with_stream(mut self, tokens: Vec<&str>) -> Self {
        self.stream_tokens = Some(tokens.into_iter().map(str::to_string).collect());
        self
    }

    /// Streams the scripted tokens, then a transport error.
    pub fn failing_stream(mut self, tokens: Vec<&str>) -> Self {
        self.fail_stream_after_tokens = true;
        self.with_stream(tokens)
    }

    /// Computes the reply for each request. Streaming calls without scripted
    /// tokens stream this reply word by word.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&ChatRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Box::new(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn embed_models(&self) -> Vec<String> {
        self.embed_models
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, request: &ChatRequest, streamed: bool) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: request.messages.clone(),
                settings: request.settings.clone(),
                streamed,
            });
        }
    }

    async fn run(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = (self.delay)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = (self.responder)(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Letter-frequency vector; similar texts land close together.
pub fn letter_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; 26];
    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() {
            vector[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    vector
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.record(&request, false);
        self.run(&request).await
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, LlmError> {
        self.record(&request, true);
        let tokens = match &self.stream_tokens {
            Some(tokens) => tokens.clone(),
            None => self
                .run(&request)
                .await?
                .split_inclusive(' ')
                .map(str::to_string)
                .collect(),
        };

        let (tx, rx) = mpsc::channel(tokens.len() + 1);
        for token in tokens {
            let _ = tx.send(Ok(token)).await;
        }
        if self.fail_stream_after_tokens {
            let _ = tx
                .send(Err(LlmError::Transport("connection reset".to_string())))
                .await;
        }
        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, LlmError> {
        if let Ok(mut models) = self.embed_models.lock() {
            models.push(model_id.to_string());
        }
        Ok(inputs.iter().map(|text| letter_embedding(text)).collect())
    }
}
