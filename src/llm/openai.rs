use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::{ChatRequest, TokenStream};
use crate::core::config::LlmSettings;
use crate::core::errors::LlmError;

/// Client for the hosted OpenAI chat-completion and embedding endpoints
/// (or any server speaking the same wire format).
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    client: Client,
    request_timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: Option<String>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            request_timeout,
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, LlmError> {
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| LlmError::Auth("OPENAI_API_KEY is not configured".to_string()))?;
        let url = format!("{}{}", self.base_url, path);
        Ok(self.client.post(url).bearer_auth(key))
    }
}

fn completion_body(request: &ChatRequest, stream: bool) -> Value {
    let settings = &request.settings;
    json!({
        "model": settings.model,
        "messages": request.messages,
        "stream": stream,
        "temperature": settings.temperature,
        "max_tokens": settings.max_tokens,
        "top_p": settings.top_p,
        "frequency_penalty": settings.frequency_penalty,
        "presence_penalty": settings.presence_penalty,
    })
}

async fn ensure_success(res: Response) -> Result<Response, LlmError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|payload| payload["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(text);
    Err(LlmError::from_status(status.as_u16(), message))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        let res = self
            .post("/chat/completions")?
            .timeout(self.request_timeout)
            .json(&completion_body(&request, false))
            .send()
            .await?;
        let res = ensure_success(res).await?;

        let payload: Value = res.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, LlmError> {
        let res = self
            .post("/chat/completions")?
            .json(&completion_body(&request, true))
            .send()
            .await?;
        let res = ensure_success(res).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            while let Some(item) = stream.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::transport(e))).await;
                        return;
                    }
                };
                if !forward_events(&tx, decoder.push(&bytes)).await {
                    return;
                }
            }
            if !forward_events(&tx, decoder.finish()).await {
                return;
            }
            // The body closed without the terminating marker.
            let _ = tx
                .send(Err(LlmError::Transport(
                    "stream ended before [DONE]".to_string(),
                )))
                .await;
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, LlmError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .post("/embeddings")?
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;
        let res = ensure_success(res).await?;

        let payload: Value = res.json().await?;
        parse_embeddings(&payload, inputs.len())
    }
}

/// Sends decoded events on to the reader. Returns `false` once the stream is
/// over: `[DONE]` was seen, the provider reported an error, or the reader
/// went away.
async fn forward_events(
    tx: &mpsc::Sender<Result<String, LlmError>>,
    events: Vec<SseEvent>,
) -> bool {
    for event in events {
        let outcome = match event {
            SseEvent::Token(token) => Ok(token),
            SseEvent::Failure(message) => Err(LlmError::Provider {
                status: 200,
                message,
            }),
            SseEvent::Done => return false,
        };
        let failed = outcome.is_err();
        if tx.send(outcome).await.is_err() || failed {
            return false;
        }
    }
    true
}

/// Orders embeddings by their `index` field and checks one vector per input.
fn parse_embeddings(payload: &Value, expected: usize) -> Result<Vec<Vec<f32>>, LlmError> {
    let data = payload["data"].as_array().cloned().unwrap_or_default();
    let mut indexed: Vec<(usize, Vec<f32>)> = data
        .iter()
        .enumerate()
        .filter_map(|(pos, item)| {
            let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
            let vector = item["embedding"]
                .as_array()?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            Some((index, vector))
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);

    if indexed.len() != expected {
        return Err(LlmError::Provider {
            status: 200,
            message: format!(
                "expected {} embeddings, provider returned {}",
                expected,
                indexed.len()
            ),
        });
    }
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Token(String),
    Failure(String),
    Done,
}

/// Incremental decoder for `text/event-stream` completion bodies. Network
/// chunks may end mid-line (or mid-character), so the unfinished tail is kept
/// as raw bytes for the next push.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
                break;
            }
            let Ok(payload) = serde_json::from_str::<Value>(data) else {
                tracing::debug!("Skipping undecodable stream line: {}", data);
                continue;
            };
            if let Some(message) = payload["error"]["message"].as_str() {
                events.push(SseEvent::Failure(message.to_string()));
                break;
            }
            if let Some(content) = payload["choices"][0]["delta"]["content"].as_str() {
                if !content.is_empty() {
                    events.push(SseEvent::Token(content.to_string()));
                }
            }
        }
        events
    }

    /// Decodes a final line the body did not terminate with a newline.
    fn finish(&mut self) -> Vec<SseEvent> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return Vec::new();
        }
        self.push(b"\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn decoder_emits_tokens_until_done() {
        let mut decoder = SseDecoder::default();
        let body = format!("{}{}data: [DONE]\n\n", delta("Hel"), delta("lo"));

        let events = decoder.push(body.as_bytes());

        assert_eq!(
            events,
            vec![
                SseEvent::Token("Hel".into()),
                SseEvent::Token("lo".into()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn decoder_buffers_lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let line = delta("world");
        let (head, tail) = line.split_at(17);

        assert!(decoder.push(head.as_bytes()).is_empty());
        assert_eq!(
            decoder.push(tail.as_bytes()),
            vec![SseEvent::Token("world".into())]
        );
    }

    #[test]
    fn decoder_keeps_characters_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let line = delta("café");
        let bytes = line.as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(
            decoder.push(&bytes[split..]),
            vec![SseEvent::Token("café".into())]
        );
    }

    #[test]
    fn decoder_finish_flushes_an_unterminated_last_line() {
        let mut decoder = SseDecoder::default();
        let line = delta("tail");

        assert!(decoder.push(line.trim_end().as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Token("tail".into())]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn decoder_skips_role_only_and_empty_deltas() {
        let mut decoder = SseDecoder::default();
        let role = format!(
            "data: {}\n",
            json!({"choices": [{"delta": {"role": "assistant"}}]})
        );
        let body = format!("{}{}: keep-alive\n", role, delta(""));

        assert!(decoder.push(body.as_bytes()).is_empty());
    }

    #[test]
    fn decoder_surfaces_inline_errors() {
        let mut decoder = SseDecoder::default();
        let body = format!("data: {}\n", json!({"error": {"message": "overloaded"}}));

        assert_eq!(
            decoder.push(body.as_bytes()),
            vec![SseEvent::Failure("overloaded".into())]
        );
    }

    #[test]
    fn completion_body_carries_all_settings() {
        let settings = LlmSettings::default().chat_settings();
        let request = ChatRequest::new(vec![ChatMessage::user("hi")], settings);

        let body = completion_body(&request, true);

        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["presence_penalty"], 0.0);
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let payload = json!({"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]});

        let vectors = parse_embeddings(&payload, 2).unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(parse_embeddings(&payload, 3).is_err());
    }

    /// Serves one streaming completion with `body`, then closes the socket.
    async fn serve_once(body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{}",
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn collect_stream(base_url: String) -> Vec<Result<String, LlmError>> {
        let provider = OpenAiProvider::new(
            base_url,
            Some("sk-test".to_string()),
            Duration::from_secs(5),
        );
        let request = ChatRequest::new(
            vec![ChatMessage::user("hi")],
            LlmSettings::default().chat_settings(),
        );
        let mut stream = provider.stream_chat(request).await.unwrap();
        let mut items = Vec::new();
        while let Some(item) = stream.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn stream_cut_before_done_ends_with_transport_error() {
        let base_url = serve_once(delta("Hel")).await;

        let items = collect_stream(base_url).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Hel");
        assert!(matches!(items[1], Err(LlmError::Transport(_))));
    }

    #[tokio::test]
    async fn stream_with_done_ends_cleanly() {
        let base_url = serve_once(format!("{}{}data: [DONE]", delta("Hel"), delta("lo"))).await;

        let items = collect_stream(base_url).await;

        let tokens: Vec<String> = items.into_iter().map(|item| item.unwrap()).collect();
        assert_eq!(tokens, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let provider = OpenAiProvider::new(
            "http://127.0.0.1:9".to_string(),
            None,
            Duration::from_secs(1),
        );
        let request = ChatRequest::new(
            vec![ChatMessage::user("hi")],
            LlmSettings::default().chat_settings(),
        );

        let err = provider.stream_chat(request).await.unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));

        let err = provider
            .embed(&["x".to_string()], "text-embedding-3-small")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));
    }
}
