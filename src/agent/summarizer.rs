use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::core::errors::{ApiError, LlmError};
use crate::llm::{ChatMessage, LlmService, TokenStream};

const MAP_INSTRUCTIONS: &str = "You summarize one excerpt of a longer document.\n\
Write a short, factual summary of the excerpt. Keep names, numbers and conclusions.\n\
Focus on what matters for the user's request. Do not add information that is not in the excerpt.";

const REDUCE_INSTRUCTIONS: &str = "You combine partial summaries of one document into a single summary.\n\
The partial summaries are not in document order. Merge overlapping points,\n\
keep the important facts, and answer the user's request directly.";

/// Map-reduce summarization: one map call per chunk on a bounded group of
/// concurrent requests, then a single streamed reduce call.
#[derive(Clone)]
pub struct MapReduceSummarizer {
    llm: LlmService,
    width: usize,
}

impl MapReduceSummarizer {
    pub fn new(llm: LlmService, width: usize) -> Self {
        Self {
            llm,
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Partial summaries arrive in completion order. The first failed map
    /// call fails the whole request and the reduce step never runs.
    pub async fn summarize(&self, query: &str, chunks: &[String]) -> Result<TokenStream, ApiError> {
        if chunks.is_empty() {
            return Err(ApiError::BadRequest("no document to summarize".to_string()));
        }
        tracing::info!(
            "Summarizing {} chunks with {} concurrent map calls",
            chunks.len(),
            self.width
        );

        let map_calls: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| self.map_chunk(query, index, chunk))
            .collect();
        let partials: Vec<String> = stream::iter(map_calls)
            .buffer_unordered(self.width)
            .try_collect()
            .await?;

        let messages = vec![
            ChatMessage::system(REDUCE_INSTRUCTIONS),
            ChatMessage::user(format!(
                "User request:\n{}\n\nPartial summaries ({}):\n{}",
                query,
                partials.len(),
                partials
                    .iter()
                    .map(|partial| format!("- {}", partial))
                    .collect::<Vec<_>>()
                    .join("\n")
            )),
        ];
        Ok(self.llm.complete(messages, None).await?)
    }

    async fn map_chunk(&self, query: &str, index: usize, chunk: &str) -> Result<String, LlmError> {
        let messages = vec![
            ChatMessage::system(MAP_INSTRUCTIONS),
            ChatMessage::user(format!("User request:\n{}\n\nExcerpt:\n{}", query, chunk)),
        ];
        let summary = self.llm.complete_text(messages, None).await?;
        tracing::debug!("Chunk {} summarized", index);
        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LlmSettings;
    use crate::llm::testing::ScriptedProvider;
    use crate::llm::ChatRequest;
    use std::sync::Arc;
    use std::time::Duration;

    fn is_map(request: &ChatRequest) -> bool {
        request.messages[0].content == MAP_INSTRUCTIONS
    }

    fn excerpt(request: &ChatRequest) -> String {
        request
            .messages
            .last()
            .and_then(|m| m.content.split("Excerpt:\n").nth(1))
            .unwrap_or_default()
            .to_string()
    }

    fn summarizer(provider: ScriptedProvider, width: usize) -> (MapReduceSummarizer, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let llm = LlmService::new(
            provider.clone(),
            LlmSettings::default().chat_settings(),
            "embed".into(),
        );
        (MapReduceSummarizer::new(llm, width), provider)
    }

    fn echo_provider() -> ScriptedProvider {
        ScriptedProvider::new().with_responder(|request| {
            if is_map(request) {
                Ok(format!("summary of {}", excerpt(request)))
            } else {
                Ok("final summary".to_string())
            }
        })
    }

    async fn drain(mut stream: TokenStream) -> String {
        let mut text = String::new();
        while let Some(token) = stream.recv().await {
            text.push_str(&token.unwrap());
        }
        text
    }

    #[tokio::test]
    async fn n_chunks_make_n_map_calls_and_one_reduce() {
        let (summarizer, provider) = summarizer(echo_provider(), 3);
        let chunks: Vec<String> = (0..5).map(|i| format!("chunk-{}", i)).collect();

        let stream = summarizer.summarize("summarize this", &chunks).await.unwrap();
        assert_eq!(drain(stream).await, "final summary");

        let calls = provider.calls();
        let maps = calls.iter().filter(|c| !c.streamed).count();
        let reduces: Vec<_> = calls.iter().filter(|c| c.streamed).collect();
        assert_eq!(maps, 5);
        assert_eq!(reduces.len(), 1);
        let reduce_input = reduces[0].last_content();
        assert!(reduce_input.contains("Partial summaries (5)"));
        for chunk in &chunks {
            assert!(reduce_input.contains(&format!("summary of {}", chunk)));
        }
    }

    #[tokio::test]
    async fn partials_are_collected_in_completion_order() {
        let provider = echo_provider().with_delay(|request| {
            match excerpt(request).as_str() {
                "alpha" => Duration::from_millis(120),
                "beta" => Duration::from_millis(60),
                _ => Duration::ZERO,
            }
        });
        let (summarizer, provider) = summarizer(provider, 3);
        let chunks = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];

        drain(summarizer.summarize("overview", &chunks).await.unwrap()).await;

        let calls = provider.calls();
        let reduce = calls.iter().find(|c| c.streamed).unwrap();
        let input = reduce.last_content();
        let gamma = input.find("summary of gamma").unwrap();
        let beta = input.find("summary of beta").unwrap();
        let alpha = input.find("summary of alpha").unwrap();
        assert!(gamma < beta && beta < alpha);
    }

    #[tokio::test]
    async fn map_calls_never_exceed_the_width() {
        let provider = echo_provider().with_delay(|request| {
            if is_map(request) {
                Duration::from_millis(20)
            } else {
                Duration::ZERO
            }
        });
        let (summarizer, provider) = summarizer(provider, 3);
        let chunks: Vec<String> = (0..9).map(|i| format!("part {}", i)).collect();

        drain(summarizer.summarize("overview", &chunks).await.unwrap()).await;

        assert!(provider.max_in_flight() <= 3);
        assert!(provider.max_in_flight() > 1);
        assert_eq!(provider.calls().len(), 10);
    }

    #[tokio::test]
    async fn a_failed_map_call_aborts_before_reduce() {
        let provider = ScriptedProvider::new().with_responder(|request| {
            if excerpt(request) == "broken" {
                Err(LlmError::Transport("connection reset".to_string()))
            } else {
                Ok("fine".to_string())
            }
        });
        let (summarizer, provider) = summarizer(provider, 3);
        let chunks = vec!["ok".to_string(), "broken".to_string()];

        let err = summarizer.summarize("overview", &chunks).await.unwrap_err();

        assert!(matches!(err, ApiError::Llm(LlmError::Transport(_))));
        assert!(provider.calls().iter().all(|c| !c.streamed));
    }

    #[tokio::test]
    async fn zero_chunks_is_a_bad_request_without_model_calls() {
        let (summarizer, provider) = summarizer(echo_provider(), 3);

        let err = summarizer.summarize("overview", &[]).await.unwrap_err();

        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "no document to summarize"));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn width_is_at_least_one() {
        let (summarizer, _) = summarizer(echo_provider(), 0);
        assert_eq!(summarizer.width(), 1);
    }
}
