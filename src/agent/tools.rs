//! The three handlers an intent can be routed to.

use std::sync::Arc;

use super::router::Intent;
use super::summarizer::MapReduceSummarizer;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, LlmService, TokenStream};
use crate::rag::{ContextBuilder, DocumentStore, QueryPipeline};

const CONTEXT_INSTRUCTIONS: &str = "Answer the user's question using only the context below.\n\
Cite sources by their bracketed number when you use them.\n\
If the context does not contain the answer, say that you don't know.";

#[derive(Clone)]
pub struct ToolHandlers {
    llm: LlmService,
    store: Arc<dyn DocumentStore>,
    query: QueryPipeline,
    summarizer: MapReduceSummarizer,
    max_context_chars: usize,
}

impl ToolHandlers {
    pub fn new(
        llm: LlmService,
        store: Arc<dyn DocumentStore>,
        query: QueryPipeline,
        summarizer: MapReduceSummarizer,
        max_context_chars: usize,
    ) -> Self {
        Self {
            llm,
            store,
            query,
            summarizer,
            max_context_chars,
        }
    }

    /// Runs exactly one handler for `intent`. `history` ends with the
    /// user message carrying `query`.
    pub async fn dispatch(
        &self,
        intent: Intent,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<TokenStream, ApiError> {
        tracing::info!("Dispatching {} request", intent.as_str());
        match intent {
            Intent::Summarize => self.summarize_document(query).await,
            Intent::RetrieveContext => self.answer_from_context(query).await,
            Intent::Converse => self.reply_conversationally(history).await,
        }
    }

    /// Summarizes the most recently uploaded document.
    pub async fn summarize_document(&self, query: &str) -> Result<TokenStream, ApiError> {
        let Some(source) = self.store.latest_source().await? else {
            return Err(ApiError::BadRequest("no document to summarize".to_string()));
        };
        let chunks: Vec<String> = self
            .store
            .documents_for_source(&source)
            .await?
            .into_iter()
            .map(|doc| doc.content)
            .collect();
        tracing::debug!("Summarizing {} ({} chunks)", source, chunks.len());
        self.summarizer.summarize(query, &chunks).await
    }

    pub async fn answer_from_context(&self, query: &str) -> Result<TokenStream, ApiError> {
        let hits = self.query.retrieve(query).await?;
        let context = ContextBuilder::new(self.max_context_chars).build(&hits);
        let context = if context.is_empty() {
            "(no relevant documents found)".to_string()
        } else {
            tracing::debug!("Answering from {:?}", ContextBuilder::sources(&context));
            context
        };

        let messages = vec![
            ChatMessage::system(format!("{}\n\nContext:\n{}", CONTEXT_INSTRUCTIONS, context)),
            ChatMessage::user(query),
        ];
        Ok(self.llm.complete(messages, None).await?)
    }

    pub async fn reply_conversationally(
        &self,
        history: &[ChatMessage],
    ) -> Result<TokenStream, ApiError> {
        Ok(self.llm.complete(history.to_vec(), None).await?)
    }
}
