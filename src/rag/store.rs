//! DocumentStore trait and the process-wide in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::bm25::Bm25Index;
use crate::core::errors::ApiError;
use crate::vector_math::rank_descending_by_cosine;

/// A stored chunk of an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    /// Uploaded file name the chunk came from.
    pub source: String,
    pub chunk_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    /// Retriever-specific score (higher = better).
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub chunks: usize,
    pub ingested_at: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn write_documents(&self, documents: Vec<Document>) -> Result<usize, ApiError>;

    /// Drops every chunk of `source`, then writes `documents` in its place.
    async fn replace_source(
        &self,
        source: &str,
        documents: Vec<Document>,
    ) -> Result<usize, ApiError>;

    /// Top `limit` documents by cosine similarity to `query_embedding`.
    async fn embedding_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, ApiError>;

    /// Top `limit` documents by BM25 score against `query`.
    async fn bm25_search(&self, query: &str, limit: usize) -> Result<Vec<ScoredDocument>, ApiError>;

    /// Chunks of one source in split order.
    async fn documents_for_source(&self, source: &str) -> Result<Vec<Document>, ApiError>;

    /// The source written most recently, if any.
    async fn latest_source(&self) -> Result<Option<String>, ApiError>;

    async fn sources(&self) -> Result<Vec<SourceSummary>, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;
}

#[derive(Default)]
struct StoreInner {
    documents: Vec<Document>,
    bm25: Option<Bm25Index>,
}

impl StoreInner {
    fn rebuild_bm25(&mut self) {
        let corpus = self
            .documents
            .iter()
            .map(|doc| (doc.id, doc.content.as_str()));
        self.bm25 = Some(Bm25Index::from_corpus(corpus));
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn write_documents(&self, documents: Vec<Document>) -> Result<usize, ApiError> {
        let written = documents.len();
        let mut inner = self.inner.write().await;
        inner.documents.extend(documents);
        inner.rebuild_bm25();
        tracing::debug!(
            "Wrote {} documents; store now holds {}",
            written,
            inner.documents.len()
        );
        Ok(written)
    }

    async fn replace_source(
        &self,
        source: &str,
        documents: Vec<Document>,
    ) -> Result<usize, ApiError> {
        let written = documents.len();
        let mut inner = self.inner.write().await;
        let before = inner.documents.len();
        inner.documents.retain(|doc| doc.source != source);
        let removed = before - inner.documents.len();
        inner.documents.extend(documents);
        inner.rebuild_bm25();
        if removed > 0 {
            tracing::info!("Replaced {} stale chunks of {}", removed, source);
        }
        Ok(written)
    }

    async fn embedding_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, ApiError> {
        let inner = self.inner.read().await;
        let embedded: Vec<&Document> = inner
            .documents
            .iter()
            .filter(|doc| doc.embedding.is_some())
            .collect();
        let vectors: Vec<&[f32]> = embedded
            .iter()
            .filter_map(|doc| doc.embedding.as_deref())
            .collect();

        let hits = rank_descending_by_cosine(query_embedding, &vectors)
            .into_iter()
            .take(limit)
            .map(|(idx, score)| ScoredDocument {
                document: embedded[idx].clone(),
                score,
            })
            .collect();
        Ok(hits)
    }

    async fn bm25_search(&self, query: &str, limit: usize) -> Result<Vec<ScoredDocument>, ApiError> {
        let inner = self.inner.read().await;
        let Some(index) = inner.bm25.as_ref() else {
            return Ok(Vec::new());
        };
        let hits = index
            .search(query, limit)
            .into_iter()
            .filter_map(|(id, score)| {
                inner
                    .documents
                    .iter()
                    .find(|doc| doc.id == id)
                    .map(|doc| ScoredDocument {
                        document: doc.clone(),
                        score,
                    })
            })
            .collect();
        Ok(hits)
    }

    async fn documents_for_source(&self, source: &str) -> Result<Vec<Document>, ApiError> {
        let inner = self.inner.read().await;
        let mut docs: Vec<Document> = inner
            .documents
            .iter()
            .filter(|doc| doc.source == source)
            .cloned()
            .collect();
        docs.sort_by_key(|doc| doc.chunk_index);
        Ok(docs)
    }

    async fn latest_source(&self) -> Result<Option<String>, ApiError> {
        let inner = self.inner.read().await;
        Ok(inner.documents.last().map(|doc| doc.source.clone()))
    }

    async fn sources(&self) -> Result<Vec<SourceSummary>, ApiError> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<SourceSummary> = Vec::new();
        for doc in &inner.documents {
            match summaries.iter_mut().find(|s| s.source == doc.source) {
                Some(summary) => {
                    summary.chunks += 1;
                    summary.ingested_at = summary.ingested_at.max(doc.ingested_at);
                }
                None => summaries.push(SourceSummary {
                    source: doc.source.clone(),
                    chunks: 1,
                    ingested_at: doc.ingested_at,
                }),
            }
        }
        Ok(summaries)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        Ok(self.inner.read().await.documents.len())
    }
}
