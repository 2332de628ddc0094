//! Indexing (convert → clean → split → embed → write) and query
//! (embed → dense + keyword retrieval → fuse) pipelines.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::convert::{extract_text, DocumentFormat};
use super::fusion::{rrf_fuse, RrfConfig};
use super::splitter::{clean_text, SplitterConfig, TextSplitter};
use super::store::{Document, DocumentStore, ScoredDocument};
use crate::core::config::RagSettings;
use crate::core::errors::{ApiError, LlmError, RagError};
use crate::llm::LlmService;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub chunks: usize,
    pub stored_path: PathBuf,
    /// Set when the document hit the chunk cap and its tail was not indexed.
    pub truncated: bool,
}

#[derive(Clone)]
pub struct IndexingPipeline {
    llm: LlmService,
    store: Arc<dyn DocumentStore>,
    splitter: SplitterConfig,
    uploads_dir: PathBuf,
}

impl IndexingPipeline {
    pub fn new(
        llm: LlmService,
        store: Arc<dyn DocumentStore>,
        settings: &RagSettings,
        uploads_dir: PathBuf,
    ) -> Self {
        Self {
            llm,
            store,
            splitter: SplitterConfig::from(settings),
            uploads_dir,
        }
    }

    /// Saves the raw upload under `uploads/`, then indexes its text. A
    /// re-upload under the same name replaces the earlier chunks.
    pub async fn ingest(&self, file_name: &str, bytes: &[u8]) -> Result<IngestReport, ApiError> {
        let file_name = sanitize_file_name(file_name)?;
        let format = DocumentFormat::from_file_name(&file_name)?;

        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .map_err(RagError::from)?;
        let stored_path = self.uploads_dir.join(&file_name);
        tokio::fs::write(&stored_path, bytes)
            .await
            .map_err(RagError::from)?;

        let owned = bytes.to_vec();
        let name = file_name.clone();
        let raw = tokio::task::spawn_blocking(move || extract_text(format, &owned, &name))
            .await
            .map_err(ApiError::internal)??;

        let cleaned = clean_text(&raw);
        let split = TextSplitter::new(self.splitter.clone()).split(&cleaned);
        let truncated = split.truncated;
        let chunks = split.chunks;
        if chunks.is_empty() {
            return Err(RagError::Extraction {
                source_name: file_name,
                reason: "no text found".to_string(),
            }
            .into());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.llm.embed(&texts).await?;

        let ingested_at = Utc::now();
        let documents: Vec<Document> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| Document {
                id: Uuid::new_v4(),
                content: chunk.text,
                source: file_name.clone(),
                chunk_index: chunk.chunk_index,
                embedding: Some(embedding),
                ingested_at,
            })
            .collect();

        let written = self.store.replace_source(&file_name, documents).await?;
        if truncated {
            tracing::warn!(
                "{} exceeds {} chunks; the rest of the document was not indexed",
                file_name,
                self.splitter.max_chunks
            );
        }
        tracing::info!("Indexed {} ({} chunks)", file_name, written);

        Ok(IngestReport {
            source: file_name,
            chunks: written,
            stored_path,
            truncated,
        })
    }
}

/// Keeps only the final path component of a client-supplied name.
fn sanitize_file_name(file_name: &str) -> Result<String, ApiError> {
    let normalized = file_name.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid file name: {:?}", file_name)))
}

#[derive(Clone)]
pub struct QueryPipeline {
    llm: LlmService,
    store: Arc<dyn DocumentStore>,
    retriever_top_k: usize,
    rrf: RrfConfig,
}

impl QueryPipeline {
    pub fn new(llm: LlmService, store: Arc<dyn DocumentStore>, settings: &RagSettings) -> Self {
        Self {
            llm,
            store,
            retriever_top_k: settings.retriever_top_k,
            rrf: RrfConfig {
                k: settings.rrf_k,
                top_k: settings.top_k,
            },
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredDocument>, ApiError> {
        let query_embedding = self
            .llm
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Provider {
                status: 200,
                message: "no embedding returned for query".to_string(),
            })?;

        let (dense, sparse) = tokio::try_join!(
            self.store
                .embedding_search(&query_embedding, self.retriever_top_k),
            self.store.bm25_search(query, self.retriever_top_k),
        )?;
        tracing::debug!(
            "Retrieved {} dense and {} keyword candidates",
            dense.len(),
            sparse.len()
        );

        Ok(rrf_fuse(&[dense, sparse], &self.rrf))
    }
}
