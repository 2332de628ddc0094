use std::sync::Arc;

use crate::agent::{IntentRouter, MapReduceSummarizer, ToolHandlers};
use crate::chat::ChatController;
use crate::core::config::{AppPaths, AppSettings, ConfigService};
use crate::llm::{LlmProvider, LlmService, OpenAiProvider};
use crate::rag::{DocumentStore, InMemoryDocumentStore, IndexingPipeline, QueryPipeline};
use crate::session::SessionStore;

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes and socket tasks.
///
/// Services are built once from the settings resolved at startup; config
/// edits made through the API take effect on the next start.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: AppSettings,
    pub sessions: SessionStore,
    pub documents: Arc<dyn DocumentStore>,
    pub llm: LlmService,
    pub indexing: IndexingPipeline,
    pub chat: ChatController,
}

impl AppState {
    /// Loads `.env`, resolves paths, starts logging, then resolves settings
    /// and connects the model client to the configured OpenAI-compatible
    /// endpoint.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let _ = dotenvy::dotenv();
        let paths = Arc::new(AppPaths::new());
        let project_env = paths.project_root.join(".env");
        if project_env.exists() {
            let _ = dotenvy::from_path(&project_env);
        }
        crate::core::logging::init(&paths);

        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;
        let provider = Arc::new(OpenAiProvider::from_settings(&settings.llm));

        Self::build(paths, config, settings, provider)
    }

    /// Wires every service around the given model provider.
    pub fn build(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: AppSettings,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Arc<Self>, InitializationError> {
        if settings.rag.chunk_overlap >= settings.rag.chunk_size {
            return Err(InitializationError::Rag(anyhow::anyhow!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                settings.rag.chunk_overlap,
                settings.rag.chunk_size
            )));
        }

        let llm = LlmService::new(
            provider,
            settings.llm.chat_settings(),
            settings.llm.embedding_model.clone(),
        );
        let sessions = SessionStore::new();
        let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());

        let indexing = IndexingPipeline::new(
            llm.clone(),
            documents.clone(),
            &settings.rag,
            paths.uploads_dir.clone(),
        );
        let query = QueryPipeline::new(llm.clone(), documents.clone(), &settings.rag);
        let summarizer = MapReduceSummarizer::new(llm.clone(), settings.rag.summarize_concurrency);
        let tools = ToolHandlers::new(
            llm.clone(),
            documents.clone(),
            query,
            summarizer,
            settings.rag.max_context_chars,
        );
        let chat = ChatController::new(
            sessions.clone(),
            llm.clone(),
            IntentRouter::new(llm.clone()),
            tools,
            settings.chat.clone(),
        );

        tracing::info!(
            "Model client ready: provider={}, model={}",
            llm.provider_name(),
            llm.settings().model
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            settings,
            sessions,
            documents,
            llm,
            indexing,
            chat,
        }))
    }
}
