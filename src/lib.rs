pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::error::Result;
use crate::services::{
    ai_service::{AIService, ContentGenerator},
    coordinator_service::{GenerationCoordinator, GenerationSettings},
    dedup_service::DedupService,
    embed_service::{EmbedService, EmbeddingClient},
    progress_service::ProgressBoard,
    session_service::SessionRegistry,
    store_service::CorpusStore,
};
use reqwest::Client;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CorpusStore>,
    pub coordinator: GenerationCoordinator,
    pub sessions: SessionRegistry,
    pub progress: ProgressBoard,
    pub max_batch_size: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        generator: Arc<dyn ContentGenerator>,
        embedder: Arc<dyn EmbeddingClient>,
        settings: GenerationSettings,
        max_batch_size: usize,
    ) -> Self {
        let dedup = DedupService::new(generator, embedder, store.clone(), settings.clone());
        let coordinator = GenerationCoordinator::new(store.clone(), dedup, settings);
        Self {
            store,
            coordinator,
            sessions: SessionRegistry::new(),
            progress: ProgressBoard::new(),
            max_batch_size,
        }
    }

    /// Replaces the session and progress registries with bounded ones.
    pub fn with_registry_limits(mut self, session_capacity: usize, progress_capacity: usize) -> Self {
        self.sessions = SessionRegistry::with_capacity(session_capacity);
        self.progress = ProgressBoard::with_capacity(progress_capacity);
        self
    }

    /// Wires the OpenAI-backed generator and embedding client from config.
    pub fn from_config(store: Arc<dyn CorpusStore>) -> Result<Self> {
        let config = crate::config::get_config();
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.external_timeout_secs.max(1) * 2))
            .build()?;

        let generator = AIService::new(
            config.openai_api_key.clone(),
            config.generator_model.clone(),
            http_client.clone(),
        );
        let embedder = EmbedService::new(
            config.embedding_api_key.clone(),
            config.embedding_model.clone(),
            http_client,
        );
        if !embedder.is_configured() {
            tracing::warn!("EMBEDDING_API_KEY not set, duplicate detection runs on hashes only");
        }

        Ok(Self::new(
            store,
            Arc::new(generator),
            Arc::new(embedder),
            config.generation_settings(),
            config.max_batch_size,
        )
        .with_registry_limits(config.session_capacity, config.progress_capacity))
    }
}
