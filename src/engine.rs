//! Engine facade wiring the pipeline together.
//!
//! [`RagEngine`] owns the full ingestion and retrieval flow:
//! chunk -> embed -> store on the way in, embed -> query -> rank -> filter on
//! the way out, plus the administrative and health boundaries. The web
//! surface in front of it is an external collaborator; these operations are
//! the engine's API.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::chunker::chunk_text;
use crate::config::EngineConfig;
use crate::embeddings::{Embedder, EmbeddingProvider};
use crate::lifecycle::{LifecycleManager, SweepReport};
use crate::retrieval::{RetrievalEngine, RetrieveRequest, RetrieveResponse};
use crate::store::{MemorySessionStore, SessionBackend};
use crate::tokenizer::{Cl100kEstimator, TokenEstimator};
use crate::types::{Chunk, Document, RagError, SessionInfo};

/// Ingestion boundary payload: documents destined for one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestRequest {
    pub session_id: String,
    pub documents: Vec<Document>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub session_id: String,
    pub chunks_created: usize,
    pub documents_processed: usize,
    pub processing_time_ms: u64,
}

/// Reachability of one external dependency.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComponentHealth {
    Up,
    Down { reason: String },
}

impl ComponentHealth {
    pub fn is_up(&self) -> bool {
        matches!(self, ComponentHealth::Up)
    }
}

/// Liveness report with the store and the model probed independently, so a
/// caller can distinguish "store down" from "model down".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub store: ComponentHealth,
    pub embedder: ComponentHealth,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.store.is_up() && self.embedder.is_up()
    }
}

/// Session-scoped chunking, embedding, and retrieval engine.
pub struct RagEngine {
    config: EngineConfig,
    estimator: Arc<dyn TokenEstimator>,
    embedder: Embedder,
    store: Arc<dyn SessionBackend>,
    retrieval: RetrievalEngine,
    lifecycle: LifecycleManager,
}

impl RagEngine {
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The lifecycle manager, for driving the sweep loop from a runtime.
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Chunks, embeds, and stores every document of the request.
    ///
    /// Validation happens before any processing: an invalid request has no
    /// partial effects. Embedding is all-or-nothing per document; a document
    /// whose embedding call fails persists nothing.
    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, RagError> {
        if request.session_id.trim().is_empty() {
            return Err(RagError::InvalidInput("session id is empty".into()));
        }
        if request.documents.is_empty() {
            return Err(RagError::InvalidInput("document list is empty".into()));
        }
        for document in &request.documents {
            if document.source_url.trim().is_empty() {
                return Err(RagError::InvalidInput("document has no source_url".into()));
            }
        }

        let started = Instant::now();
        let mut chunks_created = 0;
        for document in &request.documents {
            chunks_created += self.ingest_document(&request.session_id, document).await?;
        }

        let response = IngestResponse {
            session_id: request.session_id,
            chunks_created,
            documents_processed: request.documents.len(),
            processing_time_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            chunks_created = response.chunks_created,
            documents_processed = response.documents_processed,
            elapsed_ms = response.processing_time_ms,
            "ingestion complete"
        );
        Ok(response)
    }

    async fn ingest_document(
        &self,
        session_id: &str,
        document: &Document,
    ) -> Result<usize, RagError> {
        let drafts = chunk_text(
            &document.raw_text,
            &self.config.chunking,
            self.estimator.as_ref(),
        );
        // Whitespace-only documents chunk to nothing; still counted as
        // processed.
        if drafts.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = drafts.iter().map(|draft| draft.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let rows: Vec<(Chunk, Vec<f32>)> = drafts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (draft, vector))| {
                let suffix = Uuid::new_v4().simple().to_string();
                let chunk = Chunk {
                    chunk_id: format!("{}#{}-{}", document.source_url, chunk_index, &suffix[..8]),
                    session_id: session_id.to_string(),
                    source_url: document.source_url.clone(),
                    title: document.title.clone(),
                    chunk_index,
                    text: draft.text,
                    token_count: draft.token_count,
                };
                (chunk, vector)
            })
            .collect();

        self.store.insert(session_id, rows).await
    }

    /// Retrieves the passages of a session most relevant to a query.
    pub async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveResponse, RagError> {
        self.retrieval.retrieve(&request).await
    }

    /// Metadata for every live session.
    pub async fn sessions(&self) -> Result<Vec<SessionInfo>, RagError> {
        self.store.list().await
    }

    /// Metadata for one session, `None` if it has no collection.
    pub async fn session(&self, session_id: &str) -> Result<Option<SessionInfo>, RagError> {
        self.store.session_info(session_id).await
    }

    /// Removes a session and all its chunks. Idempotent: deleting a
    /// non-existent session is a no-op success (`false`).
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, RagError> {
        self.store.delete(session_id).await
    }

    /// Manually triggers a retention sweep.
    pub async fn sweep(&self) -> Result<SweepReport, RagError> {
        self.lifecycle.sweep().await
    }

    /// Probes the vector store and the embedding capability independently.
    pub async fn health(&self) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => ComponentHealth::Up,
            Err(err) => ComponentHealth::Down {
                reason: err.to_string(),
            },
        };
        let embedder = match self.embedder.ping().await {
            Ok(()) => ComponentHealth::Up,
            Err(err) => ComponentHealth::Down {
                reason: err.to_string(),
            },
        };
        HealthReport { store, embedder }
    }
}

/// Builder for [`RagEngine`]. The embedding provider is required; config,
/// estimator, and store have sensible defaults (validated config, cl100k
/// tokenization, in-memory store).
#[derive(Default)]
pub struct RagEngineBuilder {
    config: Option<EngineConfig>,
    estimator: Option<Arc<dyn TokenEstimator>>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn SessionBackend>>,
}

impl RagEngineBuilder {
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionBackend>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<RagEngine, RagError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let provider = self
            .provider
            .ok_or_else(|| RagError::Config("an embedding provider is required".into()))?;
        let estimator = match self.estimator {
            Some(estimator) => estimator,
            None => Arc::new(Cl100kEstimator::new()?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));

        let embedder = Embedder::new(provider, config.embed_batch_cap);
        let retrieval = RetrievalEngine::new(embedder.clone(), store.clone());
        let lifecycle = LifecycleManager::new(store.clone(), config.retention_window);
        Ok(RagEngine {
            config,
            estimator,
            embedder,
            store,
            retrieval,
            lifecycle,
        })
    }
}
