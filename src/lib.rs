//! Session-scoped chunking, embedding, and retrieval for ephemeral search
//! sessions.
//!
//! ```text
//! Ingestion request ──► chunker::chunk_text ──► PassageDraft sequence
//!                                  │
//!                                  └─► tokenizer (cl100k length estimation)
//!
//! PassageDrafts ──► embeddings::Embedder (batched) ──► vectors
//!               └─► store::SessionBackend::insert (per-session collection)
//!
//! Retrieval request ──► embeddings (query vector)
//!                   ──► store::query ──► retrieval (threshold + rank) ──► response
//!
//! lifecycle::LifecycleManager ──► periodic retention sweep of stale sessions
//! ```
//!
//! Each search session owns an isolated, short-lived collection of embedded
//! passages; the [`engine::RagEngine`] facade exposes the ingestion,
//! retrieval, administrative, and health boundaries over it.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod lifecycle;
pub mod retrieval;
pub mod store;
pub mod tokenizer;
pub mod types;

pub use chunker::{PassageDraft, chunk_text};
pub use config::{ChunkingConfig, EngineConfig};
pub use embeddings::{Embedder, EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use engine::{ComponentHealth, HealthReport, IngestRequest, IngestResponse, RagEngine};
pub use lifecycle::{LifecycleManager, SessionState, SweepReport};
pub use retrieval::{RetrievalEngine, RetrieveRequest, RetrieveResponse, RetrievedChunk};
pub use store::{MemorySessionStore, QueryOutcome, ScoredChunk, SessionBackend};
pub use tokenizer::{Cl100kEstimator, TokenEstimator};
pub use types::{Chunk, Document, RagError, SessionInfo};
