//! Session-scoped storage for chunks and their embeddings.
//!
//! The [`SessionBackend`] trait abstracts the vector-search-capable storage
//! engine so code works against any backend without being tied to a specific
//! one. A session's collection is the unit of isolation: queries never cross
//! session boundaries.

pub mod memory;

use async_trait::async_trait;

use crate::types::{Chunk, RagError, SessionInfo};

pub use memory::MemorySessionStore;

/// A chunk returned from a similarity query, annotated with its score.
///
/// Similarity is cosine, in `[-1, 1]`; higher ranks first.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// Result of a similarity query against one session's collection.
#[derive(Clone, Debug)]
pub struct QueryOutcome {
    /// Ranked hits, best first, at most `top_k`.
    pub hits: Vec<ScoredChunk>,
    /// Total chunks scored before truncation.
    pub candidates_searched: usize,
}

/// Storage backend holding one isolated collection per session.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Ensures a collection exists for `session_id` and returns its
    /// metadata. Idempotent.
    async fn create_or_get(&self, session_id: &str) -> Result<SessionInfo, RagError>;

    /// Appends chunks with their vectors to the session's collection,
    /// creating it if needed. Fails with [`RagError::DimensionMismatch`]
    /// (storing nothing) if any vector's length disagrees with the
    /// collection's established dimensionality, or if the batch itself is
    /// internally inconsistent. Returns the number of chunks stored.
    async fn insert(
        &self,
        session_id: &str,
        chunks: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<usize, RagError>;

    /// Ranks the session's chunks against `query_vector` and returns the top
    /// `top_k` by cosine similarity. Equal scores keep insertion order.
    /// Fails with [`RagError::SessionNotFound`] when the session has no
    /// collection.
    async fn query(
        &self,
        session_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<QueryOutcome, RagError>;

    /// Removes the session's collection and all its chunks. Idempotent:
    /// returns `false` when there was nothing to delete.
    async fn delete(&self, session_id: &str) -> Result<bool, RagError>;

    /// Metadata for every live session.
    async fn list(&self) -> Result<Vec<SessionInfo>, RagError>;

    /// Metadata for one session, `None` if it has no collection.
    async fn session_info(&self, session_id: &str) -> Result<Option<SessionInfo>, RagError>;

    /// Liveness probe for the health boundary.
    async fn ping(&self) -> Result<(), RagError>;
}
