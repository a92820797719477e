//! In-memory session store.
//!
//! An explicit map from session id to an owned collection, guarded by a
//! single `RwLock`. Creation of a collection happens under the write lock, so
//! two concurrent first inserts into the same session cannot race into
//! duplicate collections. Deletion takes the same lock and is therefore a
//! barrier: an insert that arrives after a delete lands in a freshly
//! recreated collection with a new `created_at`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::{QueryOutcome, ScoredChunk, SessionBackend};
use crate::types::{Chunk, RagError, SessionInfo};

struct Collection {
    created_at: DateTime<Utc>,
    /// Established by the first inserted vector; every later vector must
    /// agree.
    dimensions: Option<usize>,
    /// Append-only; index doubles as the tie-break key.
    rows: Vec<(Chunk, Vec<f32>)>,
}

impl Collection {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            dimensions: None,
            rows: Vec::new(),
        }
    }

    fn info(&self, session_id: &str) -> SessionInfo {
        SessionInfo {
            session_id: session_id.to_string(),
            created_at: self.created_at,
            chunk_count: self.rows.len(),
        }
    }
}

/// Vector-search-capable store keeping every session's collection in memory.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Collection>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl SessionBackend for MemorySessionStore {
    async fn create_or_get(&self, session_id: &str) -> Result<SessionInfo, RagError> {
        let mut guard = self.sessions.write();
        let collection = guard
            .entry(session_id.to_string())
            .or_insert_with(Collection::new);
        Ok(collection.info(session_id))
    }

    async fn insert(
        &self,
        session_id: &str,
        chunks: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<usize, RagError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut guard = self.sessions.write();

        // Validate the whole batch against the established dimensionality
        // (or the batch's own first vector) before touching the collection,
        // so a mismatch stores nothing.
        let expected = guard
            .get(session_id)
            .and_then(|collection| collection.dimensions)
            .unwrap_or(chunks[0].1.len());
        for (_, vector) in &chunks {
            if vector.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let collection = guard
            .entry(session_id.to_string())
            .or_insert_with(Collection::new);
        collection.dimensions.get_or_insert(expected);
        let inserted = chunks.len();
        collection.rows.extend(chunks);
        debug!(
            session_id,
            inserted,
            total = collection.rows.len(),
            "appended chunks to session collection"
        );
        Ok(inserted)
    }

    async fn query(
        &self,
        session_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<QueryOutcome, RagError> {
        let guard = self.sessions.read();
        let collection = guard
            .get(session_id)
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))?;

        if let Some(expected) = collection.dimensions {
            if query_vector.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query_vector.len(),
                });
            }
        }

        let candidates_searched = collection.rows.len();
        let mut scored: Vec<(usize, f32)> = collection
            .rows
            .iter()
            .enumerate()
            .map(|(index, (_, vector))| (index, cosine_similarity(query_vector, vector)))
            .collect();
        // Descending similarity; equal scores keep insertion order.
        scored.sort_by(|(ia, sa), (ib, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });
        scored.truncate(top_k);

        let hits = scored
            .into_iter()
            .map(|(index, similarity)| ScoredChunk {
                chunk: collection.rows[index].0.clone(),
                similarity,
            })
            .collect();
        Ok(QueryOutcome {
            hits,
            candidates_searched,
        })
    }

    async fn delete(&self, session_id: &str) -> Result<bool, RagError> {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            debug!(session_id, "deleted session collection");
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<SessionInfo>, RagError> {
        let guard = self.sessions.read();
        let mut sessions: Vec<SessionInfo> = guard
            .iter()
            .map(|(session_id, collection)| collection.info(session_id))
            .collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(sessions)
    }

    async fn session_info(&self, session_id: &str) -> Result<Option<SessionInfo>, RagError> {
        let guard = self.sessions.read();
        Ok(guard
            .get(session_id)
            .map(|collection| collection.info(session_id)))
    }

    async fn ping(&self) -> Result<(), RagError> {
        Ok(())
    }
}
