//! Query-time retrieval: embed, over-fetch, filter, rank.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embeddings::Embedder;
use crate::store::SessionBackend;
use crate::types::RagError;

/// More candidates than `max_results` are requested from the store so the
/// similarity threshold can reject chunks without starving the result set.
const OVER_FETCH_FACTOR: usize = 4;
const OVER_FETCH_CAP: usize = 50;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub session_id: String,
    pub query: String,
    pub max_results: usize,
    pub similarity_threshold: f32,
}

/// One retrieved passage with provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub score: f32,
    pub source_url: String,
    pub chunk_index: usize,
}

/// Retrieval result. `chunks` may be empty in two distinct situations the
/// caller can tell apart: the session has no collection
/// (`session_found == false`), or it has content but nothing above the
/// threshold (`session_found == true`, `total_candidates_searched > 0`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub chunks: Vec<RetrievedChunk>,
    pub total_candidates_searched: usize,
    pub session_found: bool,
}

/// Ranks and threshold-filters a session's chunks against a query.
#[derive(Clone)]
pub struct RetrievalEngine {
    embedder: Embedder,
    store: Arc<dyn SessionBackend>,
}

impl RetrievalEngine {
    pub fn new(embedder: Embedder, store: Arc<dyn SessionBackend>) -> Self {
        Self { embedder, store }
    }

    pub async fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse, RagError> {
        if request.query.trim().is_empty() {
            return Err(RagError::InvalidInput("query is empty".into()));
        }
        if request.session_id.trim().is_empty() {
            return Err(RagError::InvalidInput("session id is empty".into()));
        }
        if request.max_results == 0 {
            return Err(RagError::InvalidInput("max_results must be positive".into()));
        }
        if request.similarity_threshold.is_nan() {
            return Err(RagError::InvalidInput(
                "similarity_threshold must be a number".into(),
            ));
        }

        let query_vector = self.embedder.embed_one(request.query.trim()).await?;
        let top_k = request
            .max_results
            .saturating_mul(OVER_FETCH_FACTOR)
            .min(OVER_FETCH_CAP)
            .max(request.max_results);

        let outcome = match self
            .store
            .query(&request.session_id, &query_vector, top_k)
            .await
        {
            Ok(outcome) => outcome,
            Err(RagError::SessionNotFound(_)) => {
                info!(session_id = %request.session_id, "no knowledge for this session");
                return Ok(RetrieveResponse {
                    query: request.query.clone(),
                    chunks: Vec::new(),
                    total_candidates_searched: 0,
                    session_found: false,
                });
            }
            Err(err) => return Err(err),
        };

        let chunks: Vec<RetrievedChunk> = outcome
            .hits
            .into_iter()
            .filter(|hit| hit.similarity >= request.similarity_threshold)
            .take(request.max_results)
            .map(|hit| RetrievedChunk {
                content: hit.chunk.text,
                score: hit.similarity,
                source_url: hit.chunk.source_url,
                chunk_index: hit.chunk.chunk_index,
            })
            .collect();

        info!(
            session_id = %request.session_id,
            returned = chunks.len(),
            candidates = outcome.candidates_searched,
            threshold = request.similarity_threshold,
            "retrieval complete"
        );

        Ok(RetrieveResponse {
            query: request.query.clone(),
            chunks,
            total_candidates_searched: outcome.candidates_searched,
            session_found: true,
        })
    }
}
