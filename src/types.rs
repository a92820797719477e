//! Core domain types and the crate-wide error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A raw document submitted for ingestion into one session.
///
/// Immutable once submitted; it exists only for the duration of a single
/// ingestion call. The crawler that produced `raw_text` is an external
/// collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    /// Where the text was scraped from.
    pub source_url: String,
    /// Optional page title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The scraped text to be chunked. Carried as `content` on the wire.
    #[serde(rename = "content")]
    pub raw_text: String,
}

impl Document {
    pub fn new(source_url: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title: None,
            raw_text: raw_text.into(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A bounded, token-sized passage of a source document.
///
/// The atomic unit of storage and retrieval. Never mutated after creation;
/// removed only when its session is deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique within the session's collection.
    pub chunk_id: String,
    /// Session the chunk belongs to.
    pub session_id: String,
    /// Originating document URL.
    pub source_url: String,
    /// Optional originating document title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Emission order within the source document.
    pub chunk_index: usize,
    /// Passage text.
    pub text: String,
    /// Token count under the deployment's tokenization scheme.
    pub token_count: usize,
}

/// Introspection metadata for one session's collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub chunk_count: usize,
}

/// Errors surfaced by the chunking, embedding, storage, and retrieval engine.
///
/// Chunking and tokenization never fail; they degrade locally (oversized
/// sentences are hard-split, empty input yields zero chunks). Everything that
/// can fail crosses an external boundary or a misconfiguration.
#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed request, rejected before any processing.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The embedding capability is unreachable or returned an error.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// The vector storage engine is unreachable.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// The session has no collection.
    #[error("no collection for session '{0}'")]
    SessionNotFound(String),

    /// A vector's length disagrees with the collection's established
    /// dimensionality. Fatal misconfiguration, never silently coerced.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A bounded deadline elapsed before an external call completed.
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    /// Invalid configuration detected at construction time.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// True when retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::ModelUnavailable(_)
                | RagError::StoreUnavailable(_)
                | RagError::Timeout { .. }
        )
    }
}
