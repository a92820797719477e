//! Engine configuration, fixed at process start.
//!
//! Values are resolved from the environment (with `.env` support via
//! `dotenvy`) and validated up front: a config that passes construction never
//! causes a bounds violation later in the pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RagError;

/// Token bounds for the chunking engine.
///
/// Invariants enforced by [`ChunkingConfig::validate`]:
/// `min_tokens < target_tokens < max_tokens` and
/// `overlap_tokens < min_tokens`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Preferred chunk size; a chunk closes once it reaches this.
    pub target_tokens: usize,
    /// Chunks below this are merged into their predecessor.
    pub min_tokens: usize,
    /// Hard ceiling for non-terminal chunks.
    pub max_tokens: usize,
    /// Approximate token overlap carried across chunk boundaries.
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 512,
            min_tokens: 100,
            max_tokens: 800,
            overlap_tokens: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.min_tokens == 0 {
            return Err(RagError::Config("min_tokens must be positive".into()));
        }
        if !(self.min_tokens < self.target_tokens && self.target_tokens < self.max_tokens) {
            return Err(RagError::Config(format!(
                "token bounds must satisfy min < target < max (got {} / {} / {})",
                self.min_tokens, self.target_tokens, self.max_tokens
            )));
        }
        if self.overlap_tokens >= self.min_tokens {
            return Err(RagError::Config(format!(
                "overlap_tokens ({}) must be below min_tokens ({})",
                self.overlap_tokens, self.min_tokens
            )));
        }
        Ok(())
    }
}

/// Full engine configuration surface.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub chunking: ChunkingConfig,
    /// Identifier passed to the embedding capability.
    pub embedding_model: String,
    /// Maximum age a session may reach before a sweep removes it.
    pub retention_window: Duration,
    /// Endpoint of the external vector storage engine, when one is used.
    pub storage_endpoint: Option<String>,
    /// Largest batch forwarded to the embedding capability in one call.
    pub embed_batch_cap: usize,
    /// Deadline for a single embedding request.
    pub embed_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            retention_window: Duration::from_secs(24 * 60 * 60),
            storage_endpoint: None,
            embed_batch_cap: 64,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Resolves configuration from environment variables, falling back to
    /// defaults for anything unset. Loads `.env` if present.
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let chunking = ChunkingConfig {
            target_tokens: env_usize("CHUNK_TARGET_TOKENS", defaults.chunking.target_tokens)?,
            min_tokens: env_usize("CHUNK_MIN_TOKENS", defaults.chunking.min_tokens)?,
            max_tokens: env_usize("CHUNK_MAX_TOKENS", defaults.chunking.max_tokens)?,
            overlap_tokens: env_usize("CHUNK_OVERLAP_TOKENS", defaults.chunking.overlap_tokens)?,
        };

        let config = Self {
            chunking,
            embedding_model: std::env::var("EMBEDDING_MODEL_NAME")
                .unwrap_or(defaults.embedding_model),
            retention_window: Duration::from_secs(env_u64(
                "SESSION_RETENTION_SECS",
                defaults.retention_window.as_secs(),
            )?),
            storage_endpoint: std::env::var("STORAGE_ENDPOINT").ok(),
            embed_batch_cap: env_usize("EMBED_BATCH_CAP", defaults.embed_batch_cap)?,
            embed_timeout: Duration::from_secs(env_u64(
                "EMBED_TIMEOUT_SECS",
                defaults.embed_timeout.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.validate()?;
        if self.embedding_model.trim().is_empty() {
            return Err(RagError::Config("embedding model name is empty".into()));
        }
        if self.embed_batch_cap == 0 {
            return Err(RagError::Config("embed_batch_cap must be positive".into()));
        }
        if self.retention_window.is_zero() {
            return Err(RagError::Config("retention window must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[must_use]
    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize, RagError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| RagError::Config(format!("{key}='{raw}' is not a valid integer"))),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, RagError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| RagError::Config(format!("{key}='{raw}' is not a valid integer"))),
        Err(_) => Ok(default),
    }
}
