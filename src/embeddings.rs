//! Embedding generation against an external model capability.
//!
//! The model is a capability, not a hierarchy: a single-method
//! [`EmbeddingProvider`] trait so local and remote providers are swappable
//! implementations. The [`Embedder`] wrapper adds sub-batching so callers can
//! hand over arbitrarily large batches while the provider only ever sees
//! requests up to the configured cap.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::RagError;

/// External `text -> fixed-length float vector` capability.
///
/// Implementations must return exactly one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts. The batch is guaranteed to be within the
    /// configured cap when called through [`Embedder`].
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Identifier reported in telemetry and health checks.
    fn id(&self) -> &str;

    /// Liveness probe for the health boundary.
    async fn ping(&self) -> Result<(), RagError> {
        self.embed_batch(&["ping".to_string()]).await.map(|_| ())
    }
}

/// Batch-size-aware front to an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_cap: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_cap: usize) -> Self {
        Self {
            provider,
            batch_cap: batch_cap.max(1),
        }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    /// Embeds `texts`, sub-batching above the cap. All-or-nothing: any
    /// failing sub-batch fails the whole call and nothing is returned.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = Vec::with_capacity(texts.len());
        for sub in texts.chunks(self.batch_cap) {
            let batch = self.provider.embed_batch(sub).await?;
            if batch.len() != sub.len() {
                return Err(RagError::ModelUnavailable(format!(
                    "provider '{}' returned {} vectors for {} inputs",
                    self.provider.id(),
                    batch.len(),
                    sub.len()
                )));
            }
            vectors.extend(batch);
        }
        Ok(vectors)
    }

    /// Equivalent to a batch of one.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let input = [text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors.pop().ok_or_else(|| {
            RagError::ModelUnavailable(format!(
                "provider '{}' returned no vector",
                self.provider.id()
            ))
        })
    }

    pub async fn ping(&self) -> Result<(), RagError> {
        self.provider.ping().await
    }
}

/// Reqwest-based provider for OpenAI-compatible `/embeddings` endpoints.
///
/// No internal retries: failures surface with enough detail for the caller
/// to decide on a retry policy.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl HttpEmbeddingProvider {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RagError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(RagError::Config("embedding model name is empty".into()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .map_err(|_| RagError::Config("embedding API key is not a valid header".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| RagError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            timeout,
        })
    }

    /// Builds a provider from engine configuration plus the endpoint details
    /// only the deployment knows.
    pub fn from_config(
        config: &EngineConfig,
        base_url: &str,
        api_key: Option<&str>,
    ) -> Result<Self, RagError> {
        Self::new(
            base_url,
            config.embedding_model.clone(),
            api_key,
            config.embed_timeout,
        )
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RagError::Timeout {
                        what: "embedding request",
                        after: self.timeout,
                    }
                } else {
                    RagError::ModelUnavailable(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::ModelUnavailable(format!(
                "embedding request failed ({status}): {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| RagError::ModelUnavailable(format!("malformed response: {err}")))?;
        parsed.data.sort_by_key(|row| row.index);
        if parsed.data.len() != texts.len() {
            return Err(RagError::ModelUnavailable(format!(
                "endpoint returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }

    fn id(&self) -> &str {
        &self.model
    }
}

/// Deterministic provider for tests and offline development.
///
/// Vectors are derived from a hash of the text, unit-normalized, and stable
/// across calls: identical text always maps to the identical vector.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::with_dimensions(16)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|component| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                component.hash(&mut hasher);
                let raw = hasher.finish();
                (raw as f64 / u64::MAX as f64) as f32 * 2.0 - 1.0
            })
            .collect();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    fn id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let inputs = vec![
            "hello world".to_string(),
            "goodbye world".to_string(),
            "hello world".to_string(),
        ];
        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
        assert_eq!(first[0].len(), 16);
    }

    #[tokio::test]
    async fn mock_vectors_are_unit_length() {
        let provider = MockEmbeddingProvider::with_dimensions(8);
        let vectors = provider
            .embed_batch(&["some passage".to_string()])
            .await
            .unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn embedder_sub_batches_large_requests() {
        struct CountingProvider {
            max_seen: std::sync::Mutex<usize>,
        }

        #[async_trait]
        impl EmbeddingProvider for CountingProvider {
            async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
                let mut max = self.max_seen.lock().unwrap();
                *max = (*max).max(texts.len());
                Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
            }
            fn id(&self) -> &str {
                "counting"
            }
        }

        let provider = Arc::new(CountingProvider {
            max_seen: std::sync::Mutex::new(0),
        });
        let embedder = Embedder::new(provider.clone(), 4);
        let texts: Vec<String> = (0..11).map(|i| format!("text {i}")).collect();
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 11);
        assert!(*provider.max_seen.lock().unwrap() <= 4);
    }

    #[tokio::test]
    async fn http_provider_round_trips_batches_in_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [
                        {"embedding": [0.0, 1.0], "index": 1},
                        {"embedding": [1.0, 0.0], "index": 0},
                    ]
                }));
            })
            .await;

        let provider = HttpEmbeddingProvider::new(
            &server.base_url(),
            "test-model",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let vectors = provider
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        mock.assert_async().await;
        // Rows come back sorted by index regardless of wire order.
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn http_provider_maps_server_errors_to_model_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(503).body("overloaded");
            })
            .await;

        let provider = HttpEmbeddingProvider::new(
            &server.base_url(),
            "test-model",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = provider
            .embed_batch(&["text".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ModelUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn http_provider_rejects_count_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [{"embedding": [0.5, 0.5], "index": 0}]
                }));
            })
            .await;

        let provider = HttpEmbeddingProvider::new(
            &server.base_url(),
            "test-model",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = provider
            .embed_batch(&["one".to_string(), "two".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ModelUnavailable(_)));
    }
}
