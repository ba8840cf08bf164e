//! OpenAI embedding provider implementation.
//!
//! Talks to any OpenAI-compatible `/embeddings` endpoint. Inputs larger than
//! the configured batch size are split into several requests; results are
//! reassembled in input order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Default API root for OpenAI.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embedding provider.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    client: Client,

    /// Full URL of the embeddings endpoint
    endpoint: String,

    /// Model identifier (e.g., "text-embedding-3-small")
    model: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,

    /// Maximum inputs per request
    batch_size: usize,
}

impl OpenAIEmbedding {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (defaults to "text-embedding-3-small" if None)
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the key is blank or the HTTP
    /// client cannot be built
    pub fn new(api_key: String, model: Option<String>) -> EmbeddingResult<Self> {
        Self::with_options(
            api_key,
            model,
            DEFAULT_BASE_URL,
            Duration::from_secs(30),
            256,
        )
    }

    /// Create a provider against a custom endpoint with explicit limits.
    pub fn with_options(
        api_key: String,
        model: Option<String>,
        base_url: &str,
        timeout: Duration,
        batch_size: usize,
    ) -> EmbeddingResult<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::ConfigError("missing OpenAI API key".to_string()));
        }

        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());
        let embedding_dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EmbeddingError::ConfigError("invalid OpenAI API key".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            embedding_dimension,
            batch_size: batch_size.max(1),
        })
    }

    async fn request(&self, inputs: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::ApiError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    EmbeddingError::ConfigError(format!("OpenAI rejected credentials ({})", status))
                }
                _ => EmbeddingError::ApiError(format!("{}: {}", status, detail)),
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ApiError(format!("invalid embedding response: {}", e)))?;
        parsed.into_ordered(inputs.len())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            vectors.extend(self.request(chunk).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingResponse {
    /// Vectors sorted back into request order.
    fn into_ordered(mut self, expected: usize) -> EmbeddingResult<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        self.data.sort_by_key(|entry| entry.index);
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}
