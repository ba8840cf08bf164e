//! Embedding provider abstraction and the normalizing embedder.
//!
//! An [`EmbeddingProvider`] is the external model capability: given N texts it
//! produces N fixed-dimension vectors. [`Embedder`] wraps a provider and
//! guarantees the contract the ranking stage relies on: output order and
//! length match the input, every vector is L2-normalized, and blank inputs
//! never reach the model.
//!
//! Implementations:
//! - [`fastembed::FastEmbedProvider`]: local ONNX model (feature `fastembed`)
//! - [`openai::OpenAIEmbedding`]: OpenAI-compatible HTTP endpoint
//! - [`hashed::HashedEmbedding`]: deterministic hashed-term vectors, no model

#[cfg(feature = "fastembed")]
pub mod fastembed;
pub mod hashed;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::models::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input text (e.g., empty, too long)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key, unknown model)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The model returned a different number of vectors than texts submitted
    #[error("Model returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    /// The model returned a vector of unexpected dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors generate raw vector embeddings from text inputs. Vectors need
/// not be normalized; [`Embedder`] takes care of that.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }

    /// Generate embeddings for multiple texts in a single batch.
    ///
    /// # Returns
    /// A vector of embedding vectors, in the same order as the input texts
    ///
    /// # Errors
    /// Returns `EmbeddingError` if any embedding generation fails
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier for this provider.
    fn model_name(&self) -> &str;
}

/// Scale a vector to unit length.
///
/// Vectors with (near) zero magnitude carry no direction and are returned
/// unchanged.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

/// Normalizing front end over an [`EmbeddingProvider`].
///
/// A text that is empty or contains only whitespace counts as empty input:
/// it maps to the zero vector and is never sent to the model. Errors from the
/// provider surface unchanged and are not retried.
#[derive(Debug, Clone)]
pub struct Embedder<E> {
    provider: E,
}

impl<E: EmbeddingProvider> Embedder<E> {
    /// Wrap an embedding provider.
    pub fn new(provider: E) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &E {
        &self.provider
    }

    /// Model identity of the wrapped provider.
    pub fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: self.provider.model_name().to_string(),
            dimension: self.provider.dimension(),
        }
    }

    /// Embed `texts` into unit-length vectors, preserving order.
    pub async fn embed(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = self.provider.dimension();
        let (positions, inputs): (Vec<usize>, Vec<&str>) = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(idx, text)| (idx, *text))
            .unzip();

        let mut vectors = vec![vec![0.0f32; dimension]; texts.len()];
        if inputs.is_empty() {
            return Ok(vectors);
        }

        let raw = self.provider.embed_batch(&inputs).await?;
        if raw.len() != inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: inputs.len(),
                actual: raw.len(),
            });
        }

        for (idx, vector) in positions.into_iter().zip(raw) {
            if vector.len() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            vectors[idx] = l2_normalize(vector);
        }

        debug!(
            model = self.provider.model_name(),
            requested = texts.len(),
            embedded = inputs.len(),
            "embedded batch"
        );
        Ok(vectors)
    }

    /// Embed a single text into a unit-length vector.
    pub async fn embed_one(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }
}
