//! Query processing and ranking module.
//!
//! The ranking engine embeds the query and every candidate section, consults
//! the embedding cache first so that only misses reach the model, scores each
//! candidate by cosine similarity and returns the top-k in descending order.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pmc_semantic_search::embedding::{hashed::HashedEmbedding, Embedder};
//! use pmc_semantic_search::models::DocumentSection;
//! use pmc_semantic_search::query::RankingEngine;
//! use pmc_semantic_search::storage::sqlite::SqliteEmbeddingCache;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let embedder = Embedder::new(HashedEmbedding::default());
//! let cache = SqliteEmbeddingCache::open_in_memory(embedder.config().model_name)?;
//! let engine = RankingEngine::new(embedder, Arc::new(cache));
//!
//! let candidates = vec![DocumentSection::new("PMC1", "Results", "Glycolysis increased.")];
//! for ranked in engine.rank("tumor metabolism", &candidates, 5).await? {
//!     println!("{} - Score: {:.3}", ranked.section.source_id, ranked.score);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::embedding::{Embedder, EmbeddingError, EmbeddingProvider};
use crate::models::{DocumentSection, RankedSection};
use crate::storage::EmbeddingCache;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Other unexpected errors
    #[error("Unexpected query error: {0}")]
    Other(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Compute cosine similarity between two unit vectors.
///
/// Both inputs are expected to be L2-normalized, so the similarity is their
/// dot product. Vectors of different lengths are compared over the shorter
/// prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Similarity ranking over candidate sections.
pub struct RankingEngine<E> {
    embedder: Embedder<E>,
    cache: Arc<dyn EmbeddingCache>,
}

impl<E: EmbeddingProvider> RankingEngine<E> {
    /// Create a ranking engine backed by `cache`.
    pub fn new(embedder: Embedder<E>, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self { embedder, cache }
    }

    /// Rank `candidates` against `query` and keep the best `top_k`.
    ///
    /// Equal scores keep their candidate order. An empty candidate list
    /// returns immediately without touching the embedder.
    ///
    /// # Errors
    /// Returns `QueryError::EmbeddingError` if the model fails; no partial
    /// ranking is produced.
    pub async fn rank(
        &self,
        query: &str,
        candidates: &[DocumentSection],
        top_k: usize,
    ) -> QueryResult<Vec<RankedSection>> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embed_cached(&[query])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::Other("query embedding missing".to_string()))?;

        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embed_cached(&texts).await?;

        let mut ranked: Vec<RankedSection> = candidates
            .iter()
            .zip(vectors.iter())
            .map(|(section, vector)| RankedSection {
                score: cosine_similarity(&query_vector, vector).clamp(-1.0, 1.0),
                section: section.clone(),
            })
            .collect();

        // sort_by is stable
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);

        debug!(
            candidates = candidates.len(),
            returned = ranked.len(),
            "ranked candidates"
        );
        Ok(ranked)
    }

    /// Embed `texts`, serving hits from the cache and batching only misses.
    ///
    /// Cache failures count as misses; failures to persist are logged.
    pub async fn embed_cached(&self, texts: &[&str]) -> QueryResult<Vec<Vec<f32>>> {
        let dimension = self.embedder.provider().dimension();
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<usize> = Vec::new();

        for (idx, text) in texts.iter().enumerate() {
            match self.cache.get(text) {
                Ok(Some(vector)) if vector.len() == dimension => vectors.push(Some(vector)),
                Ok(_) => {
                    vectors.push(None);
                    misses.push(idx);
                }
                Err(e) => {
                    warn!(error = %e, "embedding cache read failed; treating as miss");
                    vectors.push(None);
                    misses.push(idx);
                }
            }
        }

        // Identical texts in one batch share a single model call.
        let mut unique: Vec<&str> = Vec::new();
        let mut slot_of: HashMap<&str, usize> = HashMap::new();
        let miss_slots: Vec<usize> = misses
            .iter()
            .map(|&idx| {
                *slot_of.entry(texts[idx]).or_insert_with(|| {
                    unique.push(texts[idx]);
                    unique.len() - 1
                })
            })
            .collect();

        if !unique.is_empty() {
            let fresh = self.embedder.embed(&unique).await?;

            for (text, vector) in unique.iter().zip(&fresh) {
                if let Err(e) = self.cache.put(text, vector) {
                    warn!(error = %e, "failed to persist embedding");
                }
            }
            for (&idx, &slot) in misses.iter().zip(&miss_slots) {
                vectors[idx] = fresh.get(slot).cloned();
            }
        }

        debug!(
            total = texts.len(),
            hits = texts.len() - misses.len(),
            misses = misses.len(),
            embedded = unique.len(),
            "cache-checked embedding"
        );

        vectors
            .into_iter()
            .map(|v| v.ok_or_else(|| QueryError::Other("embedding missing after batch".to_string())))
            .collect()
    }
}
