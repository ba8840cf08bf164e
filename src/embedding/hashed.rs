//! Hashed-term embedding provider.
//!
//! Builds fixed-dimension vectors by hashing lowercase terms into buckets and
//! weighting them by term frequency. Deterministic and model-free, so it works
//! offline and keeps tests independent of downloaded weights.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{EmbeddingProvider, EmbeddingResult};

/// Deterministic term-hashing embedding provider.
#[derive(Debug, Clone)]
pub struct HashedEmbedding {
    dimension: usize,
    model_name: String,
}

impl HashedEmbedding {
    /// Create a provider producing vectors of `dimension` buckets.
    ///
    /// A dimension of zero is bumped to one.
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_name: format!("hashed-terms-{dimension}"),
        }
    }

    /// FNV-1a bucket index for a term.
    fn bucket(term: &str, dimension: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dimension as u64) as usize
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2)
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = Self::tokenize(text);
        if tokens.is_empty() {
            // No multi-character terms: hash the whole text so it still gets a direction.
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return vector;
            }
            tokens.push(trimmed.to_lowercase());
        }

        // Ordered so bucket sums are bit-identical across runs.
        let mut counts: BTreeMap<&str, f32> = BTreeMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in counts {
            // Longer terms are rarer; a cheap stand-in for document frequency.
            let weight = 1.0 + (term.chars().count() as f32).ln();
            vector[Self::bucket(term, self.dimension)] += (count / total) * weight;
        }
        vector
    }
}

impl Default for HashedEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbedding {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_dimension_and_name() {
        let provider = HashedEmbedding::new(128);
        assert_eq!(provider.dimension(), 128);
        assert_eq!(provider.model_name(), "hashed-terms-128");
        let v = provider.embed("tumor metabolism").await.unwrap();
        assert_eq!(v.len(), 128);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = HashedEmbedding::new(64);
        let a = provider.embed("mitochondrial respiration").await.unwrap();
        let b = provider.embed("mitochondrial respiration").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_short_and_symbol_texts_are_unit_norm() {
        let embedder = Embedder::new(HashedEmbedding::default());
        for text in ["X", "a", "5", "β", "!!", "a . ! ?"] {
            let v = embedder.embed_one(text).await.unwrap();
            let norm = dot(&v, &v).sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "{:?} has norm {}", text, norm);
        }
    }

    #[tokio::test]
    async fn test_empty_text_is_zero() {
        let provider = HashedEmbedding::new(32);
        let v = provider.embed("   ").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_colliding_terms_are_bit_stable() {
        // Four buckets force several terms to share one.
        let provider = HashedEmbedding::new(4);
        let text = "glycolysis lactate hypoxia glutamine serine mitochondria pyruvate";
        let first = provider.embed(text).await.unwrap();
        for _ in 0..20 {
            let again = HashedEmbedding::new(4).embed(text).await.unwrap();
            assert_eq!(
                first.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                again.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );
        }
    }

    #[tokio::test]
    async fn test_related_texts_score_higher() {
        let embedder = Embedder::new(HashedEmbedding::new(256));
        let vectors = embedder
            .embed(&[
                "tumor glucose metabolism",
                "glucose metabolism in tumor cells",
                "bird migration patterns",
            ])
            .await
            .unwrap();

        assert!(dot(&vectors[0], &vectors[1]) > dot(&vectors[0], &vectors[2]));
    }
}
