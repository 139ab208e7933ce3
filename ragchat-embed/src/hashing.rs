//! Deterministic feature-hashing embeddings.
//!
//! Each lowercase alphanumeric token (and each pair of adjacent tokens) is hashed
//! with FNV-1a into one of `dimension` buckets; a second hash bit chooses the sign.
//! The result is L2-normalized. No model is needed, so this provider works
//! offline and produces identical vectors on every run, which makes it the
//! provider of choice for tests.

use crate::config::{DEFAULT_HASHING_DIMENSION, EmbedConfig};
use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingResult, to_f16};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

/// Bag-of-words embedding provider based on FNV feature hashing
#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
    normalize: bool,
    model_name: String,
}

impl HashingProvider {
    /// Create a provider producing vectors of `dimension` entries.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            normalize: true,
            model_name: "fnv-feature-hashing".to_string(),
        }
    }

    pub fn from_config(config: &EmbedConfig) -> Self {
        Self {
            dimension: config.dimension.unwrap_or(DEFAULT_HASHING_DIMENSION).max(1),
            normalize: config.normalize,
            model_name: config.model_name.clone(),
        }
    }

    /// Embed one text synchronously.
    pub fn embed_sync(&self, text: &str) -> Vec<f16> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        for token in &tokens {
            self.add_feature(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, bigram.as_bytes(), 0.5);
        }

        to_f16(vector, self.normalize)
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let mut hasher = FnvHasher::default();
        hasher.write(feature);
        let hash = hasher.finish();

        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| self.embed_sync(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f16], b: &[f16]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let provider = HashingProvider::new(128);
        let a = provider.embed_sync("The quick brown fox");
        let b = provider.embed_sync("the QUICK brown fox!");

        assert_eq!(a.len(), 128);
        assert_eq!(a, b, "tokenization ignores case and punctuation");
        assert!((dot(&a, &a) - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_related_texts_score_higher() {
        let provider = HashingProvider::new(256);
        let query = provider.embed_sync("rust borrow checker");
        let related = provider.embed_sync("the rust borrow checker enforces ownership");
        let unrelated = provider.embed_sync("baking sourdough bread at home");

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashingProvider::new(16);
        let v = provider.embed_sync("   ...   ");
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| x.to_f32() == 0.0));
    }

    #[test]
    fn test_batch_matches_single() {
        let provider = HashingProvider::default();
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];
        let result = tokio_test::block_on(provider.embed_texts(&texts)).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, DEFAULT_HASHING_DIMENSION);
        assert_eq!(result.embeddings[1], provider.embed_sync("gamma"));
    }
}
