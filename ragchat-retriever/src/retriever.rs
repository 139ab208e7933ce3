//! Query-time retrieval over a built [`VectorIndex`]

use crate::error::RetrieveError;
use crate::index::{ScoredChunk, VectorIndex};
use ragchat_context::TextChunk;
use ragchat_embed::EmbeddingProvider;
use std::sync::Arc;
use tracing::debug;

/// Number of chunks returned when the caller does not ask for a specific count
pub const DEFAULT_K: usize = 4;

/// Embeds queries and looks them up in a shared index.
///
/// The provider must be the same one the index was built with, otherwise
/// query and chunk vectors live in different spaces.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    default_k: usize,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("chunks", &self.index.len())
            .field("provider", &self.provider.provider_name())
            .field("default_k", &self.default_k)
            .finish()
    }
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            provider,
            default_k: DEFAULT_K,
        }
    }

    pub fn with_default_k(mut self, default_k: usize) -> Self {
        self.default_k = default_k;
        self
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Return up to `k` chunks, most relevant first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<TextChunk>, RetrieveError> {
        let scored = self.retrieve_scored(query, k).await?;
        Ok(scored.into_iter().map(|s| s.chunk).collect())
    }

    /// Like [`Retriever::retrieve`] but keeps the similarity scores.
    ///
    /// # Errors
    ///
    /// [`RetrieveError::InvalidK`] when `k` is 0, and
    /// [`RetrieveError::Embedding`] when the query cannot be embedded.
    pub async fn retrieve_scored(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrieveError> {
        if k == 0 {
            return Err(RetrieveError::InvalidK);
        }
        if self.index.is_empty() {
            debug!("Index is empty, skipping query embedding");
            return Ok(Vec::new());
        }

        let vector = self.provider.embed_text(query).await?;
        let results = self.index.query(&vector, k);

        debug!(
            "Retrieved {} of {} chunks (k={}), top score {:?}",
            results.len(),
            self.index.len(),
            k,
            results.first().map(|r| r.score)
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Indexer;
    use ragchat_embed::HashingProvider;

    async fn fixture() -> Retriever {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256));
        let chunks = vec![
            TextChunk {
                sequence: 0,
                source_offset: 0,
                text: "The capital of France is Paris.".to_string(),
            },
            TextChunk {
                sequence: 1,
                source_offset: 32,
                text: "Photosynthesis turns sunlight into sugar.".to_string(),
            },
            TextChunk {
                sequence: 2,
                source_offset: 74,
                text: "Rust programs are compiled by rustc.".to_string(),
            },
        ];
        let index = Indexer::new(Arc::clone(&provider)).build(chunks).await.unwrap();
        Retriever::new(Arc::new(index), provider)
    }

    #[tokio::test]
    async fn test_retrieve_most_relevant_first() {
        let retriever = fixture().await;
        let chunks = retriever.retrieve("what is the capital of france", 1).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence, 0);
    }

    #[tokio::test]
    async fn test_k_zero_is_rejected() {
        let retriever = fixture().await;
        assert!(matches!(
            retriever.retrieve("anything", 0).await,
            Err(RetrieveError::InvalidK)
        ));
    }

    #[tokio::test]
    async fn test_default_k() {
        let retriever = fixture().await.with_default_k(2);
        assert_eq!(retriever.default_k(), 2);
        let chunks = retriever
            .retrieve("rust", retriever.default_k())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
    }
}
