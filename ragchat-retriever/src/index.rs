//! In-memory vector index over corpus chunks.
//!
//! The index is built once at startup by [`Indexer::build`], which embeds every
//! chunk through the configured [`EmbeddingProvider`] and keeps the resulting
//! `(chunk, vector)` pairs in chunk order. After the build the index is
//! read-only and is shared between turns behind an `Arc`.
//!
//! ## Ranking
//!
//! [`VectorIndex::query`] scores every entry by cosine similarity and sorts
//! descending. Equal scores are ordered by chunk sequence, and NaN scores sink
//! to the bottom, so the same query always yields the same order.

use crate::error::IndexError;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use half::f16;
use ragchat_context::TextChunk;
use ragchat_embed::EmbeddingProvider;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Tuning for index builds
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Number of chunks sent to the provider per call
    pub batch_size: usize,
    /// Maximum number of provider calls in flight
    pub max_concurrency: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            max_concurrency: 4,
        }
    }
}

impl IndexerConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

/// Summary of a built index
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub chunk_count: usize,
    pub dimension: usize,
    pub provider: String,
    pub model: String,
    /// blake3 hash (hex) over the indexed chunk texts
    pub corpus_hash: String,
    pub built_at: DateTime<Utc>,
    pub build_millis: u128,
}

/// A chunk together with its similarity to a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: TextChunk,
    embedding: Vec<f16>,
}

/// Read-only nearest-neighbour index of chunk embeddings
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    stats: IndexStats,
}

impl VectorIndex {
    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector length shared by every entry
    pub fn dimension(&self) -> usize {
        self.stats.dimension
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Indexed chunks in corpus order
    pub fn chunks(&self) -> impl Iterator<Item = &TextChunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Stored embedding of the chunk at `position`
    pub fn embedding(&self, position: usize) -> Option<&[f16]> {
        self.entries.get(position).map(|e| e.embedding.as_slice())
    }

    /// Return the `k` entries most similar to `vector`, best first.
    ///
    /// `k` is clamped to the number of entries. Ties are broken by ascending
    /// chunk sequence.
    pub fn query(&self, vector: &[f16], k: usize) -> Vec<ScoredChunk> {
        let k = k.min(self.entries.len());
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let score = cosine_similarity(vector, &entry.embedding);
                (position, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        scored.sort_by(|a, b| rank(a, b, &self.entries));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(position, score)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect()
    }
}

fn rank(a: &(usize, f32), b: &(usize, f32), entries: &[IndexEntry]) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| entries[a.0].chunk.sequence.cmp(&entries[b.0].chunk.sequence))
}

/// Cosine similarity computed in f32. Vectors of different length, or with a
/// zero norm, score 0.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Embeds chunks and builds a [`VectorIndex`]
pub struct Indexer {
    provider: Arc<dyn EmbeddingProvider>,
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            config: IndexerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    /// Embed every chunk once and build the index.
    ///
    /// # Errors
    ///
    /// Fails with [`IndexError::Embedding`] if the provider fails for any
    /// batch, and with [`IndexError::InconsistentEmbeddings`] if it returns the
    /// wrong number of vectors or vectors of differing length.
    pub async fn build(&self, chunks: Vec<TextChunk>) -> Result<VectorIndex, IndexError> {
        let started = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);
        info!(
            "Building index over {} chunks ({} batches) with {}",
            chunks.len(),
            total_batches,
            self.provider.provider_name()
        );

        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();

        // `buffered` keeps batch order while running several provider calls at once
        let embedded: Vec<Vec<Vec<f16>>> = stream::iter(batches.into_iter().enumerate())
            .map(|(batch_idx, texts)| {
                let provider = Arc::clone(&self.provider);
                async move {
                    let result = provider.embed_texts(&texts).await?;
                    if result.len() != texts.len() {
                        return Err(IndexError::inconsistent(format!(
                            "batch {batch_idx}: expected {} vectors, got {}",
                            texts.len(),
                            result.len()
                        )));
                    }
                    debug!("Embedded batch {}/{}", batch_idx + 1, total_batches);
                    Ok::<_, IndexError>(result.embeddings)
                }
            })
            .buffered(self.config.max_concurrency.max(1))
            .try_collect()
            .await?;

        let embeddings: Vec<Vec<f16>> = embedded.into_iter().flatten().collect();
        let dimension = match embeddings.first() {
            Some(first) => first.len(),
            None => self.provider.embedding_dimension(),
        };

        let mut hasher = blake3::Hasher::new();
        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            if embedding.len() != dimension || dimension == 0 {
                return Err(IndexError::inconsistent(format!(
                    "chunk {} has dimension {}, expected {}",
                    chunk.sequence,
                    embedding.len(),
                    dimension
                )));
            }
            hasher.update(chunk.text.as_bytes());
            hasher.update(&[0]);
            entries.push(IndexEntry { chunk, embedding });
        }

        let stats = IndexStats {
            chunk_count: entries.len(),
            dimension,
            provider: self.provider.provider_name().to_string(),
            model: self.provider.model_name().to_string(),
            corpus_hash: hex::encode(hasher.finalize().as_bytes()),
            built_at: Utc::now(),
            build_millis: started.elapsed().as_millis(),
        };
        info!(
            "Index built: {} chunks, dimension {}, {} ms",
            stats.chunk_count, stats.dimension, stats.build_millis
        );

        Ok(VectorIndex { entries, stats })
    }
}
