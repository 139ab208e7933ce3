//! # ragchat-embed
//!
//! Text embedding providers behind one async trait. The same provider instance
//! embeds corpus chunks at index time and user queries at turn time, so both
//! live in the same vector space.
//!
//! ## Providers
//!
//! - [`GeminiEmbeddingProvider`]: Google Generative Language API (`batchEmbedContents`)
//! - [`FastEmbedProvider`]: local ONNX models via fastembed, no network after download
//! - [`HashingProvider`]: deterministic FNV feature hashing, for offline use and tests
//!
//! ## Quick Start
//!
//! ```
//! use ragchat_embed::{EmbedConfig, create_provider};
//!
//! # async fn example() -> ragchat_embed::Result<()> {
//! let provider = create_provider(&EmbedConfig::hashing(128)).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! assert_eq!(result.len(), 2);
//! assert_eq!(result.dimension, 128);
//! # Ok(())
//! # }
//! ```
//!
//! ## Memory Usage
//!
//! Embeddings are stored as half-precision (f16) values and L2-normalized by
//! default, which halves index memory while keeping cosine similarity accurate.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.

pub mod config;
pub mod error;
pub mod gemini;
pub mod hashing;
pub mod provider;

// Re-export main types for easy access
pub use config::{
    DEFAULT_FASTEMBED_MODEL, DEFAULT_GEMINI_EMBEDDING_MODEL, DEFAULT_HASHING_DIMENSION, EmbedConfig,
    ProviderKind,
};
pub use error::{EmbedError, Result};
pub use gemini::GeminiEmbeddingProvider;
pub use hashing::HashingProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, create_provider};
