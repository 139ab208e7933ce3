//! ragchat-retriever: in-memory semantic retrieval over a single document
//!
//! ## Key Modules
//!
//! - **[`index`]**: embeds every chunk once and keeps a read-only vector index
//! - **[`retriever`]**: embeds a query and returns the top-k chunks
//! - **[`error`]**: typed failures for building and querying
//!
//! ## Quick Start
//!
//! ```
//! use ragchat_context::split_text;
//! use ragchat_embed::{EmbeddingProvider, HashingProvider};
//! use ragchat_retriever::{Indexer, Retriever};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256));
//! let chunks = split_text("Cats purr.\n\nDogs bark.", 12, 0)?;
//!
//! let index = Indexer::new(Arc::clone(&provider)).build(chunks).await?;
//! let retriever = Retriever::new(Arc::new(index), provider);
//!
//! let top = retriever.retrieve("why do dogs bark", 1).await?;
//! assert_eq!(top[0].text, "Dogs bark.");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Document → Splitter → Indexer → VectorIndex
//!                                      ↓
//!                   query → Retriever → top-k chunks
//! ```

pub mod error;
pub mod index;
pub mod retriever;

pub use error::{IndexError, RetrieveError};
pub use index::{IndexStats, Indexer, IndexerConfig, ScoredChunk, VectorIndex, cosine_similarity};
pub use retriever::{DEFAULT_K, Retriever};
