//! # ragchat
//!
//! A conversational question-answering loop over one text document. The
//! document is split into overlapping chunks and embedded once at startup.
//! Every user turn retrieves the most relevant chunks, asks a chat model to
//! answer from them together with the session's history, and records the
//! exchange.
//!
//! ## Architecture
//!
//! The application combines the workspace crates:
//! - [`ragchat_context`] splits the document into chunks
//! - [`ragchat_embed`] turns chunks and queries into vectors
//! - [`ragchat_retriever`] holds the index and answers top-k queries
//!
//! and adds, in this crate:
//! - [`session`]: per-session history with per-session locking
//! - [`turn`]: the retrieve, generate, commit sequence for one turn
//! - [`generate`]: chat model backends
//! - [`repl`]: the `You:`/`Bot:` loop used by the binary
//!
//! ## Quick Start
//!
//! ```
//! use ragchat::config::{ChatProviderKind, RagConfig};
//! use ragchat::generate::create_chat_model;
//! use ragchat::session::SessionStore;
//! use ragchat::turn::{TurnController, TurnRequest};
//! use ragchat_embed::ProviderKind;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut config = RagConfig::default();
//! config.embedding.provider = ProviderKind::Hashing;
//! config.generation.provider = ChatProviderKind::Echo;
//!
//! let retriever = ragchat::build_retriever(&config, "X is 1.\n\nY is 2.").await?;
//! let model = create_chat_model(&config.generation, None)?;
//! let controller = TurnController::new(retriever, model, Arc::new(SessionStore::new()));
//!
//! let result = controller.run_turn(TurnRequest::new("chat-1", "What is X?")).await?;
//! println!("{}", result.response);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod generate;
pub mod prompt;
pub mod repl;
pub mod session;
pub mod turn;

pub use config::RagConfig;
pub use error::{ConfigError, GenerationError, RetrievalFailure, TurnError};
pub use turn::{TurnConfig, TurnController, TurnPhase, TurnRequest, TurnResult};

use ragchat_context::TextSplitter;
use ragchat_embed::create_provider;
use ragchat_retriever::{Indexer, Retriever};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Read the source document as UTF-8 text.
pub async fn load_document(path: impl AsRef<Path>) -> Result<String, ConfigError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::io(path, e))?;
    info!("Loaded {} ({} bytes)", path.display(), text.len());
    Ok(text)
}

/// Chunk and embed `document`, returning a retriever over the result.
///
/// An empty document yields an empty index; turns then run with no context.
pub async fn build_retriever(config: &RagConfig, document: &str) -> anyhow::Result<Retriever> {
    let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    let chunks = splitter.split(document);
    if chunks.is_empty() {
        warn!("Document has no text; answers will have no context");
    }

    let provider = create_provider(&config.embed_config()).await?;
    let index = Indexer::new(Arc::clone(&provider))
        .with_config(config.indexer_config())
        .build(chunks)
        .await?;

    Ok(Retriever::new(Arc::new(index), provider).with_default_k(config.retrieval_k))
}

impl From<&RagConfig> for TurnConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            retrieval_k: config.retrieval_k,
            turn_timeout: config.turn_timeout(),
            ..TurnConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "héllo wörld").unwrap();
        assert_eq!(load_document(file.path()).await.unwrap(), "héllo wörld");

        assert!(matches!(
            load_document("/no/such/someText.txt").await,
            Err(ConfigError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xfe, 0x00]).unwrap();
        assert!(load_document(file.path()).await.is_err());
    }
}
