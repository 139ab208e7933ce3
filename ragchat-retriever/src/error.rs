//! Error types for index building and retrieval

use ragchat_embed::EmbedError;

/// Failure while building a [`crate::VectorIndex`].
///
/// Any failure aborts the whole build; a partially embedded corpus is never
/// returned.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The embedding provider failed for at least one chunk
    #[error("Failed to embed corpus chunks: {source}")]
    Embedding {
        #[source]
        source: EmbedError,
    },

    /// The provider returned vectors that do not line up with the chunks
    #[error("Inconsistent embeddings: {message}")]
    InconsistentEmbeddings { message: String },
}

impl IndexError {
    pub(crate) fn inconsistent<S: Into<String>>(message: S) -> Self {
        Self::InconsistentEmbeddings {
            message: message.into(),
        }
    }
}

impl From<EmbedError> for IndexError {
    fn from(source: EmbedError) -> Self {
        Self::Embedding { source }
    }
}

/// Failure while answering a retrieval query.
#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    /// `k` must be at least 1
    #[error("Retrieval k must be greater than 0")]
    InvalidK,

    /// The query could not be embedded
    #[error("Failed to embed query: {source}")]
    Embedding {
        #[source]
        source: EmbedError,
    },
}

impl From<EmbedError> for RetrieveError {
    fn from(source: EmbedError) -> Self {
        Self::Embedding { source }
    }
}
