//! Error types for text splitting

/// Result type for splitter construction.
pub type Result<T> = std::result::Result<T, ChunkError>;

/// Errors raised while configuring a [`crate::TextSplitter`].
///
/// Splitting itself never fails: an empty document simply yields no chunks.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// Chunk size or overlap outside the accepted range
    #[error("Invalid chunking configuration: {message}")]
    InvalidConfig { message: String },

    /// A delimiter pattern is not a valid regular expression
    #[error("Invalid delimiter pattern {pattern:?}: {source}")]
    InvalidDelimiter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ChunkError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
