//! Error types for configuration, generation and conversation turns

use ragchat_retriever::RetrieveError;
use std::path::PathBuf;

/// Problems with startup configuration or input files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("{what} requires an API key (set GEMINI_API_KEY or GOOGLE_API_KEY)")]
    MissingApiKey { what: &'static str },
}

impl ConfigError {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of the chat model call
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The model answered without any text
    #[error("Chat model returned no text{}", .reason.as_deref().map(|r| format!(" (finish reason: {r})")).unwrap_or_default())]
    EmptyResponse { reason: Option<String> },

    #[error("Chat model is misconfigured: {message}")]
    InvalidConfig { message: String },

    #[error("Generation deadline exceeded")]
    TimedOut,

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Why the retrieval phase of a turn did not produce context
#[derive(Debug, thiserror::Error)]
pub enum RetrievalFailure {
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    #[error("Retrieval deadline exceeded")]
    TimedOut,

    #[error("Retrieval cancelled")]
    Cancelled,
}

/// Failure of a single conversation turn. Session history is never modified
/// when a turn fails.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The query could not be embedded or looked up
    #[error("Failed to retrieve context: {source}")]
    Embedding {
        #[source]
        source: RetrievalFailure,
    },

    /// The chat model did not produce a reply
    #[error("Failed to generate a reply: {source}")]
    Generation {
        #[source]
        source: GenerationError,
    },
}

impl TurnError {
    /// True when the turn ran out of time in either phase.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TurnError::Embedding {
                source: RetrievalFailure::TimedOut
            } | TurnError::Generation {
                source: GenerationError::TimedOut
            }
        )
    }

    /// True when the turn was cancelled by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TurnError::Embedding {
                source: RetrievalFailure::Cancelled
            } | TurnError::Generation {
                source: GenerationError::Cancelled
            }
        )
    }
}

impl From<RetrievalFailure> for TurnError {
    fn from(source: RetrievalFailure) -> Self {
        Self::Embedding { source }
    }
}

impl From<GenerationError> for TurnError {
    fn from(source: GenerationError) -> Self {
        Self::Generation { source }
    }
}
