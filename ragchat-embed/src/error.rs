//! Error types for the embedding system

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
/// Used throughout the crate for operations that can fail.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Covers configuration problems, local model initialization, remote API
/// failures and runtime failures during embedding generation. Variants carry
/// their underlying cause through `#[source]` so callers can log the chain.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when the provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The provider answered with something other than one vector per input
    #[error("Malformed embedding response: {message}")]
    MalformedResponse { message: String },

    /// The remote embedding API rejected the request
    #[error("Embedding API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport errors talking to a remote embedding API
    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create a model initialization error. Accepts `anyhow::Error`, which
    /// is what fastembed returns when a model cannot be loaded.
    pub fn model_init<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelInitialization {
            source: source.into(),
        }
    }

    /// Create an embedding generation error from any error type.
    ///
    /// This is a convenience constructor for wrapping errors that occur during
    /// the actual embedding generation process.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a malformed response error with a custom message.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EmbedError::invalid_config("missing api key");
        assert_eq!(
            err.to_string(),
            "Invalid embedding configuration: missing api key"
        );

        let err = EmbedError::Api {
            status: 429,
            message: "quota exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Embedding API returned HTTP 429: quota exceeded"
        );

        let io = std::io::Error::other("boom");
        let err = EmbedError::embedding_gen(io);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_model_init_from_anyhow() {
        let err = EmbedError::model_init(anyhow::anyhow!("onnx file missing"));
        assert!(matches!(err, EmbedError::ModelInitialization { .. }));
        assert_eq!(
            err.to_string(),
            "Model initialization failed: onnx file missing"
        );
        assert!(std::error::Error::source(&err).is_some());

        let err = EmbedError::model_init(std::io::Error::other("cache dir not writable"));
        assert!(matches!(err, EmbedError::ModelInitialization { .. }));
    }
}
