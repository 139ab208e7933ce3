//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default Gemini embedding model.
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "models/gemini-embedding-001";

/// Default local ONNX model served through fastembed.
pub const DEFAULT_FASTEMBED_MODEL: &str = "all-minilm-l6-v2";

/// Default vector length of the hashing provider.
pub const DEFAULT_HASHING_DIMENSION: usize = 256;

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Generative Language API
    Gemini,
    /// Local ONNX models through fastembed
    FastEmbed,
    /// Deterministic feature hashing, no model required
    Hashing,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::FastEmbed => "fastembed",
            ProviderKind::Hashing => "hashing",
        };
        f.write_str(name)
    }
}

impl FromStr for ProviderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "fastembed" | "local" => Ok(ProviderKind::FastEmbed),
            "hashing" | "hash" => Ok(ProviderKind::Hashing),
            _ => Err(EmbedError::invalid_config(format!(
                "Unknown embedding provider: {s}"
            ))),
        }
    }
}

/// Configuration for an embedding provider
#[derive(Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Backend used to produce embeddings
    pub provider: ProviderKind,
    /// Model identifier understood by the backend
    pub model_name: String,
    /// Maximum number of texts sent to the backend at once
    #[builder(default = "16")]
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    #[builder(default = "true")]
    pub normalize: bool,
    /// Requested vector length (hashing size, or Gemini output dimensionality)
    #[builder(default)]
    pub dimension: Option<usize>,
    /// Directory where fastembed caches downloaded models
    #[builder(default)]
    pub cache_dir: Option<PathBuf>,
    /// Override for the remote API base URL
    #[builder(default)]
    pub base_url: Option<String>,
    /// API key for remote providers
    #[builder(default)]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl fmt::Debug for EmbedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbedConfig")
            .field("provider", &self.provider)
            .field("model_name", &self.model_name)
            .field("batch_size", &self.batch_size)
            .field("normalize", &self.normalize)
            .field("dimension", &self.dimension)
            .field("cache_dir", &self.cache_dir)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Create a configuration for `provider` and `model_name` with default settings
    pub fn new(provider: ProviderKind, model_name: impl Into<String>) -> Self {
        Self {
            provider,
            model_name: model_name.into(),
            batch_size: 16,
            normalize: true,
            dimension: None,
            cache_dir: None,
            base_url: None,
            api_key: None,
        }
    }

    /// Create a Gemini configuration
    pub fn gemini(model_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::Gemini, model_name).with_api_key(api_key)
    }

    /// Create a fastembed configuration for a built-in model
    pub fn fastembed(model_name: impl Into<String>) -> Self {
        Self::new(ProviderKind::FastEmbed, model_name)
    }

    /// Create a hashing configuration producing vectors of `dimension` entries
    pub fn hashing(dimension: usize) -> Self {
        Self::new(ProviderKind::Hashing, "fnv-feature-hashing").with_dimension(dimension)
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Set the vector dimension (builder style)
    pub fn with_dimension(self, dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..self
        }
    }

    /// Set the API key (builder style)
    pub fn with_api_key(self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    /// Set the remote API base URL (builder style)
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..self
        }
    }

    /// Set the fastembed model cache directory (builder style)
    pub fn with_cache_dir(self, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            ..self
        }
    }

    /// Validate settings that can be checked without contacting the backend
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model_name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be greater than 0"));
        }
        if self.dimension == Some(0) {
            return Err(EmbedError::invalid_config("dimension must be greater than 0"));
        }
        if self.provider == ProviderKind::Gemini
            && self.api_key.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(EmbedError::invalid_config(
                "Gemini embeddings require an API key (set GEMINI_API_KEY or GOOGLE_API_KEY)",
            ));
        }

        tracing::debug!("Embedding configuration valid for: {}", self.model_name);
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::new(ProviderKind::Gemini, DEFAULT_GEMINI_EMBEDDING_MODEL)
    }
}
