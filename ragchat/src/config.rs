//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! command-line overrides applied by the binary. API keys never come from the
//! file; they are read from `GEMINI_API_KEY` or `GOOGLE_API_KEY`.

use crate::error::ConfigError;
use ragchat_embed::{
    DEFAULT_FASTEMBED_MODEL, DEFAULT_GEMINI_EMBEDDING_MODEL, EmbedConfig, ProviderKind,
};
use ragchat_retriever::{DEFAULT_K, IndexerConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_DOCUMENT: &str = "someText.txt";
pub const DEFAULT_SESSION_ID: &str = "chat-1";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 60;
const HASHING_MODEL_NAME: &str = "fnv-feature-hashing";

/// Which backend answers chat turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProviderKind {
    /// Google Generative Language API
    Gemini,
    /// Offline model that quotes the retrieved context
    Echo,
}

impl fmt::Display for ChatProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChatProviderKind::Gemini => "gemini",
            ChatProviderKind::Echo => "echo",
        })
    }
}

impl FromStr for ChatProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ChatProviderKind::Gemini),
            "echo" | "offline" => Ok(ChatProviderKind::Echo),
            _ => Err(ConfigError::invalid(format!("Unknown chat provider: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,
    pub model: String,
    /// Output dimensionality (Gemini) or vector length (hashing)
    pub dimension: Option<usize>,
    pub batch_size: usize,
    /// Embedding batches in flight while building the index
    pub max_concurrency: usize,
    pub base_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        let indexer = IndexerConfig::default();
        Self {
            provider: ProviderKind::Gemini,
            model: DEFAULT_GEMINI_EMBEDDING_MODEL.to_string(),
            dimension: None,
            batch_size: indexer.batch_size,
            max_concurrency: indexer.max_concurrency,
            base_url: None,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: ChatProviderKind,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: ChatProviderKind::Gemini,
            model: DEFAULT_CHAT_MODEL.to_string(),
            base_url: None,
            temperature: None,
        }
    }
}

/// Complete configuration of a chat session
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// UTF-8 text file answered from
    pub document: PathBuf,
    pub session_id: String,
    pub retrieval_k: usize,
    pub turn_timeout_secs: u64,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagConfig")
            .field("document", &self.document)
            .field("session_id", &self.session_id)
            .field("retrieval_k", &self.retrieval_k)
            .field("turn_timeout_secs", &self.turn_timeout_secs)
            .field("chunking", &self.chunking)
            .field("embedding", &self.embedding)
            .field("generation", &self.generation)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            document: PathBuf::from(DEFAULT_DOCUMENT),
            session_id: DEFAULT_SESSION_ID.to_string(),
            retrieval_k: DEFAULT_K,
            turn_timeout_secs: DEFAULT_TURN_TIMEOUT_SECS,
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
            api_key: None,
        }
    }
}

impl RagConfig {
    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load from `path` when given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Fill in the API key from the environment unless one is already set.
    pub fn with_env_api_key(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = pick_api_key(
                std::env::var("GEMINI_API_KEY").ok(),
                std::env::var("GOOGLE_API_KEY").ok(),
            );
        }
        self
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    /// Check every value that can be checked before touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size must be greater than 0"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval_k == 0 {
            return Err(ConfigError::invalid("retrieval_k must be greater than 0"));
        }
        if self.turn_timeout_secs == 0 {
            return Err(ConfigError::invalid("turn_timeout_secs must be greater than 0"));
        }
        if self.session_id.trim().is_empty() {
            return Err(ConfigError::invalid("session_id must not be empty"));
        }
        if self.embedding.batch_size == 0 || self.embedding.max_concurrency == 0 {
            return Err(ConfigError::invalid(
                "embedding batch_size and max_concurrency must be greater than 0",
            ));
        }

        let has_key = self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if self.embedding.provider == ProviderKind::Gemini && !has_key {
            return Err(ConfigError::MissingApiKey {
                what: "Gemini embedding",
            });
        }
        if self.generation.provider == ChatProviderKind::Gemini && !has_key {
            return Err(ConfigError::MissingApiKey {
                what: "Gemini generation",
            });
        }
        Ok(())
    }

    /// Embedding model id, falling back to the backend's own default when the
    /// Gemini default was left in place for another backend.
    pub fn embedding_model(&self) -> &str {
        let model = self.embedding.model.as_str();
        if model != DEFAULT_GEMINI_EMBEDDING_MODEL {
            return model;
        }
        match self.embedding.provider {
            ProviderKind::Gemini => model,
            ProviderKind::FastEmbed => DEFAULT_FASTEMBED_MODEL,
            ProviderKind::Hashing => HASHING_MODEL_NAME,
        }
    }

    /// Settings for the embedding provider shared by indexing and retrieval.
    pub fn embed_config(&self) -> EmbedConfig {
        let mut config = EmbedConfig::new(self.embedding.provider, self.embedding_model())
            .with_batch_size(self.embedding.batch_size);
        if let Some(dimension) = self.embedding.dimension {
            config = config.with_dimension(dimension);
        }
        if let Some(base_url) = &self.embedding.base_url {
            config = config.with_base_url(base_url.clone());
        }
        if let Some(cache_dir) = &self.embedding.cache_dir {
            config = config.with_cache_dir(cache_dir.clone());
        }
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key.clone());
        }
        config
    }

    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig::default()
            .with_batch_size(self.embedding.batch_size)
            .with_max_concurrency(self.embedding.max_concurrency)
    }
}

fn pick_api_key(gemini: Option<String>, google: Option<String>) -> Option<String> {
    gemini
        .filter(|k| !k.trim().is_empty())
        .or_else(|| google.filter(|k| !k.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn offline() -> RagConfig {
        let mut config = RagConfig::default();
        config.embedding.provider = ProviderKind::Hashing;
        config.generation.provider = ChatProviderKind::Echo;
        config
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.document, PathBuf::from("someText.txt"));
        assert_eq!(config.session_id, "chat-1");
        assert_eq!(config.retrieval_k, 4);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.embedding.model, "models/gemini-embedding-001");
        assert_eq!(config.generation.model, "gemini-2.5-flash");
        assert_eq!(config.turn_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RagConfig::from_toml_str(
            r#"
            retrieval_k = 6
            session_id = "support"

            [chunking]
            chunk_size = 500

            [embedding]
            provider = "hashing"
            dimension = 128

            [generation]
            provider = "echo"
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval_k, 6);
        assert_eq!(config.session_id, "support");
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.embedding.provider, ProviderKind::Hashing);
        assert_eq!(config.embedding.dimension, Some(128));
        assert_eq!(config.generation.provider, ChatProviderKind::Echo);
        assert_eq!(config.generation.model, "gemini-2.5-flash");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "turn_timeout_secs = 5").unwrap();
        let config = RagConfig::from_file(file.path()).unwrap();
        assert_eq!(config.turn_timeout_secs, 5);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "retrieval_k = \"four\"").unwrap();
        assert!(matches!(
            RagConfig::from_file(bad.path()),
            Err(ConfigError::Parse { .. })
        ));

        assert!(matches!(
            RagConfig::from_file("/definitely/not/here.toml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = offline();
        config.chunking.chunk_overlap = 1000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = offline();
        config.retrieval_k = 0;
        assert!(config.validate().is_err());

        let mut config = offline();
        config.turn_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = offline();
        config.chunking.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gemini_requires_key() {
        let config = RagConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingApiKey { .. })
        ));

        let config = RagConfig {
            api_key: Some("secret".to_string()),
            ..RagConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(!format!("{config:?}").contains("secret"));
        assert_eq!(config.embed_config().api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_embedding_model_follows_provider() {
        let mut config = offline();
        assert_eq!(config.embed_config().model_name, "fnv-feature-hashing");

        config.embedding.provider = ProviderKind::FastEmbed;
        assert_eq!(config.embedding_model(), "all-minilm-l6-v2");

        config.embedding.model = "bge-small-en-v1.5".to_string();
        assert_eq!(config.embedding_model(), "bge-small-en-v1.5");
    }

    #[test]
    fn test_pick_api_key() {
        assert_eq!(
            pick_api_key(Some("a".into()), Some("b".into())),
            Some("a".to_string())
        );
        assert_eq!(
            pick_api_key(Some("  ".into()), Some("b".into())),
            Some("b".to_string())
        );
        assert_eq!(pick_api_key(None, None), None);
    }

    #[test]
    fn test_chat_provider_from_str() {
        assert_eq!("Gemini".parse::<ChatProviderKind>().unwrap(), ChatProviderKind::Gemini);
        assert_eq!("echo".parse::<ChatProviderKind>().unwrap(), ChatProviderKind::Echo);
        assert!("gpt".parse::<ChatProviderKind>().is_err());
    }
}
