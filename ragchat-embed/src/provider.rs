//! Embedding provider trait and the local fastembed implementation

use crate::config::{EmbedConfig, ProviderKind};
use crate::error::{EmbedError, Result};
use crate::gemini::GeminiEmbeddingProvider;
use crate::hashing::HashingProvider;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use std::sync::{Arc, Mutex};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result from a vector of f16 embeddings.
    ///
    /// The dimension is inferred from the first embedding vector and
    /// defaults to 0 when there are none.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// The same provider instance must be used for indexing and for queries so
/// that both live in the same embedding space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::malformed("No embedding generated for text"))
    }

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Get the model identifier used by this provider
    fn model_name(&self) -> &str;
}

/// Build the provider described by `config`.
///
/// Local models are loaded eagerly so that startup fails fast when a model
/// cannot be initialized.
pub async fn create_provider(config: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;

    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Gemini => Arc::new(GeminiEmbeddingProvider::new(config.clone())?),
        ProviderKind::FastEmbed => Arc::new(FastEmbedProvider::create(config.clone()).await?),
        ProviderKind::Hashing => Arc::new(HashingProvider::from_config(config)),
    };

    tracing::info!(
        "Embedding provider ready: {} ({}), dimension {}",
        provider.provider_name(),
        provider.model_name(),
        provider.embedding_dimension()
    );
    Ok(provider)
}

/// Convert f32 embeddings to f16, L2-normalizing first when requested.
pub(crate) fn to_f16(embedding: Vec<f32>, normalize: bool) -> Vec<f16> {
    let norm = if normalize {
        embedding.iter().map(|x| x * x).sum::<f32>().sqrt()
    } else {
        0.0
    };

    if norm > 0.0 {
        embedding.into_iter().map(|x| f16::from_f32(x / norm)).collect()
    } else {
        embedding.into_iter().map(f16::from_f32).collect()
    }
}

/// Map a model name onto one of fastembed's built-in models.
pub fn fastembed_model(name: &str) -> Result<EmbeddingModel> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok(EmbeddingModel::AllMiniLML6V2)
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
            Ok(EmbeddingModel::NomicEmbedTextV15)
        }
        "snowflake-arctic-embed-xs" | "snowflake/snowflake-arctic-embed-xs" => {
            Ok(EmbeddingModel::SnowflakeArcticEmbedXS)
        }
        _ => Err(EmbedError::invalid_config(format!(
            "Unsupported fastembed model: {name}"
        ))),
    }
}

/// FastEmbed-based embedding provider using local ONNX models
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Loads the configured model (downloading it on first use) and probes its dimension.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let model_kind = fastembed_model(&config.model_name)?;
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            config.model_name
        );

        let cache_dir = config.cache_dir.clone();
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let mut init_options =
                    InitOptions::new(model_kind).with_show_download_progress(false);
                if let Some(dir) = cache_dir {
                    init_options = init_options.with_cache_dir(dir);
                }

                let mut model =
                    TextEmbedding::try_new(init_options).map_err(EmbedError::model_init)?;

                // Probe the dimension with a test embedding
                let test_embeddings = model
                    .embed(vec!["test".to_string()], None)
                    .map_err(EmbedError::model_init)?;
                let dimension = test_embeddings
                    .first()
                    .map(|emb| emb.len())
                    .ok_or_else(|| EmbedError::malformed("Model produced no probe embedding"))?;

                Ok((model, dimension))
            })
            .await??;

        tracing::info!("Model loaded successfully. Dimension: {}", dimension);
        Ok(Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let batch_embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model_guard = model
                    .lock()
                    .map_err(|_| EmbedError::malformed("Embedding model lock poisoned"))?;
                model_guard
                    .embed(batch, None)
                    .map_err(|e| EmbedError::External { source: e })
            })
            .await??;

            all_embeddings.extend(
                batch_embeddings
                    .into_iter()
                    .map(|e| to_f16(e, self.config.normalize)),
            );
        }

        if all_embeddings.len() != texts.len() {
            return Err(EmbedError::malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                all_embeddings.len()
            )));
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
