//! Gemini embedding provider (Google Generative Language API)

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, to_f16};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base URL of the Generative Language API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Vector length of `gemini-embedding-001` when no output dimensionality is requested.
const GEMINI_DEFAULT_DIMENSION: usize = 3072;

/// The API accepts at most this many requests per batch call.
const GEMINI_MAX_BATCH: usize = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Embedding provider backed by Gemini's `batchEmbedContents` endpoint
#[derive(Clone)]
pub struct GeminiEmbeddingProvider {
    client: Client,
    config: EmbedConfig,
    api_key: String,
    base_url: String,
    model_path: String,
}

impl std::fmt::Debug for GeminiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model_path", &self.model_path)
            .finish()
    }
}

/// Qualify a bare model id with the `models/` prefix the API expects.
pub(crate) fn model_path(model_name: &str) -> String {
    if model_name.starts_with("models/") {
        model_name.to_string()
    } else {
        format!("models/{model_name}")
    }
}

impl GeminiEmbeddingProvider {
    /// Create a provider from configuration. Fails without an API key.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| EmbedError::invalid_config("Gemini embeddings require an API key"))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            model_path: model_path(&config.model_name),
            config,
            api_key,
            base_url,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:batchEmbedContents", self.base_url, self.model_path)
    }

    fn request_body<'a>(&'a self, texts: &'a [String]) -> BatchEmbedRequest<'a> {
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.model_path,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    output_dimensionality: self.config.dimension,
                })
                .collect(),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", &self.api_key)])
            .json(&self.request_body(texts))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api { status, message });
        }

        let body: BatchEmbedResponse = response.json().await?;
        if body.embeddings.len() != texts.len() {
            return Err(EmbedError::malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let batch_size = self.config.batch_size.clamp(1, GEMINI_MAX_BATCH);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size) {
            tracing::debug!("Requesting {} Gemini embeddings", batch.len());
            let vectors = self.embed_batch(batch).await?;
            all_embeddings.extend(
                vectors
                    .into_iter()
                    .map(|v| to_f16(v, self.config.normalize)),
            );
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension.unwrap_or(GEMINI_DEFAULT_DIMENSION)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
