//! Chat models that turn a [`Prompt`] into a reply

use crate::config::{ChatProviderKind, GenerationSettings};
use crate::error::GenerationError;
use crate::prompt::Prompt;
use crate::session::Role;
use async_trait::async_trait;
use ragchat_embed::gemini::GEMINI_BASE_URL;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A language model that answers grounded prompts
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Build the chat model described by `settings`.
pub fn create_chat_model(
    settings: &GenerationSettings,
    api_key: Option<&str>,
) -> Result<Arc<dyn ChatModel>, GenerationError> {
    match settings.provider {
        ChatProviderKind::Gemini => {
            let api_key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| GenerationError::invalid_config("Gemini chat requires an API key"))?;
            Ok(Arc::new(GeminiChatModel::new(settings, api_key)?))
        }
        ChatProviderKind::Echo => Ok(Arc::new(EchoChatModel::new())),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn text_content<'a>(role: &'static str, text: &'a str) -> Content<'a> {
    Content {
        role: Some(role),
        parts: vec![Part { text: text.into() }],
    }
}

/// Gemini `generateContent` client
#[derive(Clone)]
pub struct GeminiChatModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl std::fmt::Debug for GeminiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiChatModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiChatModel {
    pub fn new(settings: &GenerationSettings, api_key: &str) -> Result<Self, GenerationError> {
        if settings.model.trim().is_empty() {
            return Err(GenerationError::invalid_config("model must not be empty"));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: settings
                .base_url
                .as_deref()
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: settings
                .model
                .trim_start_matches("models/")
                .to_string(),
            temperature: settings.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// History goes first as alternating user/model turns, then the
    /// context and question as the final user turn.
    fn request_body<'a>(&self, prompt: &'a Prompt) -> GenerateRequest<'a> {
        let mut contents: Vec<Content<'a>> = prompt
            .history
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                text_content(role, &m.content)
            })
            .collect();
        contents.push(Content {
            role: Some("user"),
            parts: vec![Part {
                text: prompt.human_turn().into(),
            }],
        });

        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: prompt.system_instruction.as_str().into(),
                }],
            },
            contents,
            generation_config: self
                .temperature
                .map(|temperature| GenerationConfig { temperature }),
        }
    }
}

fn reply_text(response: GenerateResponse) -> Result<String, GenerationError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(GenerationError::EmptyResponse { reason: None });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse {
            reason: candidate.finish_reason,
        })
    } else {
        Ok(text)
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        debug!(
            "Calling {} with {} history messages and {} context chars",
            self.model,
            prompt.history.len(),
            prompt.context.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", &self.api_key)])
            .json(&self.request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, message });
        }

        reply_text(response.json().await?)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Offline model that answers by quoting the most relevant chunk.
#[derive(Debug, Clone, Default)]
pub struct EchoChatModel;

impl EchoChatModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatModel for EchoChatModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let best = prompt
            .context
            .split(crate::prompt::CONTEXT_SEPARATOR)
            .map(str::trim)
            .find(|s| !s.is_empty());

        Ok(match best {
            Some(passage) => format!("From the document: {passage}"),
            None => "I could not find anything about that in the document.".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::SYSTEM_INSTRUCTION;
    use crate::session::Message;
    use ragchat_context::TextChunk;

    fn settings() -> GenerationSettings {
        GenerationSettings {
            base_url: Some("http://localhost:9999/v1beta/".to_string()),
            temperature: Some(0.2),
            ..GenerationSettings::default()
        }
    }

    fn prompt() -> Prompt {
        let chunk = TextChunk {
            sequence: 0,
            source_offset: 0,
            text: "Y is 2.".to_string(),
        };
        Prompt::new(
            SYSTEM_INSTRUCTION,
            &[chunk],
            "And Y?",
            vec![Message::user("What is X?"), Message::assistant("X is 1.")],
        )
    }

    #[test]
    fn test_request_shape() {
        let model = GeminiChatModel::new(&settings(), "key").unwrap();
        assert_eq!(
            model.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:generateContent"
        );

        let prompt = prompt();
        let body = serde_json::to_value(model.request_body(&prompt)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], SYSTEM_INSTRUCTION);
        assert!(body["systemInstruction"].get("role").is_none());

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "What is X?");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(
            contents[2]["parts"][0]["text"],
            "Context:\nY is 2.\n\nQuestion:\nAnd Y?"
        );
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_reply_parsing() {
        let ok: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Y is "}, {"text": "2."}], "role": "model"}, "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(reply_text(ok).unwrap(), "Y is 2.");

        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert!(matches!(
            reply_text(blocked),
            Err(GenerationError::EmptyResponse { reason: Some(r) }) if r == "SAFETY"
        ));

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            reply_text(empty),
            Err(GenerationError::EmptyResponse { reason: None })
        ));
    }

    #[test]
    fn test_factory() {
        assert!(matches!(
            create_chat_model(&GenerationSettings::default(), None),
            Err(GenerationError::InvalidConfig { .. })
        ));

        let echo = GenerationSettings {
            provider: ChatProviderKind::Echo,
            ..GenerationSettings::default()
        };
        assert_eq!(create_chat_model(&echo, None).unwrap().model_name(), "echo");

        let gemini = create_chat_model(&GenerationSettings::default(), Some("key")).unwrap();
        assert_eq!(gemini.model_name(), "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_echo_quotes_best_chunk() {
        let reply = EchoChatModel::new().generate(&prompt()).await.unwrap();
        assert_eq!(reply, "From the document: Y is 2.");

        let empty = Prompt::new(SYSTEM_INSTRUCTION, &[], "Anything?", vec![]);
        let reply = EchoChatModel::new().generate(&empty).await.unwrap();
        assert!(reply.contains("could not find"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let settings = GenerationSettings {
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..GenerationSettings::default()
        };
        let model = GeminiChatModel::new(&settings, "key").unwrap();
        assert!(matches!(
            model.generate(&prompt()).await,
            Err(GenerationError::Http(_))
        ));
    }
}
