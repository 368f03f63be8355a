//! Gemini through the Generative Language API.
//!
//! Also holds the `generateContent` wire types and stream decoding shared
//! with the Vertex AI provider, which speaks the same protocol.

use super::stream::{collect_stream, line_stream, sse_data};
use super::{
    require_text, GenerationProvider, GenerationRequest, Message, ProviderError, Role,
    MAX_OUTPUT_TOKENS, TEMPERATURE,
};
use crate::config::GeminiConfig;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const NAME: &str = "gemini";

/// Harm categories relaxed to `BLOCK_NONE`.
pub const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct StreamChunk {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentRequest {
    /// Builds the request body with the fixed generation parameters.
    pub(crate) fn new(request: &GenerationRequest) -> Self {
        let messages = request.messages();
        let (system, conversation): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.role == Role::System);

        let system_instruction = (!system.is_empty()).then(|| Content {
            role: None,
            parts: system
                .iter()
                .map(|m| Part {
                    text: Some(m.content.clone()),
                })
                .collect(),
        });

        let contents = conversation
            .iter()
            .map(|m| Content {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        Role::User | Role::System => "user",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        Self {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
            safety_settings: SAFETY_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

/// Decodes one `data:` payload into its text increment.
fn decode_chunk(provider: &str, data: &str) -> Result<String, ProviderError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| ProviderError::transport(provider, format!("invalid stream chunk: {e}")))?;

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::BlockedPrompt { reason });
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(String::new());
    };
    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ProviderError::BlockedResponse {
            reason: "SAFETY".to_string(),
        });
    }

    Ok(candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default())
}

/// Sends a `streamGenerateContent` request and collects the answer.
pub(crate) async fn stream_generate(
    provider: &'static str,
    builder: reqwest::RequestBuilder,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> Result<String, ProviderError> {
    let body = GenerateContentRequest::new(request);

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ProviderError::Cancelled),
        response = builder.json(&body).send() => {
            response.map_err(|e| ProviderError::transport(provider, e))?
        }
    };

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ProviderError::transport(provider, format!("HTTP {status}: {text}")));
    }

    let increments = line_stream(response.bytes_stream(), provider).filter_map(move |line| {
        let item = match line {
            Ok(line) => sse_data(&line).map(|data| decode_chunk(provider, data)),
            Err(e) => Some(Err(e)),
        };
        futures::future::ready(item)
    });

    let text = collect_stream(increments, cancel).await?;
    require_text(text)
}

/// Gemini provider using an API key.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    /// Creates a provider from validated settings.
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_content(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        tracing::debug!(provider = NAME, model = %self.config.model, "Generating content");
        let builder = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key);
        stream_generate(NAME, builder, request, cancel).await
    }
}
