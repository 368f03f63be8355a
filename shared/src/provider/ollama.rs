//! Local Ollama server through its streaming chat API.

use super::stream::{collect_stream, line_stream};
use super::{
    require_text, GenerationProvider, GenerationRequest, Message, ProviderError,
    MAX_OUTPUT_TOKENS, TEMPERATURE,
};
use crate::config::OllamaConfig;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const NAME: &str = "ollama";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ChatChunk {
    message: Option<ChunkMessage>,
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ChunkMessage {
    content: String,
}

fn decode_line(line: &str) -> Option<Result<String, ProviderError>> {
    if line.trim().is_empty() {
        return None;
    }
    let chunk: ChatChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            return Some(Err(ProviderError::transport(
                NAME,
                format!("invalid stream chunk: {e}"),
            )))
        }
    };
    if let Some(error) = chunk.error {
        return Some(Err(ProviderError::transport(NAME, error)));
    }
    if chunk.done {
        tracing::debug!(provider = NAME, "Generation finished");
    }
    chunk.message.map(|m| Ok(m.content))
}

/// Ollama provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Creates a provider from validated settings.
    #[must_use]
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
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
        let body = ChatRequest {
            model: &self.config.model,
            messages: request.messages(),
            stream: true,
            options: ChatOptions {
                temperature: TEMPERATURE,
                num_predict: MAX_OUTPUT_TOKENS,
            },
        };
        let url = format!("{}/api/chat", self.config.endpoint.trim_end_matches('/'));
        tracing::debug!(provider = NAME, model = %self.config.model, url = %url, "Generating content");

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = self.client.post(&url).json(&body).send() => {
                response.map_err(|e| ProviderError::transport(NAME, e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::transport(NAME, format!("HTTP {status}: {text}")));
        }

        let increments = line_stream(response.bytes_stream(), NAME).filter_map(|line| {
            let item = match line {
                Ok(line) => decode_line(&line),
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(item)
        });

        let text = collect_stream(increments, cancel).await?;
        require_text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_decode_line() {
        assert!(decode_line("").is_none());
        assert_eq!(
            decode_line(r#"{"message":{"role":"assistant","content":"hi"},"done":false}"#)
                .unwrap()
                .unwrap(),
            "hi"
        );
        assert!(matches!(
            decode_line(r#"{"error":"model not found"}"#),
            Some(Err(ProviderError::Transport { .. }))
        ));
    }

    #[tokio::test]
    async fn test_generate_content_ndjson() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Slow \"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"database\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "stream": true,
                "messages": [{"role": "user", "content": "analyze"}],
                "options": {"num_predict": 2048}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(OllamaConfig::new("llama3").with_endpoint(server.uri()));
        let text = provider
            .generate_content(
                &GenerationRequest::Prompt("analyze".to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(text, "Slow database");
    }

    #[tokio::test]
    async fn test_generate_content_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
                "application/x-ndjson",
            ))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(OllamaConfig::new("llama3").with_endpoint(server.uri()));
        let result = provider
            .generate_content(
                &GenerationRequest::Prompt("analyze".to_string()),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(ProviderError::EmptyResponse)));
    }
}
