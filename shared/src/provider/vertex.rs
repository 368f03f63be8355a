//! Gemini through Vertex AI.

use super::gemini::stream_generate;
use super::{GenerationProvider, GenerationRequest, ProviderError};
use crate::config::VertexAiConfig;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

const NAME: &str = "vertexai";

/// Vertex AI provider authenticated with an OAuth2 bearer token.
#[derive(Debug, Clone)]
pub struct VertexAiProvider {
    client: reqwest::Client,
    config: VertexAiConfig,
}

impl VertexAiProvider {
    /// Creates a provider from validated settings.
    #[must_use]
    pub fn new(config: VertexAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url().trim_end_matches('/'),
            self.config.project_id,
            self.config.location,
            self.config.model
        )
    }
}

#[async_trait]
impl GenerationProvider for VertexAiProvider {
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
        tracing::debug!(
            provider = NAME,
            model = %self.config.model,
            location = %self.config.location,
            "Generating content"
        );
        let builder = self
            .client
            .post(self.url())
            .bearer_auth(&self.config.access_token);
        stream_generate(NAME, builder, request, cancel).await
    }
}
