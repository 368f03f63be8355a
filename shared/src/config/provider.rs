//! Generation provider settings.

use super::{validate_config, ConfigError};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default Generative Language API base URL.
pub const GEMINI_DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Default local Ollama URL.
pub const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Canned answer returned by the mock provider unless overridden.
pub const MOCK_DEFAULT_RESPONSE: &str = "This is a mock analysis response for testing purposes.";

/// Gemini (Generative Language API) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct GeminiConfig {
    /// Model name, e.g. `gemini-1.5-flash`.
    #[validate(length(min = 1, message = "Gemini model name is required"))]
    pub model: String,

    /// API key sent as `x-goog-api-key`.
    #[validate(length(min = 1, message = "Gemini API key is required"))]
    pub api_key: String,

    /// API base URL.
    #[validate(length(min = 1))]
    pub endpoint: String,
}

impl GeminiConfig {
    /// Creates settings for the public endpoint.
    #[must_use]
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            endpoint: GEMINI_DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Vertex AI settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct VertexAiConfig {
    /// Model name.
    #[validate(length(min = 1, message = "Vertex AI model name is required"))]
    pub model: String,

    /// Google Cloud project.
    #[validate(length(min = 1, message = "Vertex AI project ID is required"))]
    pub project_id: String,

    /// Region, e.g. `us-central1`.
    #[validate(length(min = 1, message = "Vertex AI location is required"))]
    pub location: String,

    /// OAuth2 bearer token.
    #[validate(length(min = 1, message = "Vertex AI access token is required"))]
    pub access_token: String,

    /// API base URL; derived from `location` when `None`.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl VertexAiConfig {
    /// Creates settings for the regional endpoint of `location`.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        project_id: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            project_id: project_id.into(),
            location: location.into(),
            access_token: access_token.into(),
            endpoint: None,
        }
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// The API base URL in effect.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", self.location))
    }
}

/// Ollama settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OllamaConfig {
    /// Model name, e.g. `llama3`.
    #[validate(length(min = 1, message = "Ollama model name is required"))]
    pub model: String,

    /// Server URL.
    #[validate(length(min = 1))]
    pub endpoint: String,
}

impl OllamaConfig {
    /// Creates settings for a local server.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            endpoint: OLLAMA_DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Overrides the server URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Which generation provider to build, with its settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Deterministic test double.
    Mock {
        /// Fixed answer.
        response: String,
    },
    /// Gemini through the Generative Language API.
    Gemini(GeminiConfig),
    /// Gemini through Vertex AI.
    #[serde(rename = "vertexai")]
    VertexAi(VertexAiConfig),
    /// Local Ollama server.
    Ollama(OllamaConfig),
}

impl ProviderConfig {
    /// Mock provider with the default canned answer.
    #[must_use]
    pub fn mock() -> Self {
        Self::Mock {
            response: MOCK_DEFAULT_RESPONSE.to_string(),
        }
    }

    /// Provider name as shown in analysis results.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mock { .. } => "mock",
            Self::Gemini(_) => "gemini",
            Self::VertexAi(_) => "vertexai",
            Self::Ollama(_) => "ollama",
        }
    }

    /// Validates the settings of the selected provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a required setting is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Mock { .. } => Ok(()),
            Self::Gemini(cfg) => validate_config(cfg),
            Self::VertexAi(cfg) => validate_config(cfg),
            Self::Ollama(cfg) => validate_config(cfg),
        }
    }
}
