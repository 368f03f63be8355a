//! Text generation providers.
//!
//! A [`GenerationProvider`] turns a prompt into generated text. Remote
//! providers stream their answer; [`stream::collect_stream`] folds the
//! increments into one string so callers see a blocking call.

pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod stream;
pub mod vertex;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use vertex::VertexAiProvider;

use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Sampling temperature used for every analysis.
pub const TEMPERATURE: f32 = 0.2;

/// Upper bound on generated tokens.
pub const MAX_OUTPUT_TOKENS: u32 = 2048;

/// Errors that can occur while generating content.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The prompt was rejected before generation.
    #[error("Prompt was blocked: {reason}")]
    BlockedPrompt {
        /// Vendor block reason.
        reason: String,
    },

    /// The only candidate was withheld by safety filters.
    #[error("Response was blocked: {reason}")]
    BlockedResponse {
        /// Vendor finish reason.
        reason: String,
    },

    /// Generation finished without any text.
    #[error("Provider returned an empty response")]
    EmptyResponse,

    /// Network, authentication or protocol failure.
    #[error("{provider} request failed: {message}")]
    Transport {
        /// Provider name.
        provider: String,
        /// Error message.
        message: String,
    },

    /// The caller cancelled the request.
    #[error("Generation was cancelled")]
    Cancelled,

    /// A credential or required setting was not supplied.
    #[error("{provider}: missing credential '{field}'")]
    MissingCredential {
        /// Provider name.
        provider: String,
        /// Name of the missing setting.
        field: String,
    },
}

impl ProviderError {
    pub(crate) fn transport(provider: &str, message: impl fmt::Display) -> Self {
        Self::Transport {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// The human side.
    User,
    /// Earlier model output.
    Assistant,
}

/// One message of a structured request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Message {
    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Input of a generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationRequest {
    /// A single user prompt.
    Prompt(String),
    /// A structured conversation.
    Messages(Vec<Message>),
}

impl GenerationRequest {
    /// The request as a list of messages.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        match self {
            Self::Prompt(prompt) => vec![Message::user(prompt.clone())],
            Self::Messages(messages) => messages.clone(),
        }
    }
}

impl From<String> for GenerationRequest {
    fn from(prompt: String) -> Self {
        Self::Prompt(prompt)
    }
}

/// Trait for text generation backends.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name, e.g. `gemini`.
    fn name(&self) -> &str;

    /// Model name.
    fn model(&self) -> &str;

    /// Generates the complete answer for `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor blocks the prompt or the answer, the
    /// answer is empty, the transport fails or `cancel` fires.
    async fn generate_content(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;

    /// Releases provider resources.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown fails.
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Builds the provider selected by `config`.
///
/// # Errors
///
/// Returns [`ProviderError::MissingCredential`] if a required setting is empty.
pub fn build_provider(config: &ProviderConfig) -> Result<Box<dyn GenerationProvider>, ProviderError> {
    config.validate().map_err(|e| ProviderError::MissingCredential {
        provider: config.name().to_string(),
        field: e.fields().to_string(),
    })?;

    tracing::debug!(provider = config.name(), "Building generation provider");
    Ok(match config {
        ProviderConfig::Mock { response } => Box::new(MockProvider::new(response.clone())),
        ProviderConfig::Gemini(cfg) => Box::new(GeminiProvider::new(cfg.clone())),
        ProviderConfig::VertexAi(cfg) => Box::new(VertexAiProvider::new(cfg.clone())),
        ProviderConfig::Ollama(cfg) => Box::new(OllamaProvider::new(cfg.clone())),
    })
}

/// Maps an empty answer to [`ProviderError::EmptyResponse`].
pub(crate) fn require_text(text: String) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        Err(ProviderError::EmptyResponse)
    } else {
        Ok(text)
    }
}
