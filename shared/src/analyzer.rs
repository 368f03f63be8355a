//! Analysis orchestration.
//!
//! Renders the prompt for the requested analysis kind, calls the provider
//! once and packages the answer with its provenance.

use crate::models::CombinedData;
use crate::prompt::{generate_prompt, AnalysisKind, Language, PromptError};
use crate::provider::{GenerationProvider, GenerationRequest, ProviderError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during an analysis.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The prompt could not be rendered.
    #[error("{kind} analysis failed to build the prompt: {source}")]
    Prompt {
        /// Requested analysis kind.
        kind: AnalysisKind,
        /// Underlying error.
        #[source]
        source: PromptError,
    },

    /// The provider call failed.
    #[error("{kind} analysis failed: {source}")]
    Provider {
        /// Requested analysis kind.
        kind: AnalysisKind,
        /// Underlying error.
        #[source]
        source: ProviderError,
    },
}

impl AnalyzerError {
    /// Analysis kind that failed.
    #[must_use]
    pub fn kind(&self) -> AnalysisKind {
        match self {
            Self::Prompt { kind, .. } | Self::Provider { kind, .. } => *kind,
        }
    }
}

/// The outcome of one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Kind of analysis performed.
    #[serde(rename = "analysis_type")]
    pub analysis_kind: AnalysisKind,
    /// Volume summary of the analyzed data, e.g. `3 spans, 2 logs`.
    pub summary: String,
    /// Generated report.
    pub content: String,
    /// Provider name.
    pub provider: String,
    /// Model name.
    pub model: String,
}

/// Runs analyses against one provider.
#[derive(Clone)]
pub struct Analyzer {
    provider: Arc<dyn GenerationProvider>,
    language: Language,
}

impl Analyzer {
    /// Creates an analyzer producing English reports.
    #[must_use]
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            provider,
            language: Language::default(),
        }
    }

    /// Sets the report language.
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Report language in effect.
    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Analyzes `data`.
    ///
    /// # Errors
    ///
    /// Returns an error tagged with `kind` if the prompt cannot be built or
    /// the provider fails. No retry is attempted.
    pub async fn analyze(
        &self,
        kind: AnalysisKind,
        data: &CombinedData,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalyzerError> {
        let summary = data.summary();
        let prompt = generate_prompt(kind, data, self.language)
            .map_err(|source| AnalyzerError::Prompt { kind, source })?;

        tracing::info!(
            analysis = %kind,
            language = %self.language,
            provider = self.provider.name(),
            model = self.provider.model(),
            data = %summary,
            prompt_chars = prompt.len(),
            "Running analysis"
        );

        let content = self
            .provider
            .generate_content(&GenerationRequest::Prompt(prompt), cancel)
            .await
            .map_err(|source| AnalyzerError::Provider { kind, source })?;

        Ok(AnalysisResult {
            analysis_kind: kind,
            summary,
            content,
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
        })
    }

    /// Closes the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to shut down.
    pub async fn close(&self) -> Result<(), ProviderError> {
        self.provider.close().await
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("language", &self.language)
            .finish()
    }
}
