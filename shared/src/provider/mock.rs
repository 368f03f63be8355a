//! Deterministic provider for tests and offline runs.

use super::{GenerationProvider, GenerationRequest, ProviderError};
use crate::config::provider::MOCK_DEFAULT_RESPONSE;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Provider that answers every request with a fixed string.
///
/// # Example
///
/// ```
/// use shared::provider::{GenerationProvider, GenerationRequest, MockProvider};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let provider = MockProvider::new("canned");
/// let text = provider
///     .generate_content(&GenerationRequest::Prompt("hi".into()), &CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(text, "canned");
/// # });
/// ```
#[derive(Debug)]
pub struct MockProvider {
    response: String,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Creates a provider answering with `response`.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of generation calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(MOCK_DEFAULT_RESPONSE)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn generate_content(
        &self,
        _request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_fixed_string() {
        let provider = MockProvider::default();

        let text = provider
            .generate_content(
                &GenerationRequest::Prompt("anything".to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(text, MOCK_DEFAULT_RESPONSE);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_observes_cancellation() {
        let provider = MockProvider::new("x");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = provider
            .generate_content(&GenerationRequest::Prompt(String::new()), &cancel)
            .await;

        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_close() {
        assert!(MockProvider::new("x").close().await.is_ok());
    }
}
