//! Integration tests for prompt generation and analysis of piped data.
//!
//! Tests cover:
//! - Japanese instructions appended after English section headers
//! - Error indicator counts in the data summary
//! - The mock provider answering without network access
//! - The full chain from piped JSON to an analysis result

use std::sync::Arc;

use shared::analyzer::{AnalysisResult, Analyzer};
use shared::backend::{Backend, ListLogsRequest, ListSpansRequest};
use shared::config::ProviderConfig;
use shared::output::{OutputFormat, StageResult};
use shared::pipeline::Passthrough;
use shared::prompt::{
    generate_prompt, AnalysisKind, Language, ERROR_SECTIONS, JAPANESE_INSTRUCTIONS,
};
use shared::provider::{build_provider, GenerationProvider, GenerationRequest, MockProvider};
use tokio_util::sync::CancellationToken;

use super::common::{run_stage, seeded_backend, window};

async fn piped_trace() -> String {
    let backend = seeded_backend();
    let spans = backend
        .list_spans(&ListSpansRequest {
            trace_id: "trace-b".to_string(),
            window: window(),
        })
        .await
        .unwrap();
    let logs = backend
        .list_logs(&ListLogsRequest {
            trace_id: "trace-b".to_string(),
            window: window(),
            limit: Some(10),
        })
        .await
        .unwrap();

    let first = run_stage(b"", StageResult::Spans(spans), OutputFormat::Json).unwrap();
    run_stage(first.as_bytes(), StageResult::Logs(logs), OutputFormat::Json).unwrap()
}

#[tokio::test]
async fn test_error_prompt_in_japanese() {
    let piped = piped_trace().await;
    let data = Passthrough::from_reader(piped.as_bytes(), false)
        .unwrap()
        .upstream()
        .clone();

    let prompt = generate_prompt(AnalysisKind::Error, &data, Language::Japanese).unwrap();

    assert!(prompt.ends_with(JAPANESE_INSTRUCTIONS));
    assert!(prompt.contains("## Data Summary"));
    assert!(prompt.contains("## Analysis Requirements"));
    for (title, _) in ERROR_SECTIONS {
        assert!(prompt.contains(&format!("**{title}**")), "missing {title}");
    }
    assert!(prompt.contains("- Spans with error indicators: 1"));
    assert!(prompt.contains("- Logs with error keywords: 1"));
}

#[tokio::test]
async fn test_english_prompt_has_no_language_block() {
    let piped = piped_trace().await;
    let data = Passthrough::from_reader(piped.as_bytes(), false)
        .unwrap()
        .upstream()
        .clone();

    let prompt = generate_prompt(AnalysisKind::Duration, &data, Language::English).unwrap();

    assert!(!prompt.contains("## Language Instructions"));
    assert!(prompt.contains("- Spans: 2 entries"));
    assert!(prompt.contains("- Logs: 2 entries"));
}

#[tokio::test]
async fn test_mock_provider_needs_no_network() {
    let provider = build_provider(&ProviderConfig::Mock {
        response: "all good".to_string(),
    })
    .unwrap();

    let text = provider
        .generate_content(
            &GenerationRequest::Prompt("anything".to_string()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(text, "all good");
    assert_eq!(provider.name(), "mock");
}

#[tokio::test]
async fn test_analyze_piped_data() {
    let piped = piped_trace().await;
    let data = Passthrough::from_reader(piped.as_bytes(), false)
        .unwrap()
        .upstream()
        .clone();
    let mock = Arc::new(MockProvider::new("The SELECT users span dominates."));
    let analyzer = Analyzer::new(mock.clone()).with_language(Language::Japanese);

    let result = analyzer
        .analyze(AnalysisKind::Duration, &data, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 1);
    assert_eq!(
        result,
        AnalysisResult {
            analysis_kind: AnalysisKind::Duration,
            summary: "2 spans, 2 logs".to_string(),
            content: "The SELECT users span dominates.".to_string(),
            provider: "mock".to_string(),
            model: "mock".to_string(),
        }
    );
}

#[tokio::test]
async fn test_cancelled_analysis_keeps_kind() {
    let analyzer = Analyzer::new(Arc::new(MockProvider::default()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = analyzer
        .analyze(AnalysisKind::Error, &shared::models::CombinedData::new(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AnalysisKind::Error);
}
