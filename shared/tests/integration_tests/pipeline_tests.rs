//! Integration tests for backend queries chained through pipes.
//!
//! Tests cover:
//! - Wildcard value search and top-trace ranking on a seeded backend
//! - Merging of upstream pipe data with a stage result
//! - Native rendering without upstream and CSV rejection with upstream
//! - Aggregation of several piped documents

use serde_json::Value;
use shared::aggregator::aggregate;
use shared::backend::{
    Backend, ListLogsRequest, ListSpansRequest, SearchValuesRequest, TopTracesRequest,
    WildcardPattern,
};
use shared::collector::{CollectRequest, TraceCollector};
use shared::output::{OutputFormat, StageResult};
use shared::pipeline::PipelineError;

use super::common::{run_stage, seeded_backend, window};

#[tokio::test]
async fn test_search_values_with_wildcard() {
    let backend = seeded_backend();

    let response = backend
        .search_values(&SearchValuesRequest {
            attribute: "http.path".to_string(),
            pattern: WildcardPattern::new("*user*"),
            window: window(),
        })
        .await
        .unwrap();

    assert_eq!(response.values, vec!["/api/users".to_string()]);
}

#[tokio::test]
async fn test_search_values_match_all_returns_every_distinct_value() {
    let backend = seeded_backend();

    let response = backend
        .search_values(&SearchValuesRequest {
            attribute: "http.path".to_string(),
            pattern: WildcardPattern::new("*"),
            window: window(),
        })
        .await
        .unwrap();

    assert_eq!(
        response.values,
        vec!["/api/users".to_string(), "/health".to_string()]
    );
}

#[tokio::test]
async fn test_top_traces_ranked_by_duration() {
    let backend = seeded_backend();

    let response = backend
        .top_traces(&TopTracesRequest {
            attribute: "http.path".to_string(),
            value: "/api/users".to_string(),
            window: window(),
            limit: 2,
        })
        .await
        .unwrap();

    let ids: Vec<&str> = response.traces.iter().map(|t| t.trace_id.as_str()).collect();
    assert_eq!(ids, vec!["trace-b", "trace-a"]);
    assert!((response.traces[0].duration_seconds - 0.2).abs() < 1e-9);
    assert!((response.traces[1].duration_seconds - 0.05).abs() < 1e-9);
}

#[tokio::test]
async fn test_spans_then_logs_through_pipe() {
    let backend = seeded_backend();

    let spans = backend
        .list_spans(&ListSpansRequest {
            trace_id: "trace-b".to_string(),
            window: window(),
        })
        .await
        .unwrap();
    let first = run_stage(b"", StageResult::Spans(spans), OutputFormat::Json).unwrap();

    // Without upstream the native response shape is emitted.
    let native: Value = serde_json::from_str(&first).unwrap();
    assert_eq!(native["spans"].as_array().unwrap().len(), 2);
    assert!(native.get("web_link").is_some());

    let logs = backend
        .list_logs(&ListLogsRequest {
            trace_id: "trace-b".to_string(),
            window: window(),
            limit: None,
        })
        .await
        .unwrap();
    let second = run_stage(first.as_bytes(), StageResult::Logs(logs), OutputFormat::Json).unwrap();

    let merged = aggregate(second.as_bytes()).unwrap();
    assert_eq!(merged.spans.len(), 2);
    assert_eq!(merged.logs.len(), 2);
    assert_eq!(merged.spans[0].id(), Some("b1"));
    assert_eq!(merged.logs[0].message, "query failed: connection pool exhausted");

    let json: Value = serde_json::from_str(&second).unwrap();
    for key in ["spans", "logs", "traces", "values"] {
        assert!(json[key].is_array(), "missing {key}");
    }
}

#[tokio::test]
async fn test_csv_without_upstream_is_native() {
    let backend = seeded_backend();
    let values = backend
        .search_values(&SearchValuesRequest {
            attribute: "http.path".to_string(),
            pattern: WildcardPattern::new("*"),
            window: window(),
        })
        .await
        .unwrap();

    let csv = run_stage(b"", StageResult::Values(values), OutputFormat::Csv).unwrap();

    assert_eq!(csv, "value\n/api/users\n/health\n");
}

#[tokio::test]
async fn test_csv_with_upstream_is_rejected() {
    let backend = seeded_backend();
    let values = backend
        .search_values(&SearchValuesRequest {
            attribute: "http.path".to_string(),
            pattern: WildcardPattern::new("*"),
            window: window(),
        })
        .await
        .unwrap();

    let result = run_stage(
        br#"{"spans":[{"id":"s1"}]}"#,
        StageResult::Values(values),
        OutputFormat::Csv,
    );

    assert!(matches!(
        result,
        Err(PipelineError::UnsupportedFormat(OutputFormat::Csv))
    ));
}

#[tokio::test]
async fn test_table_with_upstream_prints_counts() {
    let backend = seeded_backend();
    let values = backend
        .search_values(&SearchValuesRequest {
            attribute: "http.path".to_string(),
            pattern: WildcardPattern::new("*user*"),
            window: window(),
        })
        .await
        .unwrap();

    let table = run_stage(
        br#"{"spans":[{"id":"s1"}]}"#,
        StageResult::Values(values),
        OutputFormat::Table,
    )
    .unwrap();

    assert!(table.contains("- Spans: 1"));
    assert!(table.contains("- Values: 1"));
}

#[test]
fn test_aggregate_two_documents() {
    let input = concat!(
        "{\"spans\":[{\"id\":\"s1\"}]}\n",
        "{\"logs\":[{\"timestamp\":\"2024-01-01T00:00:00Z\",\"message\":\"boom\"}]}\n",
    );

    let data = aggregate(input.as_bytes()).unwrap();

    assert_eq!(data.spans.len(), 1);
    assert_eq!(data.logs.len(), 1);
    assert!(data.traces.is_empty());
    assert!(data.values.is_empty());
}

#[test]
fn test_aggregate_roundtrip_is_stable() {
    let input = concat!(
        "{\"values\":[\"/a\",\"/b\"]}\n",
        "{\"spans\":[{\"id\":\"s1\",\"duration.ms\":12.5}],\"values\":[\"/c\"]}\n",
    );

    let data = aggregate(input.as_bytes()).unwrap();
    let again = aggregate(serde_json::to_string(&data).unwrap().as_bytes()).unwrap();

    assert_eq!(data.values, vec!["/a", "/b", "/c"]);
    assert_eq!(data, again);
}

#[tokio::test]
async fn test_collector_feeds_pipe() {
    let backend = seeded_backend();

    let collected = TraceCollector::new(&backend)
        .with_logs(&backend)
        .collect(&CollectRequest::new("trace-b", window()))
        .await
        .unwrap();

    assert_eq!(collected.spans.len(), 2);
    assert_eq!(collected.logs.len(), 2);
    assert_eq!(collected.summary(), "2 spans, 2 logs");
}
