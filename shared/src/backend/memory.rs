//! In-memory backend over preloaded spans and logs.
//!
//! Answers all four queries the way the vendor adapters do, which makes it
//! the fixture backend for tests and offline demos.

use super::{
    operation, rank_traces, sort_logs_descending, sort_spans_ascending, value_to_string, Backend,
    BackendError, ListLogsRequest, ListLogsResponse, ListSpansRequest, ListSpansResponse,
    SearchValuesRequest, SearchValuesResponse, TopTracesRequest, TopTracesResponse,
    DEFAULT_LOG_LIMIT,
};
use crate::models::{keys, LogEntry, Span, TraceSummary};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const NAME: &str = "memory";

/// In-memory backend for development and testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    spans: Arc<RwLock<Vec<Span>>>,
    logs: Arc<RwLock<Vec<LogEntry>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with spans and logs.
    #[must_use]
    pub fn with_data(spans: Vec<Span>, logs: Vec<LogEntry>) -> Self {
        Self {
            spans: Arc::new(RwLock::new(spans)),
            logs: Arc::new(RwLock::new(logs)),
        }
    }

    /// Adds spans to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn insert_spans(&self, new_spans: Vec<Span>) -> Result<(), BackendError> {
        let mut spans = self.spans.write().map_err(|_| lock_error("insert"))?;
        spans.extend(new_spans);
        Ok(())
    }

    /// Adds log entries to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn insert_logs(&self, new_logs: Vec<LogEntry>) -> Result<(), BackendError> {
        let mut logs = self.logs.write().map_err(|_| lock_error("insert"))?;
        logs.extend(new_logs);
        Ok(())
    }

    /// Number of stored spans.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn span_count(&self) -> Result<usize, BackendError> {
        let spans = self.spans.read().map_err(|_| lock_error("count"))?;
        Ok(spans.len())
    }

    fn spans_in_window(
        &self,
        op: &'static str,
        window: &super::TimeWindow,
    ) -> Result<Vec<Span>, BackendError> {
        let spans = self.spans.read().map_err(|_| lock_error(op))?;
        Ok(spans
            .iter()
            .filter(|s| s.start_time().is_some_and(|t| window.contains(t)))
            .cloned()
            .collect())
    }
}

fn lock_error(op: &'static str) -> BackendError {
    BackendError::query(NAME, op, "failed to acquire lock on store")
}

fn web_link(op: &str, params: &[(&str, &str)]) -> String {
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    format!("memory://{op}?{}", query.join("&"))
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn search_values(
        &self,
        request: &SearchValuesRequest,
    ) -> Result<SearchValuesResponse, BackendError> {
        let spans = self.spans_in_window(operation::SEARCH_VALUES, &request.window)?;
        let raw: Vec<String> = spans
            .iter()
            .filter_map(|s| s.get(&request.attribute).and_then(value_to_string))
            .collect();

        Ok(SearchValuesResponse {
            values: request.pattern.filter_distinct(raw),
            web_link: web_link(
                operation::SEARCH_VALUES,
                &[
                    ("attribute", &request.attribute),
                    ("pattern", request.pattern.as_str()),
                ],
            ),
        })
    }

    async fn top_traces(
        &self,
        request: &TopTracesRequest,
    ) -> Result<TopTracesResponse, BackendError> {
        let spans = self.spans_in_window(operation::TOP_TRACES, &request.window)?;

        let mut order: Vec<String> = Vec::new();
        let mut by_trace: HashMap<String, Vec<&Span>> = HashMap::new();
        for span in &spans {
            let Some(trace_id) = span.trace_id() else {
                continue;
            };
            if !by_trace.contains_key(trace_id) {
                order.push(trace_id.to_string());
            }
            by_trace.entry(trace_id.to_string()).or_default().push(span);
        }

        let summaries = order
            .into_iter()
            .filter_map(|trace_id| {
                let members = by_trace.remove(&trace_id)?;
                let matching: Vec<&&Span> = members
                    .iter()
                    .filter(|s| {
                        s.get(&request.attribute).and_then(value_to_string).as_deref()
                            == Some(request.value.as_str())
                    })
                    .collect();
                if matching.is_empty() {
                    return None;
                }
                let max_ms = matching
                    .iter()
                    .filter_map(|s| s.duration_ms())
                    .fold(0.0_f64, f64::max);
                let start = members.iter().filter_map(|s| s.start_time()).min()?;
                let mut summary = TraceSummary::new(trace_id, start, max_ms / 1000.0)
                    .with_attribute("span_count", members.len());
                if let Some(service) = matching[0].get_str(keys::SERVICE_NAME) {
                    summary = summary.with_attribute(keys::SERVICE_NAME, service);
                }
                Some(summary)
            })
            .collect();

        Ok(TopTracesResponse {
            traces: rank_traces(summaries, request.limit),
            web_link: web_link(
                operation::TOP_TRACES,
                &[
                    ("attribute", &request.attribute),
                    ("value", &request.value),
                ],
            ),
        })
    }

    async fn list_spans(
        &self,
        request: &ListSpansRequest,
    ) -> Result<ListSpansResponse, BackendError> {
        let mut spans: Vec<Span> = self
            .spans_in_window(operation::LIST_SPANS, &request.window)?
            .into_iter()
            .filter(|s| s.trace_id() == Some(request.trace_id.as_str()))
            .collect();
        sort_spans_ascending(&mut spans);

        Ok(ListSpansResponse {
            spans,
            web_link: web_link(operation::LIST_SPANS, &[("trace_id", &request.trace_id)]),
        })
    }

    async fn list_logs(&self, request: &ListLogsRequest) -> Result<ListLogsResponse, BackendError> {
        let mut logs: Vec<LogEntry> = {
            let logs = self
                .logs
                .read()
                .map_err(|_| lock_error(operation::LIST_LOGS))?;
            logs.iter()
                .filter(|l| l.trace_id.as_deref() == Some(request.trace_id.as_str()))
                .filter(|l| request.window.contains(l.timestamp))
                .cloned()
                .collect()
        };
        sort_logs_descending(&mut logs);
        logs.truncate(request.limit.unwrap_or(DEFAULT_LOG_LIMIT));

        Ok(ListLogsResponse {
            logs,
            web_link: web_link(operation::LIST_LOGS, &[("trace_id", &request.trace_id)]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{TimeWindow, WildcardPattern};
    use chrono::{DateTime, Duration, Utc};

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[allow(clippy::cast_precision_loss)]
    fn span(id: &str, trace: &str, offset_ms: i64, duration_ms: f64, path: &str) -> Span {
        Span::new(id, (base().timestamp_millis() + offset_ms) as f64)
            .with_attribute(keys::TRACE_ID, trace)
            .with_attribute(keys::DURATION_MS, duration_ms)
            .with_attribute(keys::SERVICE_NAME, "api")
            .with_attribute("http.path", path)
    }

    fn window() -> TimeWindow {
        TimeWindow::new(base() - Duration::minutes(5), base() + Duration::hours(1)).unwrap()
    }

    fn backend() -> InMemoryBackend {
        InMemoryBackend::with_data(
            vec![
                span("s1", "t1", 0, 50.0, "/api/users"),
                span("s2", "t2", 10, 200.0, "/api/users"),
                span("s3", "t3", 20, 10.0, "/api/users"),
                span("s4", "t2", 5, 20.0, "/health"),
                span("s5", "t4", 30, 999.0, "/health"),
            ],
            vec![
                LogEntry::new(base(), "first").with_trace_id("t2"),
                LogEntry::new(base() + Duration::seconds(2), "second").with_trace_id("t2"),
                LogEntry::new(base() + Duration::seconds(1), "other").with_trace_id("t1"),
            ],
        )
    }

    #[tokio::test]
    async fn test_search_values_star_returns_all_distinct() {
        let response = backend()
            .search_values(&SearchValuesRequest {
                attribute: "http.path".to_string(),
                pattern: WildcardPattern::new("*"),
                window: window(),
            })
            .await
            .unwrap();

        assert_eq!(response.values, vec!["/api/users", "/health"]);
        assert!(response.web_link.starts_with("memory://search-values?"));
    }

    #[tokio::test]
    async fn test_search_values_pattern() {
        let response = backend()
            .search_values(&SearchValuesRequest {
                attribute: "http.path".to_string(),
                pattern: WildcardPattern::new("*user*"),
                window: window(),
            })
            .await
            .unwrap();

        assert_eq!(response.values, vec!["/api/users"]);
    }

    #[tokio::test]
    async fn test_top_traces_ranks_and_limits() {
        let response = backend()
            .top_traces(&TopTracesRequest {
                attribute: "http.path".to_string(),
                value: "/api/users".to_string(),
                window: window(),
                limit: 2,
            })
            .await
            .unwrap();

        let ids: Vec<&str> = response.traces.iter().map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
        assert!((response.traces[0].duration_seconds - 0.2).abs() < 1e-9);
        assert_eq!(response.traces[0].attributes["span_count"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_list_spans_ascending() {
        let response = backend()
            .list_spans(&ListSpansRequest {
                trace_id: "t2".to_string(),
                window: window(),
            })
            .await
            .unwrap();

        let ids: Vec<_> = response.spans.iter().map(|s| s.id().unwrap()).collect();
        assert_eq!(ids, vec!["s4", "s2"]);
    }

    #[tokio::test]
    async fn test_list_spans_outside_window() {
        let late = TimeWindow::new(base() + Duration::hours(2), base() + Duration::hours(3)).unwrap();

        let response = backend()
            .list_spans(&ListSpansRequest {
                trace_id: "t2".to_string(),
                window: late,
            })
            .await
            .unwrap();

        assert!(response.spans.is_empty());
    }

    #[tokio::test]
    async fn test_list_logs_descending_with_limit() {
        let backend = backend();
        let request = ListLogsRequest {
            trace_id: "t2".to_string(),
            window: window(),
            limit: None,
        };

        let response = backend.list_logs(&request).await.unwrap();
        let messages: Vec<_> = response.logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);

        let limited = backend
            .list_logs(&ListLogsRequest {
                limit: Some(1),
                ..request
            })
            .await
            .unwrap();
        assert_eq!(limited.logs.len(), 1);
        assert_eq!(limited.logs[0].message, "second");
    }

    #[test]
    fn test_insert_spans() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.span_count().unwrap(), 0);

        backend
            .insert_spans(vec![span("s1", "t1", 0, 1.0, "/")])
            .unwrap();
        backend
            .insert_logs(vec![LogEntry::new(base(), "x")])
            .unwrap();

        assert_eq!(backend.span_count().unwrap(), 1);
    }
}
