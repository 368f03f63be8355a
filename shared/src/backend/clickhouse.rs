//! `ClickHouse` adapter for the OpenTelemetry collector exporter schema.
//!
//! Spans are read from `otel_traces` and logs from `otel_logs` (table names
//! are configurable). Attribute names map to the dedicated columns where the
//! schema has one and to the `SpanAttributes` map otherwise.

use super::{
    operation, rank_traces, retain_valid_spans, sort_logs_descending, sort_spans_ascending,
    Backend, BackendError, ListLogsRequest, ListLogsResponse, ListSpansRequest,
    ListSpansResponse, SearchValuesRequest, SearchValuesResponse, TimeWindow, TopTracesRequest,
    TopTracesResponse, DEFAULT_LOG_LIMIT,
};
use crate::config::{validate_config, ClickHouseConfig};
use crate::models::{keys, LogEntry, Span, TraceSummary};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

const NAME: &str = "clickhouse";

/// Maximum number of distinct values returned by a value search.
const SEARCH_VALUES_LIMIT: usize = 1000;

#[derive(Debug, clickhouse::Row, serde::Deserialize)]
struct ValueRow {
    value: String,
}

#[derive(Debug, clickhouse::Row, serde::Deserialize)]
struct TraceRow {
    trace_id: String,
    start_ns: i64,
    duration_ns: i64,
    service_name: String,
    span_count: u64,
}

#[derive(Debug, clickhouse::Row, serde::Deserialize)]
struct SpanRow {
    ts: i64,
    trace_id: String,
    span_id: String,
    parent_span_id: String,
    span_name: String,
    span_kind: String,
    service_name: String,
    duration_ns: i64,
    status_code: String,
    status_message: String,
    span_attributes: HashMap<String, String>,
    resource_attributes: HashMap<String, String>,
}

#[derive(Debug, clickhouse::Row, serde::Deserialize)]
struct LogRow {
    ts: i64,
    trace_id: String,
    span_id: String,
    severity: String,
    service_name: String,
    body: String,
    attributes: HashMap<String, String>,
}

/// `ClickHouse`-backed adapter.
#[derive(Clone)]
pub struct ClickHouseBackend {
    client: Arc<::clickhouse::Client>,
    config: ClickHouseConfig,
}

impl ClickHouseBackend {
    /// Creates an adapter for the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::MissingCredential`] if the URL or database is empty.
    pub fn new(config: &ClickHouseConfig) -> Result<Self, BackendError> {
        validate_config(config).map_err(|e| BackendError::missing(NAME, e.fields()))?;

        let client = ::clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(&config.password);

        Ok(Self {
            client: Arc::new(client),
            config: config.clone(),
        })
    }

    /// Link to the HTTP interface running `sql`.
    #[must_use]
    pub fn web_link(&self, sql: &str) -> String {
        format!(
            "{}/?database={}&query={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&self.config.database),
            urlencoding::encode(sql)
        )
    }

    async fn fetch<T>(&self, op: &'static str, sql: &str) -> Result<Vec<T>, BackendError>
    where
        T: ::clickhouse::RowOwned + ::clickhouse::RowRead,
    {
        tracing::debug!(backend = NAME, operation = op, sql = %sql, "Executing query");
        self.client
            .query(sql)
            .fetch_all::<T>()
            .await
            .map_err(|e| BackendError::query(NAME, op, e))
    }
}

impl std::fmt::Debug for ClickHouseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseBackend")
            .field("url", &self.config.url)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for ClickHouseBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn search_values(
        &self,
        request: &SearchValuesRequest,
    ) -> Result<SearchValuesResponse, BackendError> {
        let sql = search_values_sql(&self.config.traces_table, request);
        let rows: Vec<ValueRow> = self.fetch(operation::SEARCH_VALUES, &sql).await?;
        let values = request
            .pattern
            .filter_distinct(rows.into_iter().map(|r| r.value).collect());

        tracing::info!(backend = NAME, count = values.len(), "Fetched attribute values");
        Ok(SearchValuesResponse {
            values,
            web_link: self.web_link(&sql),
        })
    }

    async fn top_traces(
        &self,
        request: &TopTracesRequest,
    ) -> Result<TopTracesResponse, BackendError> {
        let sql = top_traces_sql(&self.config.traces_table, request);
        let rows: Vec<TraceRow> = self.fetch(operation::TOP_TRACES, &sql).await?;
        let traces = rank_traces(rows.into_iter().map(trace_from_row).collect(), request.limit);

        tracing::info!(backend = NAME, count = traces.len(), "Fetched top traces");
        Ok(TopTracesResponse {
            traces,
            web_link: self.web_link(&sql),
        })
    }

    async fn list_spans(
        &self,
        request: &ListSpansRequest,
    ) -> Result<ListSpansResponse, BackendError> {
        let sql = spans_sql(&self.config.traces_table, &request.trace_id, &request.window);
        let rows: Vec<SpanRow> = self.fetch(operation::LIST_SPANS, &sql).await?;
        let mut spans = retain_valid_spans(NAME, rows.into_iter().map(span_from_row).collect());
        sort_spans_ascending(&mut spans);

        tracing::info!(backend = NAME, trace_id = %request.trace_id, count = spans.len(), "Fetched spans");
        Ok(ListSpansResponse {
            spans,
            web_link: self.web_link(&sql),
        })
    }

    async fn list_logs(&self, request: &ListLogsRequest) -> Result<ListLogsResponse, BackendError> {
        let limit = request.limit.unwrap_or(DEFAULT_LOG_LIMIT);
        let sql = logs_sql(
            &self.config.logs_table,
            &request.trace_id,
            &request.window,
            limit,
        );
        let rows: Vec<LogRow> = self.fetch(operation::LIST_LOGS, &sql).await?;
        let mut logs: Vec<LogEntry> = rows.into_iter().map(log_from_row).collect();
        sort_logs_descending(&mut logs);

        tracing::info!(backend = NAME, trace_id = %request.trace_id, count = logs.len(), "Fetched logs");
        Ok(ListLogsResponse {
            logs,
            web_link: self.web_link(&sql),
        })
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// Column expression holding `attribute` in the span table.
fn attribute_expr(attribute: &str) -> String {
    match attribute {
        keys::SERVICE_NAME => "ServiceName".to_string(),
        keys::NAME => "SpanName".to_string(),
        keys::TRACE_ID => "TraceId".to_string(),
        other => format!("SpanAttributes['{}']", escape(other)),
    }
}

/// Key of `attribute` in the `SpanAttributes` map, if it is not a column.
fn map_key(attribute: &str) -> Option<&str> {
    match attribute {
        keys::SERVICE_NAME | keys::NAME | keys::TRACE_ID => None,
        other => Some(other),
    }
}

fn window_clause(window: &TimeWindow) -> String {
    let nanos = |t: DateTime<chrono::Utc>| t.timestamp_nanos_opt().unwrap_or(0);
    format!(
        "Timestamp >= fromUnixTimestamp64Nano(toInt64({})) AND Timestamp <= fromUnixTimestamp64Nano(toInt64({}))",
        nanos(window.start()),
        nanos(window.end())
    )
}

pub(crate) fn search_values_sql(table: &str, request: &SearchValuesRequest) -> String {
    let expr = attribute_expr(&request.attribute);
    let mut sql = format!(
        "SELECT {expr} AS value FROM {table} WHERE {}",
        window_clause(&request.window)
    );
    if let Some(key) = map_key(&request.attribute) {
        let _ = write!(&mut sql, " AND mapContains(SpanAttributes, '{}')", escape(key));
    }
    if !request.pattern.matches_all() {
        let _ = write!(
            &mut sql,
            " AND {expr} LIKE '{}'",
            escape(&request.pattern.to_like())
        );
    }
    let _ = write!(
        &mut sql,
        " GROUP BY value ORDER BY min(Timestamp) LIMIT {SEARCH_VALUES_LIMIT}"
    );
    sql
}

pub(crate) fn top_traces_sql(table: &str, request: &TopTracesRequest) -> String {
    format!(
        "SELECT TraceId AS trace_id, toUnixTimestamp64Nano(min(Timestamp)) AS start_ns, \
         toInt64(max(Duration)) AS duration_ns, any(ServiceName) AS service_name, \
         count() AS span_count FROM {table} WHERE {} AND {} = '{}' \
         GROUP BY TraceId ORDER BY duration_ns DESC LIMIT {}",
        window_clause(&request.window),
        attribute_expr(&request.attribute),
        escape(&request.value),
        request.limit
    )
}

pub(crate) fn spans_sql(table: &str, trace_id: &str, window: &TimeWindow) -> String {
    format!(
        "SELECT toUnixTimestamp64Nano(Timestamp) AS ts, TraceId AS trace_id, SpanId AS span_id, \
         ParentSpanId AS parent_span_id, SpanName AS span_name, SpanKind AS span_kind, \
         ServiceName AS service_name, toInt64(Duration) AS duration_ns, \
         StatusCode AS status_code, StatusMessage AS status_message, \
         SpanAttributes AS span_attributes, ResourceAttributes AS resource_attributes \
         FROM {table} WHERE TraceId = '{}' AND {} ORDER BY Timestamp ASC",
        escape(trace_id),
        window_clause(window)
    )
}

pub(crate) fn logs_sql(table: &str, trace_id: &str, window: &TimeWindow, limit: usize) -> String {
    format!(
        "SELECT toUnixTimestamp64Nano(Timestamp) AS ts, TraceId AS trace_id, SpanId AS span_id, \
         SeverityText AS severity, ServiceName AS service_name, Body AS body, \
         LogAttributes AS attributes FROM {table} WHERE TraceId = '{}' AND {} \
         ORDER BY Timestamp DESC LIMIT {limit}",
        escape(trace_id),
        window_clause(window)
    )
}

#[allow(clippy::cast_precision_loss)]
fn nanos_to_millis(ns: i64) -> f64 {
    ns as f64 / 1_000_000.0
}

fn trace_from_row(row: TraceRow) -> TraceSummary {
    TraceSummary::new(
        row.trace_id,
        DateTime::from_timestamp_nanos(row.start_ns),
        nanos_to_millis(row.duration_ns) / 1000.0,
    )
    .with_attribute(keys::SERVICE_NAME, row.service_name)
    .with_attribute("span_count", row.span_count)
}

fn span_from_row(row: SpanRow) -> Span {
    let mut span = Span::new(row.span_id, nanos_to_millis(row.ts))
        .with_attribute(keys::TRACE_ID, row.trace_id)
        .with_attribute(keys::NAME, row.span_name)
        .with_attribute(keys::SERVICE_NAME, row.service_name)
        .with_attribute(keys::DURATION_MS, nanos_to_millis(row.duration_ns))
        .with_attribute("span.kind", row.span_kind)
        .with_attribute("status.code", row.status_code);

    if !row.parent_span_id.is_empty() {
        span.insert(keys::PARENT_ID, row.parent_span_id);
    }
    if !row.status_message.is_empty() {
        span.insert("status.message", row.status_message);
    }
    for (key, value) in row.span_attributes {
        span.insert(key, value);
    }
    for (key, value) in row.resource_attributes {
        if span.get(&key).is_none() {
            span.insert(key, value);
        }
    }
    span
}

fn log_from_row(row: LogRow) -> LogEntry {
    let mut log = LogEntry::new(DateTime::from_timestamp_nanos(row.ts), row.body);
    if !row.trace_id.is_empty() {
        log.trace_id = Some(row.trace_id);
    }
    if !row.span_id.is_empty() {
        log.span_id = Some(row.span_id);
    }
    log.attributes = row
        .attributes
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    if !row.severity.is_empty() {
        log.attributes
            .insert("severity".to_string(), Value::String(row.severity));
    }
    if !row.service_name.is_empty() {
        log.attributes
            .insert(keys::SERVICE_NAME.to_string(), Value::String(row.service_name));
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WildcardPattern;
    use chrono::Utc;

    fn window() -> TimeWindow {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        TimeWindow::new(start, start + chrono::Duration::hours(1)).unwrap()
    }

    #[test]
    fn test_new_requires_url() {
        let config = ClickHouseConfig {
            url: String::new(),
            ..ClickHouseConfig::default()
        };

        let result = ClickHouseBackend::new(&config);

        assert!(matches!(result, Err(BackendError::MissingCredential { .. })));
    }

    #[test]
    fn test_attribute_expr_maps_columns() {
        assert_eq!(attribute_expr("service.name"), "ServiceName");
        assert_eq!(attribute_expr("name"), "SpanName");
        assert_eq!(attribute_expr("http.route"), "SpanAttributes['http.route']");
    }

    #[test]
    fn test_search_values_sql() {
        let request = SearchValuesRequest {
            attribute: "http.route".to_string(),
            pattern: WildcardPattern::new("/api*"),
            window: window(),
        };

        let sql = search_values_sql("otel_traces", &request);

        assert!(sql.starts_with("SELECT SpanAttributes['http.route'] AS value FROM otel_traces"));
        assert!(sql.contains("AND mapContains(SpanAttributes, 'http.route') AND"));
        assert!(sql.contains("AND SpanAttributes['http.route'] LIKE '/api%'"));
        assert!(sql.contains("fromUnixTimestamp64Nano(toInt64(1704067200000000000))"));
        assert!(sql.ends_with("GROUP BY value ORDER BY min(Timestamp) LIMIT 1000"));
    }

    #[test]
    fn test_search_values_sql_star_has_no_like() {
        let request = SearchValuesRequest {
            attribute: "service.name".to_string(),
            pattern: WildcardPattern::new("*"),
            window: window(),
        };

        let sql = search_values_sql("otel_traces", &request);
        assert!(!sql.contains("LIKE"));
        assert!(!sql.contains("mapContains"));
    }

    #[test]
    fn test_search_values_sql_star_skips_spans_without_attribute() {
        let request = SearchValuesRequest {
            attribute: "http.path".to_string(),
            pattern: WildcardPattern::new("*"),
            window: window(),
        };

        let sql = search_values_sql("otel_traces", &request);

        assert!(sql.contains("AND mapContains(SpanAttributes, 'http.path') GROUP BY value"));
    }

    #[test]
    fn test_top_traces_sql_escapes_value() {
        let request = TopTracesRequest {
            attribute: "http.route".to_string(),
            value: "/o'reilly".to_string(),
            window: window(),
            limit: 3,
        };

        let sql = top_traces_sql("otel_traces", &request);

        assert!(sql.contains("SpanAttributes['http.route'] = '/o''reilly'"));
        assert!(sql.ends_with("ORDER BY duration_ns DESC LIMIT 3"));
    }

    #[test]
    fn test_logs_sql_orders_newest_first() {
        let sql = logs_sql("otel_logs", "abc", &window(), 25);

        assert!(sql.contains("FROM otel_logs WHERE TraceId = 'abc'"));
        assert!(sql.ends_with("ORDER BY Timestamp DESC LIMIT 25"));
    }

    #[test]
    fn test_span_from_row() {
        let row = SpanRow {
            ts: 1_704_067_200_000_000_000,
            trace_id: "abc".to_string(),
            span_id: "s1".to_string(),
            parent_span_id: String::new(),
            span_name: "GET /api".to_string(),
            span_kind: "Server".to_string(),
            service_name: "api".to_string(),
            duration_ns: 1_500_000,
            status_code: "Error".to_string(),
            status_message: "boom".to_string(),
            span_attributes: HashMap::from([("http.status_code".to_string(), "500".to_string())]),
            resource_attributes: HashMap::from([
                ("service.name".to_string(), "ignored".to_string()),
                ("host.name".to_string(), "node-1".to_string()),
            ]),
        };

        let span = span_from_row(row);

        assert!(span.validate_span().is_ok());
        assert_eq!(span.timestamp_ms(), Some(1_704_067_200_000.0));
        assert_eq!(span.duration_ms(), Some(1.5));
        assert_eq!(span.get_str("service.name"), Some("api"));
        assert_eq!(span.get_str("host.name"), Some("node-1"));
        assert_eq!(span.get_str("http.status_code"), Some("500"));
        assert!(span.get(keys::PARENT_ID).is_none());
    }

    #[test]
    fn test_log_from_row() {
        let row = LogRow {
            ts: 1_704_067_200_000_000_000,
            trace_id: "abc".to_string(),
            span_id: String::new(),
            severity: "ERROR".to_string(),
            service_name: "api".to_string(),
            body: "payment failed".to_string(),
            attributes: HashMap::from([("order.id".to_string(), "7".to_string())]),
        };

        let log = log_from_row(row);

        assert_eq!(log.message, "payment failed");
        assert_eq!(log.trace_id.as_deref(), Some("abc"));
        assert!(log.span_id.is_none());
        assert_eq!(log.attributes["severity"], Value::String("ERROR".to_string()));
        assert_eq!(log.attributes["order.id"], Value::String("7".to_string()));
    }

    #[test]
    fn test_trace_from_row() {
        let summary = trace_from_row(TraceRow {
            trace_id: "abc".to_string(),
            start_ns: 1_704_067_200_000_000_000,
            duration_ns: 200_000_000,
            service_name: "api".to_string(),
            span_count: 4,
        });

        assert!((summary.duration_seconds - 0.2).abs() < 1e-9);
        assert_eq!(summary.attributes["span_count"], serde_json::json!(4));
    }

    #[test]
    fn test_web_link_encodes_query() {
        let backend = ClickHouseBackend::new(&ClickHouseConfig::default()).unwrap();

        let link = backend.web_link("SELECT 1");

        assert_eq!(
            link,
            "http://localhost:8123/?database=otel&query=SELECT%201"
        );
    }
}
