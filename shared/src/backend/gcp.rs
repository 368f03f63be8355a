//! Google Cloud adapter.
//!
//! Logs come from Cloud Logging `entries:list`, spans and trace summaries
//! from the Cloud Trace v1 REST API. Cloud Logging has no distinct-values
//! query, so value search is unsupported.

use super::{
    operation, rank_traces, retain_valid_spans, sort_logs_descending, sort_spans_ascending, Backend,
    BackendError, ListLogsRequest, ListLogsResponse, ListSpansRequest, ListSpansResponse,
    SearchValuesRequest, SearchValuesResponse, TopTracesRequest, TopTracesResponse,
    DEFAULT_LOG_LIMIT,
};
use crate::config::{validate_config, GcpConfig};
use crate::models::{keys, LogEntry, Span, TraceSummary};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const NAME: &str = "gcp";

/// One Cloud Logging entry, as returned by `entries:list`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GcpLogEntry {
    log_name: String,
    resource: Option<Value>,
    timestamp: Option<DateTime<Utc>>,
    severity: String,
    labels: BTreeMap<String, String>,
    trace: String,
    span_id: String,
    text_payload: Option<String>,
    json_payload: Option<Map<String, Value>>,
    proto_payload: Option<Map<String, Value>>,
    http_request: Option<Value>,
    source_location: Option<Value>,
    operation: Option<Value>,
    insert_id: String,
    trace_sampled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListEntriesResponse {
    entries: Vec<GcpLogEntry>,
}

/// One Cloud Trace v1 span.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TraceSpan {
    span_id: String,
    kind: Option<String>,
    name: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    parent_span_id: Option<String>,
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TraceResource {
    trace_id: String,
    spans: Vec<TraceSpan>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListTracesResponse {
    traces: Vec<TraceResource>,
}

/// Google Cloud backend adapter.
#[derive(Debug, Clone)]
pub struct GcpBackend {
    client: reqwest::Client,
    config: GcpConfig,
}

impl GcpBackend {
    /// Creates an adapter from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::MissingCredential`] if the project ID or
    /// access token is missing.
    pub fn new(config: GcpConfig) -> Result<Self, BackendError> {
        validate_config(&config).map_err(|e| BackendError::missing(NAME, e.fields()))?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::query(NAME, "connect", e))?;

        Ok(Self { client, config })
    }

    fn trace_resource(&self, trace_id: &str) -> String {
        format!("projects/{}/traces/{}", self.config.project_id, trace_id)
    }

    async fn decode<T: DeserializeOwned>(
        op: &'static str,
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::query(NAME, op, format!("HTTP {status}: {text}")));
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::shape(NAME, op, e.to_string()))
    }
}

#[async_trait]
impl Backend for GcpBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn search_values(
        &self,
        _request: &SearchValuesRequest,
    ) -> Result<SearchValuesResponse, BackendError> {
        Err(BackendError::unsupported(NAME, operation::SEARCH_VALUES))
    }

    async fn top_traces(
        &self,
        request: &TopTracesRequest,
    ) -> Result<TopTracesResponse, BackendError> {
        let op = operation::TOP_TRACES;
        let url = format!(
            "{}/v1/projects/{}/traces",
            self.config.trace_endpoint, self.config.project_id
        );
        let filter = format!("{}:{}", request.attribute, request.value);
        tracing::debug!(backend = NAME, filter = %filter, "Listing traces");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .query(&[
                ("view", "COMPLETE".to_string()),
                ("orderBy", "duration desc".to_string()),
                ("pageSize", request.limit.to_string()),
                ("startTime", rfc3339(request.window.start())),
                ("endTime", rfc3339(request.window.end())),
                ("filter", filter),
            ])
            .send()
            .await
            .map_err(|e| BackendError::query(NAME, op, e))?;

        let body: ListTracesResponse = Self::decode(op, response).await?;
        let summaries = body.traces.into_iter().filter_map(summarize_trace).collect();
        let traces = rank_traces(summaries, request.limit);

        tracing::info!(backend = NAME, count = traces.len(), "Fetched top traces");
        Ok(TopTracesResponse {
            traces,
            web_link: format!(
                "https://console.cloud.google.com/traces/list?project={}",
                self.config.project_id
            ),
        })
    }

    async fn list_spans(
        &self,
        request: &ListSpansRequest,
    ) -> Result<ListSpansResponse, BackendError> {
        let op = operation::LIST_SPANS;
        let url = format!(
            "{}/v1/projects/{}/traces/{}",
            self.config.trace_endpoint,
            self.config.project_id,
            urlencoding::encode(&request.trace_id)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| BackendError::query(NAME, op, e))?;

        let trace: TraceResource = Self::decode(op, response).await?;
        let trace_id = if trace.trace_id.is_empty() {
            request.trace_id.clone()
        } else {
            trace.trace_id
        };
        let converted = trace
            .spans
            .into_iter()
            .filter(|s| s.start_time.map_or(true, |t| request.window.contains(t)))
            .map(|s| convert_span(&trace_id, s))
            .collect();
        let mut spans = retain_valid_spans(NAME, converted);
        sort_spans_ascending(&mut spans);

        tracing::info!(backend = NAME, trace_id = %request.trace_id, count = spans.len(), "Fetched spans");
        Ok(ListSpansResponse {
            spans,
            web_link: format!(
                "https://console.cloud.google.com/traces/list?tid={}&project={}",
                urlencoding::encode(&request.trace_id),
                self.config.project_id
            ),
        })
    }

    async fn list_logs(&self, request: &ListLogsRequest) -> Result<ListLogsResponse, BackendError> {
        let op = operation::LIST_LOGS;
        let trace_filter = format!("trace=\"{}\"", self.trace_resource(&request.trace_id));
        let filter = format!(
            "{trace_filter} AND timestamp>=\"{}\" AND timestamp<=\"{}\"",
            rfc3339(request.window.start()),
            rfc3339(request.window.end()),
        );
        let body = json!({
            "resourceNames": [format!("projects/{}", self.config.project_id)],
            "filter": filter,
            "orderBy": "timestamp desc",
            "pageSize": request.limit.unwrap_or(DEFAULT_LOG_LIMIT),
        });
        tracing::debug!(backend = NAME, filter = %filter, "Listing log entries");

        let response = self
            .client
            .post(format!("{}/v2/entries:list", self.config.logging_endpoint))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::query(NAME, op, e))?;

        let listed: ListEntriesResponse = Self::decode(op, response).await?;
        let mut logs: Vec<LogEntry> = listed.entries.into_iter().filter_map(convert_log).collect();
        sort_logs_descending(&mut logs);

        tracing::info!(backend = NAME, trace_id = %request.trace_id, count = logs.len(), "Fetched logs");
        Ok(ListLogsResponse {
            logs,
            web_link: format!(
                "https://console.cloud.google.com/logs/query;query={}?project={}",
                urlencoding::encode(&trace_filter),
                self.config.project_id
            ),
        })
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Extracts the bare trace ID from a `projects/<p>/traces/<id>` resource.
///
/// Values that are not resource paths are returned unchanged.
#[must_use]
pub fn extract_trace_id(resource: &str) -> &str {
    let parts: Vec<&str> = resource.split('/').collect();
    if parts.len() >= 4 && parts[0] == "projects" && parts[2] == "traces" {
        parts[3]
    } else {
        resource
    }
}

fn millis(t: DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let ms = t.timestamp_micros() as f64 / 1000.0;
    ms
}

fn convert_span(trace_id: &str, span: TraceSpan) -> Span {
    let mut out = Span::default()
        .with_attribute(keys::ID, span.span_id)
        .with_attribute(keys::TRACE_ID, trace_id)
        .with_attribute(keys::NAME, span.name);

    if let Some(start) = span.start_time {
        out.insert(keys::TIMESTAMP, millis(start));
        if let Some(end) = span.end_time {
            out.insert(keys::DURATION_MS, millis(end) - millis(start));
        }
    }
    if let Some(parent) = span.parent_span_id.filter(|p| !p.is_empty() && p != "0") {
        out.insert(keys::PARENT_ID, parent);
    }
    if let Some(kind) = span.kind {
        out.insert("span.kind", kind);
    }
    for (key, value) in span.labels {
        out.insert(key, value);
    }
    out
}

fn summarize_trace(trace: TraceResource) -> Option<TraceSummary> {
    let start = trace.spans.iter().filter_map(|s| s.start_time).min()?;
    let end = trace
        .spans
        .iter()
        .filter_map(|s| s.end_time)
        .max()
        .unwrap_or(start);
    let duration_seconds = (millis(end) - millis(start)) / 1000.0;

    let mut summary = TraceSummary::new(trace.trace_id, start, duration_seconds)
        .with_attribute("span_count", trace.spans.len());
    let root = trace
        .spans
        .iter()
        .find(|s| s.parent_span_id.as_deref().map_or(true, |p| p.is_empty() || p == "0"))
        .or_else(|| trace.spans.first());
    if let Some(root) = root {
        summary = summary.with_attribute("root_span", root.name.clone());
    }
    Some(summary)
}

fn convert_log(entry: GcpLogEntry) -> Option<LogEntry> {
    let Some(timestamp) = entry.timestamp else {
        tracing::warn!(backend = NAME, "Skipping log entry without timestamp");
        return None;
    };

    let mut attributes = BTreeMap::new();
    let message = if let Some(text) = entry.text_payload.filter(|t| !t.is_empty()) {
        text
    } else if let Some(payload) = entry.json_payload {
        let message = payload
            .get("message")
            .or_else(|| payload.get("msg"))
            .and_then(Value::as_str)
            .map_or_else(|| format!("JSON: {}", Value::Object(payload.clone())), str::to_string);
        for (key, value) in payload {
            if key != "message" && key != "msg" {
                attributes.insert(key, value);
            }
        }
        message
    } else if let Some(payload) = entry.proto_payload {
        let message = format!("Proto: {}", Value::Object(payload.clone()));
        attributes.extend(payload);
        message
    } else {
        String::new()
    };

    if !entry.severity.is_empty() {
        attributes.insert("severity".to_string(), Value::String(entry.severity));
    }
    if !entry.log_name.is_empty() {
        attributes.insert("log_name".to_string(), Value::String(entry.log_name));
    }
    if let Some(resource) = entry.resource {
        attributes.insert("resource".to_string(), resource);
    }
    for (key, value) in entry.labels {
        attributes.insert(format!("label_{key}"), Value::String(value));
    }
    if let Some(http_request) = entry.http_request {
        attributes.insert("http_request".to_string(), http_request);
    }
    if let Some(location) = entry.source_location {
        attributes.insert("source_location".to_string(), location);
    }
    if let Some(operation) = entry.operation {
        attributes.insert("operation".to_string(), operation);
    }
    if !entry.insert_id.is_empty() {
        attributes.insert("insert_id".to_string(), Value::String(entry.insert_id));
    }
    if entry.trace_sampled {
        attributes.insert("trace_sampled".to_string(), Value::Bool(true));
    }

    let mut log = LogEntry::new(timestamp, message);
    if !entry.trace.is_empty() {
        log.trace_id = Some(extract_trace_id(&entry.trace).to_string());
    }
    if !entry.span_id.is_empty() {
        log.span_id = Some(entry.span_id);
    }
    log.attributes = attributes;
    Some(log)
}
