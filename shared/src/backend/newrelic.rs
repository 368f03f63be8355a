//! New Relic adapter.
//!
//! Runs NRQL through the `NerdGraph` GraphQL endpoint. Time windows are sent
//! as "N minutes ago" relative to the wall clock at call time.

use super::{
    operation, rank_traces, retain_valid_spans, sort_logs_descending, sort_spans_ascending,
    value_to_string, Backend, BackendError, ListLogsRequest, ListLogsResponse, ListSpansRequest,
    ListSpansResponse, SearchValuesRequest, SearchValuesResponse, TimeWindow, TopTracesRequest,
    TopTracesResponse, DEFAULT_LOG_LIMIT,
};
use crate::config::{validate_config, NewRelicConfig};
use crate::models::{LogEntry, Span, TraceSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;

const NAME: &str = "newrelic";

const NRQL_GRAPHQL: &str = "query($accountId: Int!, $nrqlQuery: Nrql!) { actor { account(id: $accountId) { nrql(query: $nrqlQuery, timeout: 30) { results } } } }";

/// Log attributes lifted into typed `LogEntry` fields.
const LOG_RESERVED_KEYS: [&str; 5] = ["timestamp", "message", "trace.id", "span.id", "traceId"];

/// New Relic backend adapter.
#[derive(Debug, Clone)]
pub struct NewRelicBackend {
    client: reqwest::Client,
    config: NewRelicConfig,
}

impl NewRelicBackend {
    /// Creates an adapter from validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::MissingCredential`] if the API key or account
    /// ID is missing, or [`BackendError::QueryExecution`] if the HTTP client
    /// cannot be built.
    pub fn new(config: NewRelicConfig) -> Result<Self, BackendError> {
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

    /// Console link showing the result of `nrql`.
    #[must_use]
    pub fn web_link(&self, nrql: &str) -> String {
        let filters = json!({ "query": nrql }).to_string();
        format!(
            "https://one.newrelic.com/nr1-core?account={}&filters={}",
            self.config.account_id,
            urlencoding::encode(&filters)
        )
    }

    async fn run_nrql(
        &self,
        op: &'static str,
        nrql: &str,
    ) -> Result<Vec<Map<String, Value>>, BackendError> {
        tracing::debug!(backend = NAME, operation = op, nrql = %nrql, "Executing NRQL query");

        let body = json!({
            "query": NRQL_GRAPHQL,
            "variables": {
                "accountId": self.config.account_id,
                "nrqlQuery": nrql,
            }
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("API-Key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::query(NAME, op, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::query(
                NAME,
                op,
                format!("HTTP {status}: {text}"),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| BackendError::shape(NAME, op, e.to_string()))?;

        parse_results(&payload).map_err(|failure| match failure {
            ResultsFailure::GraphQl(message) => BackendError::query(NAME, op, message),
            ResultsFailure::Shape(detail) => BackendError::shape(NAME, op, detail),
        })
    }
}

#[async_trait]
impl Backend for NewRelicBackend {
    fn name(&self) -> &str {
        NAME
    }

    async fn search_values(
        &self,
        request: &SearchValuesRequest,
    ) -> Result<SearchValuesResponse, BackendError> {
        let nrql = search_values_nrql(request, Utc::now());
        let results = self.run_nrql(operation::SEARCH_VALUES, &nrql).await?;
        let values = request
            .pattern
            .filter_distinct(parse_unique_values(&results, &request.attribute));

        tracing::info!(backend = NAME, count = values.len(), "Fetched attribute values");
        Ok(SearchValuesResponse {
            values,
            web_link: self.web_link(&nrql),
        })
    }

    async fn top_traces(
        &self,
        request: &TopTracesRequest,
    ) -> Result<TopTracesResponse, BackendError> {
        let nrql = top_traces_nrql(request, Utc::now());
        let results = self.run_nrql(operation::TOP_TRACES, &nrql).await?;
        let traces = rank_traces(
            parse_trace_summaries(&results, request.window.start()),
            request.limit,
        );

        tracing::info!(backend = NAME, count = traces.len(), "Fetched top traces");
        Ok(TopTracesResponse {
            traces,
            web_link: self.web_link(&nrql),
        })
    }

    async fn list_spans(
        &self,
        request: &ListSpansRequest,
    ) -> Result<ListSpansResponse, BackendError> {
        let nrql = spans_nrql(&request.trace_id, &request.window, Utc::now());
        let results = self.run_nrql(operation::LIST_SPANS, &nrql).await?;
        let mut spans = retain_valid_spans(
            NAME,
            results.into_iter().map(Span::from_attributes).collect(),
        );
        sort_spans_ascending(&mut spans);

        tracing::info!(backend = NAME, trace_id = %request.trace_id, count = spans.len(), "Fetched spans");
        Ok(ListSpansResponse {
            spans,
            web_link: self.web_link(&nrql),
        })
    }

    async fn list_logs(&self, request: &ListLogsRequest) -> Result<ListLogsResponse, BackendError> {
        let limit = request.limit.unwrap_or(DEFAULT_LOG_LIMIT);
        let nrql = logs_nrql(&request.trace_id, &request.window, limit, Utc::now());
        let results = self.run_nrql(operation::LIST_LOGS, &nrql).await?;
        let mut logs: Vec<LogEntry> = results.iter().filter_map(parse_log).collect();
        sort_logs_descending(&mut logs);

        tracing::info!(backend = NAME, trace_id = %request.trace_id, count = logs.len(), "Fetched logs");
        Ok(ListLogsResponse {
            logs,
            web_link: self.web_link(&nrql),
        })
    }
}

/// Escapes a literal for use inside single quotes in NRQL.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn since_until(window: &TimeWindow, now: DateTime<Utc>) -> String {
    let (since, until) = window.minutes_ago(now);
    format!("SINCE {since} minutes ago UNTIL {until} minutes ago")
}

pub(crate) fn search_values_nrql(request: &SearchValuesRequest, now: DateTime<Utc>) -> String {
    format!(
        "SELECT uniques({attr}) FROM Span WHERE {attr} LIKE '{like}' {range}",
        attr = request.attribute,
        like = quote(&request.pattern.to_like()),
        range = since_until(&request.window, now),
    )
}

pub(crate) fn top_traces_nrql(request: &TopTracesRequest, now: DateTime<Utc>) -> String {
    format!(
        "SELECT max(duration.ms) as maxDuration, earliest(service.name) as serviceName, \
         count(*) as spanCount, earliest(timestamp) as startTime FROM Span \
         WHERE {attr} = '{value}' {range} FACET trace.id ORDER BY maxDuration DESC LIMIT {limit}",
        attr = request.attribute,
        value = quote(&request.value),
        range = since_until(&request.window, now),
        limit = request.limit,
    )
}

pub(crate) fn spans_nrql(trace_id: &str, window: &TimeWindow, now: DateTime<Utc>) -> String {
    format!(
        "SELECT * FROM Span WHERE trace.id = '{}' {} ORDER BY timestamp ASC LIMIT MAX",
        quote(trace_id),
        since_until(window, now),
    )
}

pub(crate) fn logs_nrql(
    trace_id: &str,
    window: &TimeWindow,
    limit: usize,
    now: DateTime<Utc>,
) -> String {
    format!(
        "SELECT * FROM Log WHERE trace.id = '{}' {} ORDER BY timestamp DESC LIMIT {limit}",
        quote(trace_id),
        since_until(window, now),
    )
}

enum ResultsFailure {
    GraphQl(String),
    Shape(String),
}

/// Extracts `data.actor.account.nrql.results` from a `NerdGraph` payload.
fn parse_results(payload: &Value) -> Result<Vec<Map<String, Value>>, ResultsFailure> {
    if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
        if let Some(first) = errors.first() {
            let message = first
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown GraphQL error");
            return Err(ResultsFailure::GraphQl(message.to_string()));
        }
    }

    let mut node = payload;
    for key in ["data", "actor", "account", "nrql", "results"] {
        node = node
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ResultsFailure::Shape(format!("{key} not found in response")))?;
    }

    let results = node
        .as_array()
        .ok_or_else(|| ResultsFailure::Shape("results is not an array".to_string()))?;

    Ok(results
        .iter()
        .filter_map(|r| r.as_object().cloned())
        .collect())
}

fn parse_unique_values(results: &[Map<String, Value>], attribute: &str) -> Vec<String> {
    let key = format!("uniques.{attribute}");
    results
        .iter()
        .filter_map(|row| row.get(&key).and_then(Value::as_array))
        .flatten()
        .filter_map(value_to_string)
        .collect()
}

fn facet_trace_id(row: &Map<String, Value>) -> Option<String> {
    let from_facet = match row.get("facet") {
        Some(Value::Array(items)) => items.first().and_then(value_to_string),
        Some(other) => value_to_string(other),
        None => None,
    };
    from_facet
        .or_else(|| row.get("trace.id").and_then(value_to_string))
        .or_else(|| row.get("traceId").and_then(value_to_string))
        .filter(|id| !id.is_empty())
}

#[allow(clippy::cast_possible_truncation)]
fn parse_trace_summaries(
    results: &[Map<String, Value>],
    fallback_start: DateTime<Utc>,
) -> Vec<TraceSummary> {
    results
        .iter()
        .filter_map(|row| {
            let trace_id = facet_trace_id(row)?;
            let duration_ms = row.get("maxDuration").and_then(Value::as_f64).unwrap_or(0.0);
            let start_time = row
                .get("startTime")
                .and_then(Value::as_f64)
                .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
                .unwrap_or(fallback_start);

            let mut summary = TraceSummary::new(trace_id, start_time, duration_ms / 1000.0);
            if let Some(service) = row.get("serviceName").and_then(value_to_string) {
                summary = summary.with_attribute("service.name", service);
            }
            if let Some(count) = row.get("spanCount").and_then(Value::as_u64) {
                summary = summary.with_attribute("span_count", count);
            }
            Some(summary)
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn parse_log(row: &Map<String, Value>) -> Option<LogEntry> {
    let Some(timestamp) = row
        .get("timestamp")
        .and_then(Value::as_f64)
        .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
    else {
        tracing::warn!(backend = NAME, "Skipping log record without timestamp");
        return None;
    };

    let message = row
        .get("message")
        .and_then(value_to_string)
        .unwrap_or_default();
    let mut entry = LogEntry::new(timestamp, message);
    entry.trace_id = row
        .get("trace.id")
        .or_else(|| row.get("traceId"))
        .and_then(value_to_string);
    entry.span_id = row.get("span.id").and_then(value_to_string);
    entry.attributes = row
        .iter()
        .filter(|(k, _)| !LOG_RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some(entry)
}
