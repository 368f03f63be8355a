//! Backend adapters for observability vendors.
//!
//! The `Backend` trait defines the four queries every vendor adapter answers.
//! Adapters translate the request into the vendor's query language, decode
//! the response into the canonical model and derive a console deep link.

pub mod clickhouse;
pub mod gcp;
pub mod memory;
pub mod newrelic;

pub use self::clickhouse::ClickHouseBackend;
pub use gcp::GcpBackend;
pub use memory::InMemoryBackend;
pub use newrelic::NewRelicBackend;

use crate::config::{ClickHouseConfig, GcpConfig, NewRelicConfig};
use crate::models::{LogEntry, SearchValue, Span, TraceSummary};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while querying a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A credential or required setting was not supplied.
    #[error("{backend}: missing credential '{field}'")]
    MissingCredential {
        /// Backend name.
        backend: String,
        /// Name of the missing setting.
        field: String,
    },

    /// The time window does not start before it ends.
    #[error("Invalid time range: start {start} is not before end {end}")]
    InvalidTimeRange {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },

    /// The vendor call failed.
    #[error("{backend} {operation} failed: {message}")]
    QueryExecution {
        /// Backend name.
        backend: String,
        /// Operation that failed.
        operation: &'static str,
        /// Transport or vendor error message.
        message: String,
    },

    /// The vendor answered with a payload of unexpected shape.
    #[error("{backend} {operation}: unexpected response shape: {detail}")]
    ResponseShape {
        /// Backend name.
        backend: String,
        /// Operation that failed.
        operation: &'static str,
        /// What was missing or malformed.
        detail: String,
    },

    /// The vendor has no API for this operation.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        /// Backend name.
        backend: String,
        /// Unsupported operation.
        operation: &'static str,
    },

    /// The backend name is not known.
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}

impl BackendError {
    pub(crate) fn query(backend: &str, operation: &'static str, message: impl fmt::Display) -> Self {
        Self::QueryExecution {
            backend: backend.to_string(),
            operation,
            message: message.to_string(),
        }
    }

    pub(crate) fn shape(backend: &str, operation: &'static str, detail: impl Into<String>) -> Self {
        Self::ResponseShape {
            backend: backend.to_string(),
            operation,
            detail: detail.into(),
        }
    }

    pub(crate) fn unsupported(backend: &str, operation: &'static str) -> Self {
        Self::Unsupported {
            backend: backend.to_string(),
            operation,
        }
    }

    pub(crate) fn missing(backend: &str, field: impl Into<String>) -> Self {
        Self::MissingCredential {
            backend: backend.to_string(),
            field: field.into(),
        }
    }
}

/// Operation names used in errors and log fields.
pub mod operation {
    /// Attribute value search.
    pub const SEARCH_VALUES: &str = "search-values";
    /// Slowest traces search.
    pub const TOP_TRACES: &str = "top-traces";
    /// Spans of one trace.
    pub const LIST_SPANS: &str = "list-spans";
    /// Logs of one trace.
    pub const LIST_LOGS: &str = "list-logs";
}

/// A validated, non-empty time window.
///
/// The only way to obtain one is through [`TimeWindow::new`] or
/// [`TimeWindow::last`], both of which reject windows whose start is not
/// before their end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a time window.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidTimeRange`] if `start` is not before `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, BackendError> {
        if start >= end {
            return Err(BackendError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a window ending now and reaching `duration` into the past.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidTimeRange`] if `duration` is not positive
    /// or reaches past the earliest representable instant.
    pub fn last(duration: Duration) -> Result<Self, BackendError> {
        let end = Utc::now();
        let start = end
            .checked_sub_signed(duration)
            .ok_or(BackendError::InvalidTimeRange { start: end, end })?;
        Self::new(start, end)
    }

    /// Start of the window.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the window.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns true if `t` falls inside the window, bounds included.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    /// Expresses the window as whole minutes before `now`.
    ///
    /// Minutes are truncated, so two calls against the same window with a
    /// different `now` can yield different boundaries.
    #[must_use]
    pub fn minutes_ago(&self, now: DateTime<Utc>) -> (i64, i64) {
        (
            (now - self.start).num_minutes(),
            (now - self.end).num_minutes(),
        )
    }
}

/// A value pattern where `*` matches any run of characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern(String);

impl WildcardPattern {
    /// Wraps a raw pattern such as `*user*`.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// The raw pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts to an SQL `LIKE` pattern, keeping literal anchors.
    ///
    /// ```
    /// use shared::backend::WildcardPattern;
    ///
    /// assert_eq!(WildcardPattern::new("user*").to_like(), "user%");
    /// assert_eq!(WildcardPattern::new("*user*").to_like(), "%user%");
    /// ```
    #[must_use]
    pub fn to_like(&self) -> String {
        self.0.replace('*', "%")
    }

    /// Returns true if the pattern accepts every value.
    #[must_use]
    pub fn matches_all(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| c == '*')
    }

    /// Tests `value` against the pattern.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let parts: Vec<&str> = self.0.split('*').collect();
        if parts.len() == 1 {
            return value == self.0;
        }

        let first = parts[0];
        let last = parts[parts.len() - 1];
        let middle = &parts[1..parts.len() - 1];

        let Some(mut remaining) = value.strip_prefix(first) else {
            return false;
        };
        for part in middle {
            match remaining.find(part) {
                Some(idx) => remaining = &remaining[idx + part.len()..],
                None => return false,
            }
        }
        remaining.ends_with(last)
    }

    /// Keeps the values matching the pattern, dropping repeats while
    /// preserving first-seen order.
    #[must_use]
    pub fn filter_distinct(&self, values: Vec<SearchValue>) -> Vec<SearchValue> {
        let mut seen = HashSet::new();
        values
            .into_iter()
            .filter(|v| self.matches_all() || self.matches(v))
            .filter(|v| seen.insert(v.clone()))
            .collect()
    }
}

impl fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sorts traces by duration, slowest first, and keeps at most `limit`.
///
/// The sort is stable: equal durations keep their response order.
#[must_use]
pub fn rank_traces(mut traces: Vec<TraceSummary>, limit: usize) -> Vec<TraceSummary> {
    traces.sort_by(|a, b| b.duration_seconds.total_cmp(&a.duration_seconds));
    traces.truncate(limit);
    traces
}

/// Sorts spans by start timestamp ascending. Spans without a timestamp go last.
pub fn sort_spans_ascending(spans: &mut [Span]) {
    spans.sort_by(|a, b| match (a.timestamp_ms(), b.timestamp_ms()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Drops spans lacking an identifier or a start timestamp.
pub(crate) fn retain_valid_spans(backend: &str, spans: Vec<Span>) -> Vec<Span> {
    spans
        .into_iter()
        .filter(|span| match span.validate_span() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = backend, span_id = ?span.id(), error = %e, "Skipping span");
                false
            }
        })
        .collect()
}

/// Sorts logs newest first.
pub fn sort_logs_descending(logs: &mut [LogEntry]) {
    logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Request for distinct values of an attribute.
#[derive(Debug, Clone)]
pub struct SearchValuesRequest {
    /// Attribute name, e.g. `http.path`.
    pub attribute: String,
    /// Value pattern, e.g. `*user*`.
    pub pattern: WildcardPattern,
    /// Query window.
    pub window: TimeWindow,
}

/// Distinct attribute values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchValuesResponse {
    /// Matching values in first-seen order.
    pub values: Vec<SearchValue>,
    /// Vendor console link for the query.
    pub web_link: String,
}

/// Request for the slowest traces containing an exact attribute value.
#[derive(Debug, Clone)]
pub struct TopTracesRequest {
    /// Attribute name.
    pub attribute: String,
    /// Exact attribute value.
    pub value: String,
    /// Query window.
    pub window: TimeWindow,
    /// Maximum number of traces.
    pub limit: usize,
}

/// Slowest traces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopTracesResponse {
    /// Trace summaries, slowest first.
    pub traces: Vec<TraceSummary>,
    /// Vendor console link for the query.
    pub web_link: String,
}

/// Request for all spans of one trace.
#[derive(Debug, Clone)]
pub struct ListSpansRequest {
    /// Trace identifier.
    pub trace_id: String,
    /// Query window.
    pub window: TimeWindow,
}

/// Spans of one trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListSpansResponse {
    /// Spans ordered by start timestamp ascending.
    pub spans: Vec<Span>,
    /// Vendor console link for the trace.
    pub web_link: String,
}

/// Request for the logs correlated with one trace.
#[derive(Debug, Clone)]
pub struct ListLogsRequest {
    /// Trace identifier.
    pub trace_id: String,
    /// Query window.
    pub window: TimeWindow,
    /// Maximum number of entries; the adapter default applies when `None`.
    pub limit: Option<usize>,
}

/// Logs of one trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListLogsResponse {
    /// Log entries, newest first.
    pub logs: Vec<LogEntry>,
    /// Vendor console link for the query.
    pub web_link: String,
}

/// Default number of log entries fetched per trace.
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Trait for observability backend adapters.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short backend name used in errors and logs.
    fn name(&self) -> &str;

    /// Searches distinct values of an attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor call fails, the response is malformed
    /// or the vendor cannot search values.
    async fn search_values(
        &self,
        request: &SearchValuesRequest,
    ) -> Result<SearchValuesResponse, BackendError>;

    /// Finds the slowest traces containing an exact attribute value.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor call fails or the response is malformed.
    async fn top_traces(&self, request: &TopTracesRequest)
        -> Result<TopTracesResponse, BackendError>;

    /// Lists the spans of one trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor call fails or the response is malformed.
    async fn list_spans(&self, request: &ListSpansRequest)
        -> Result<ListSpansResponse, BackendError>;

    /// Lists the logs correlated with one trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor call fails or the response is malformed.
    async fn list_logs(&self, request: &ListLogsRequest) -> Result<ListLogsResponse, BackendError>;
}

/// Known backend vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// New Relic `NerdGraph`.
    NewRelic,
    /// Google Cloud Logging and Cloud Trace.
    Gcp,
    /// `ClickHouse` with the OpenTelemetry exporter schema.
    ClickHouse,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewRelic => write!(f, "newrelic"),
            Self::Gcp => write!(f, "gcp"),
            Self::ClickHouse => write!(f, "clickhouse"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "newrelic" | "new-relic" => Ok(Self::NewRelic),
            "gcp" | "google" => Ok(Self::Gcp),
            "clickhouse" => Ok(Self::ClickHouse),
            _ => Err(BackendError::UnknownBackend(s.to_string())),
        }
    }
}

/// Resolved configuration for one backend.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// New Relic settings.
    NewRelic(NewRelicConfig),
    /// Google Cloud settings.
    Gcp(GcpConfig),
    /// `ClickHouse` settings.
    ClickHouse(ClickHouseConfig),
}

impl BackendConfig {
    /// The vendor this configuration targets.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::NewRelic(_) => BackendKind::NewRelic,
            Self::Gcp(_) => BackendKind::Gcp,
            Self::ClickHouse(_) => BackendKind::ClickHouse,
        }
    }
}

/// Builds the adapter for a resolved configuration.
///
/// # Errors
///
/// Returns [`BackendError::MissingCredential`] if the configuration is incomplete.
pub fn build_backend(config: BackendConfig) -> Result<Box<dyn Backend>, BackendError> {
    tracing::debug!(backend = %config.kind(), "Building backend");
    Ok(match config {
        BackendConfig::NewRelic(cfg) => Box::new(NewRelicBackend::new(cfg)?),
        BackendConfig::Gcp(cfg) => Box::new(GcpBackend::new(cfg)?),
        BackendConfig::ClickHouse(cfg) => Box::new(ClickHouseBackend::new(&cfg)?),
    })
}

/// Renders a JSON scalar the way vendors display it.
pub(crate) fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
