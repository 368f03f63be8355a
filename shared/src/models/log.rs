//! Log data model.
//!
//! Defines the canonical `LogEntry` produced by every log backend adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A log entry representing a single log event.
///
/// # Example
///
/// ```
/// use shared::models::LogEntry;
/// use chrono::Utc;
///
/// let log = LogEntry::new(Utc::now(), "payment declined")
///     .with_trace_id("trace-abc")
///     .with_attribute("severity", "ERROR");
///
/// assert_eq!(log.trace_id.as_deref(), Some("trace-abc"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp when the log event occurred.
    pub timestamp: DateTime<Utc>,

    /// Optional trace ID for distributed tracing correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// Optional span ID for distributed tracing correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,

    /// The log message content.
    #[serde(default)]
    pub message: String,

    /// Additional key-value attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl LogEntry {
    /// Creates a new log entry.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            trace_id: None,
            span_id: None,
            message: message.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute to the log entry.
    ///
    /// # Example
    ///
    /// ```
    /// use shared::models::LogEntry;
    ///
    /// let log = LogEntry::new(chrono::Utc::now(), "Request processed")
    ///     .with_attribute("request_id", "abc-123")
    ///     .with_attribute("duration_ms", 150);
    ///
    /// assert!(log.attributes.contains_key("request_id"));
    /// ```
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.attributes.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    /// Sets the trace ID for distributed tracing correlation.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Sets the span ID for distributed tracing correlation.
    #[must_use]
    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }
}
