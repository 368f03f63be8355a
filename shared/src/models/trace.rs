//! Span and trace summary data models.
//!
//! A [`Span`] is an open attribute map: vendors attach whatever keys they
//! like, and adapters only guarantee an identifier and a start timestamp.
//! A [`TraceSummary`] is the typed row returned by top-traces searches.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Canonical span attribute keys written by every backend adapter.
pub mod keys {
    /// Span identifier.
    pub const ID: &str = "id";
    /// Identifier of the trace the span belongs to.
    pub const TRACE_ID: &str = "trace.id";
    /// Identifier of the parent span, absent for root spans.
    pub const PARENT_ID: &str = "parent.id";
    /// Operation name.
    pub const NAME: &str = "name";
    /// Service that produced the span.
    pub const SERVICE_NAME: &str = "service.name";
    /// Start timestamp in epoch milliseconds.
    pub const TIMESTAMP: &str = "timestamp";
    /// Duration in milliseconds.
    pub const DURATION_MS: &str = "duration.ms";
}

/// A span representing one unit of work in a distributed trace.
///
/// Serializes as a flat JSON object so that vendor keys survive a pipe
/// round trip unchanged.
///
/// # Example
///
/// ```
/// use shared::models::Span;
///
/// let span = Span::new("span-1", 1_700_000_000_000.0)
///     .with_attribute("trace.id", "trace-1")
///     .with_attribute("http.statusCode", 200);
///
/// assert_eq!(span.id(), Some("span-1"));
/// assert!(span.validate_span().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Span {
    /// All span attributes, keyed by vendor or canonical attribute name.
    pub attributes: Map<String, Value>,
}

/// Errors that can occur during span validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpanValidationError {
    /// The span has no `id` attribute.
    #[error("Span is missing an identifier")]
    MissingId,

    /// The span has no usable `timestamp` attribute.
    #[error("Span is missing a start timestamp")]
    MissingTimestamp,
}

impl Span {
    /// Creates a span with an identifier and a start timestamp in epoch milliseconds.
    #[must_use]
    pub fn new(id: impl Into<String>, timestamp_ms: f64) -> Self {
        Self::default()
            .with_attribute(keys::ID, id.into())
            .with_attribute(keys::TIMESTAMP, timestamp_ms)
    }

    /// Wraps an existing attribute map.
    #[must_use]
    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    /// Adds an attribute to the span.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts an attribute, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        self.attributes.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
    }

    /// Returns the raw value of an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns a string attribute.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns the span identifier.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.get_str(keys::ID)
    }

    /// Returns the trace identifier.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.get_str(keys::TRACE_ID)
    }

    /// Returns the operation name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get_str(keys::NAME)
    }

    /// Returns the start timestamp in epoch milliseconds.
    ///
    /// Accepts numeric values as well as RFC3339 strings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn timestamp_ms(&self) -> Option<f64> {
        match self.get(keys::TIMESTAMP)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.timestamp_millis() as f64),
            _ => None,
        }
    }

    /// Returns the start time of the span.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp_ms()
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        self.get(keys::DURATION_MS).and_then(Value::as_f64)
    }

    /// Returns the end time of the span (start plus duration).
    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        let start = self.start_time()?;
        #[allow(clippy::cast_possible_truncation)]
        let duration = Duration::microseconds((self.duration_ms()? * 1000.0) as i64);
        Some(start + duration)
    }

    /// Validates that the span carries the attributes every adapter guarantees.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier or the start timestamp is missing.
    pub fn validate_span(&self) -> Result<(), SpanValidationError> {
        if self.id().map_or(true, str::is_empty) {
            return Err(SpanValidationError::MissingId);
        }
        if self.timestamp_ms().is_none() {
            return Err(SpanValidationError::MissingTimestamp);
        }
        Ok(())
    }
}

/// Summary of one trace returned by a top-traces search.
///
/// The duration unit is seconds, as the serialized field name states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// The trace ID.
    pub trace_id: String,

    /// Time the earliest span of the trace started.
    pub start_time: DateTime<Utc>,

    /// Trace duration in seconds.
    pub duration_seconds: f64,

    /// Additional attributes such as service name or span count.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl TraceSummary {
    /// Creates a new trace summary.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, start_time: DateTime<Utc>, duration_seconds: f64) -> Self {
        Self {
            trace_id: trace_id.into(),
            start_time,
            duration_seconds,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute to the summary.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.attributes.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    /// Returns the time the trace ended.
    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        #[allow(clippy::cast_possible_truncation)]
        let micros = (self.duration_seconds * 1_000_000.0) as i64;
        self.start_time + Duration::microseconds(micros)
    }
}
