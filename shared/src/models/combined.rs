//! Combined telemetry container.
//!
//! `CombinedData` is the pipe wire format: every stage reads upstream data
//! into it, appends its own result and writes it back out.

use super::{LogEntry, Span, TraceSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bare attribute value returned by a value search.
pub type SearchValue = String;

/// Four independent ordered sequences of telemetry records.
///
/// All four keys are always serialized, empty sections as `[]`. Missing keys
/// deserialize as empty sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedData {
    /// Spans in insertion order.
    #[serde(default)]
    pub spans: Vec<Span>,

    /// Log entries in insertion order.
    #[serde(default)]
    pub logs: Vec<LogEntry>,

    /// Trace summaries in insertion order.
    #[serde(default)]
    pub traces: Vec<TraceSummary>,

    /// Attribute values in insertion order.
    #[serde(default)]
    pub values: Vec<SearchValue>,
}

impl CombinedData {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when no section holds any record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
            && self.logs.is_empty()
            && self.traces.is_empty()
            && self.values.is_empty()
    }

    /// Appends every section of `other` after the existing records.
    pub fn append(&mut self, other: CombinedData) {
        self.spans.extend(other.spans);
        self.logs.extend(other.logs);
        self.traces.extend(other.traces);
        self.values.extend(other.values);
    }

    /// Returns a short human readable count of the records held.
    ///
    /// ```
    /// use shared::models::CombinedData;
    ///
    /// let mut data = CombinedData::new();
    /// assert_eq!(data.summary(), "no data");
    ///
    /// data.values.push("/health".to_string());
    /// assert_eq!(data.summary(), "1 values");
    /// ```
    #[must_use]
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [
            (self.spans.len(), "spans"),
            (self.logs.len(), "logs"),
            (self.traces.len(), "traces"),
            (self.values.len(), "values"),
        ]
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect();

        if parts.is_empty() {
            "no data".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Returns the earliest and latest instants covered by the data.
    ///
    /// Spans contribute their start and end, logs their timestamp and trace
    /// summaries their start and start plus duration. Returns `None` when
    /// no record carries a usable timestamp.
    #[must_use]
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let span_times = self
            .spans
            .iter()
            .flat_map(|span| [span.start_time(), span.end_time()])
            .flatten();
        let log_times = self.logs.iter().map(|log| log.timestamp);
        let trace_times = self
            .traces
            .iter()
            .flat_map(|trace| [trace.start_time, trace.end_time()]);

        span_times
            .chain(log_times)
            .chain(trace_times)
            .fold(None, |range, t| match range {
                None => Some((t, t)),
                Some((earliest, latest)) => Some((earliest.min(t), latest.max(t))),
            })
    }
}
