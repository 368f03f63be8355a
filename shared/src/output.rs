//! Rendering of single-stage results as table, JSON or CSV.
//!
//! Renderers write to any [`Write`] so that the CLI can target stdout and
//! tests can target a buffer.

use crate::backend::{ListLogsResponse, ListSpansResponse, SearchValuesResponse, TopTracesResponse};
use crate::models::{keys, CombinedData, Span};
use chrono::{DateTime, SecondsFormat};
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use thiserror::Error;

/// Maximum characters shown for one span attribute in table mode.
const SPAN_VALUE_WIDTH: usize = 100;

/// Maximum characters shown for one log message in table mode.
const LOG_MESSAGE_WIDTH: usize = 80;

/// Errors that can occur while rendering output.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The format name is not one of `table`, `json` or `csv`.
    #[error("Unsupported output format: {0}")]
    UnknownFormat(String),

    /// Writing to the output failed.
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failed.
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output format selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable text.
    #[default]
    Table,
    /// Indented JSON.
    Json,
    /// Comma-separated values with a header row.
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(OutputError::UnknownFormat(s.to_string())),
        }
    }
}

/// The result of one backend operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    /// Attribute values.
    Values(SearchValuesResponse),
    /// Slowest traces.
    Traces(TopTracesResponse),
    /// Spans of one trace.
    Spans(ListSpansResponse),
    /// Logs of one trace.
    Logs(ListLogsResponse),
}

impl StageResult {
    /// Vendor console link of the result.
    #[must_use]
    pub fn web_link(&self) -> &str {
        match self {
            Self::Values(r) => &r.web_link,
            Self::Traces(r) => &r.web_link,
            Self::Spans(r) => &r.web_link,
            Self::Logs(r) => &r.web_link,
        }
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Values(r) => r.values.len(),
            Self::Traces(r) => r.traces.len(),
            Self::Spans(r) => r.spans.len(),
            Self::Logs(r) => r.logs.len(),
        }
    }

    /// Returns true if the result holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves the records into the matching section of a [`CombinedData`].
    #[must_use]
    pub fn into_combined(self) -> CombinedData {
        let mut data = CombinedData::new();
        match self {
            Self::Values(r) => data.values = r.values,
            Self::Traces(r) => data.traces = r.traces,
            Self::Spans(r) => data.spans = r.spans,
            Self::Logs(r) => data.logs = r.logs,
        }
        data
    }
}

/// Renders a single-stage result in its native layout.
///
/// # Errors
///
/// Returns an error if writing or JSON encoding fails.
pub fn render(result: &StageResult, format: OutputFormat, out: &mut dyn Write) -> Result<(), OutputError> {
    match format {
        OutputFormat::Json => {
            match result {
                StageResult::Values(r) => serde_json::to_writer_pretty(&mut *out, r)?,
                StageResult::Traces(r) => serde_json::to_writer_pretty(&mut *out, r)?,
                StageResult::Spans(r) => serde_json::to_writer_pretty(&mut *out, r)?,
                StageResult::Logs(r) => serde_json::to_writer_pretty(&mut *out, r)?,
            }
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            match result {
                StageResult::Values(r) => values_csv(r, out)?,
                StageResult::Traces(r) => traces_csv(r, out)?,
                StageResult::Spans(r) => spans_csv(r, out)?,
                StageResult::Logs(r) => logs_csv(r, out)?,
            }
            if !result.web_link().is_empty() {
                tracing::info!(web_link = %result.web_link(), "View in UI");
            }
        }
        OutputFormat::Table => {
            match result {
                StageResult::Values(r) => values_table(r, out)?,
                StageResult::Traces(r) => traces_table(r, out)?,
                StageResult::Spans(r) => spans_table(r, out)?,
                StageResult::Logs(r) => logs_table(r, out)?,
            }
            if !result.web_link().is_empty() {
                writeln!(out, "\nView in UI: {}", result.web_link())?;
            }
        }
    }
    Ok(())
}

/// Renders merged data as indented JSON with all four sections.
///
/// # Errors
///
/// Returns an error if writing or JSON encoding fails.
pub fn render_combined_json(data: &CombinedData, out: &mut dyn Write) -> Result<(), OutputError> {
    serde_json::to_writer_pretty(&mut *out, data)?;
    writeln!(out)?;
    Ok(())
}

/// Renders per-section record counts of merged data.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn render_combined_table(data: &CombinedData, out: &mut dyn Write) -> Result<(), OutputError> {
    writeln!(out, "Combined telemetry data:")?;
    writeln!(out, "- Spans: {}", data.spans.len())?;
    writeln!(out, "- Logs: {}", data.logs.len())?;
    writeln!(out, "- Traces: {}", data.traces.len())?;
    writeln!(out, "- Values: {}", data.values.len())?;
    Ok(())
}

fn values_table(r: &SearchValuesResponse, out: &mut dyn Write) -> Result<(), OutputError> {
    writeln!(out, "Found {} unique values:", r.values.len())?;
    for value in &r.values {
        writeln!(out, "  {value}")?;
    }
    Ok(())
}

fn traces_table(r: &TopTracesResponse, out: &mut dyn Write) -> Result<(), OutputError> {
    writeln!(out, "Top {} traces:", r.traces.len())?;
    for (i, trace) in r.traces.iter().enumerate() {
        writeln!(
            out,
            "{}. {} ({}) - {:.3}s",
            i + 1,
            trace.trace_id,
            trace.start_time.format("%Y-%m-%d %H:%M:%S"),
            trace.duration_seconds
        )?;
    }
    Ok(())
}

fn spans_table(r: &ListSpansResponse, out: &mut dyn Write) -> Result<(), OutputError> {
    writeln!(out, "Found {} spans:\n", r.spans.len())?;
    if r.spans.is_empty() {
        writeln!(out, "No spans found.")?;
        return Ok(());
    }

    for (i, span) in r.spans.iter().enumerate() {
        writeln!(out, "=== Span {} ===", i + 1)?;

        let mut keys: Vec<&String> = span.attributes.keys().collect();
        keys.sort();
        for key in keys {
            let rendered = span_value(key, &span.attributes[key]);
            writeln!(out, "  {key:<30}: {}", truncate(&rendered, SPAN_VALUE_WIDTH))?;
        }

        if i + 1 < r.spans.len() {
            writeln!(out)?;
        }
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn span_value(key: &str, value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (key, n.as_f64()) {
            (keys::TIMESTAMP, Some(ms)) => {
                let when = DateTime::from_timestamp_millis(ms as i64)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                format!("{ms:.0} ({when})")
            }
            (keys::DURATION_MS, Some(ms)) => format!("{ms:.3} ms"),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "<nil>".to_string(),
        other => other.to_string(),
    }
}

fn logs_table(r: &ListLogsResponse, out: &mut dyn Write) -> Result<(), OutputError> {
    writeln!(out, "Found {} log entries:", r.logs.len())?;
    for log in &r.logs {
        writeln!(
            out,
            "  {}: {}",
            log.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            truncate(&log.message, LOG_MESSAGE_WIDTH)
        )?;
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max - 3).collect();
    format!("{kept}...")
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_row(out: &mut dyn Write, fields: &[&str]) -> Result<(), OutputError> {
    let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    writeln!(out, "{}", row.join(","))?;
    Ok(())
}

fn values_csv(r: &SearchValuesResponse, out: &mut dyn Write) -> Result<(), OutputError> {
    csv_row(out, &["value"])?;
    for value in &r.values {
        csv_row(out, &[value])?;
    }
    Ok(())
}

fn traces_csv(r: &TopTracesResponse, out: &mut dyn Write) -> Result<(), OutputError> {
    csv_row(out, &["trace_id", "start_time", "duration_seconds"])?;
    for trace in &r.traces {
        csv_row(
            out,
            &[
                &trace.trace_id,
                &trace.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                &format!("{:.3}", trace.duration_seconds),
            ],
        )?;
    }
    Ok(())
}

fn spans_csv(r: &ListSpansResponse, out: &mut dyn Write) -> Result<(), OutputError> {
    csv_row(
        out,
        &[
            "span_id",
            "trace_id",
            "name",
            "parent_id",
            "timestamp",
            "duration_ms",
            "service_name",
        ],
    )?;
    for span in &r.spans {
        let timestamp = span
            .start_time()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();
        let duration = span
            .duration_ms()
            .map(|d| format!("{d:.3}"))
            .unwrap_or_default();
        csv_row(
            out,
            &[
                str_attr(span, keys::ID),
                str_attr(span, keys::TRACE_ID),
                str_attr(span, keys::NAME),
                str_attr(span, keys::PARENT_ID),
                &timestamp,
                &duration,
                str_attr(span, keys::SERVICE_NAME),
            ],
        )?;
    }
    Ok(())
}

fn str_attr<'a>(span: &'a Span, key: &str) -> &'a str {
    span.get_str(key).unwrap_or_default()
}

fn logs_csv(r: &ListLogsResponse, out: &mut dyn Write) -> Result<(), OutputError> {
    csv_row(out, &["timestamp", "trace_id", "span_id", "message"])?;
    for log in &r.logs {
        csv_row(
            out,
            &[
                &log.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                log.trace_id.as_deref().unwrap_or_default(),
                log.span_id.as_deref().unwrap_or_default(),
                &log.message,
            ],
        )?;
    }
    Ok(())
}
