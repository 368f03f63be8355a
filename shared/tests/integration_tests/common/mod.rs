//! Common test utilities and helpers for integration tests.
//!
//! Provides a seeded in-memory backend and helpers that run one pipeline
//! stage against an in-memory stdin and stdout.

use chrono::{DateTime, Duration, Utc};
use shared::backend::{InMemoryBackend, TimeWindow};
use shared::models::{keys, LogEntry, Span};
use shared::output::{OutputFormat, StageResult};
use shared::pipeline::{Passthrough, PipelineError};

/// Parses an RFC 3339 instant.
pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// The hour all seeded records fall into.
pub fn window() -> TimeWindow {
    TimeWindow::new(at("2024-01-01T00:00:00Z"), at("2024-01-01T01:00:00Z")).unwrap()
}

fn span(id: &str, trace_id: &str, minute: u32, duration_ms: f64) -> Span {
    let start = at("2024-01-01T00:00:00Z") + Duration::minutes(i64::from(minute));
    #[allow(clippy::cast_precision_loss)]
    let ts = start.timestamp_millis() as f64;
    Span::new(id, ts)
        .with_attribute(keys::TRACE_ID, trace_id)
        .with_attribute(keys::DURATION_MS, duration_ms)
}

/// Three checkout traces of 50, 200 and 10 ms plus one health check.
pub fn seeded_backend() -> InMemoryBackend {
    let spans = vec![
        span("a1", "trace-a", 1, 50.0)
            .with_attribute("http.path", "/api/users")
            .with_attribute(keys::NAME, "GET /api/users")
            .with_attribute(keys::SERVICE_NAME, "checkout"),
        span("b1", "trace-b", 2, 200.0)
            .with_attribute("http.path", "/api/users")
            .with_attribute(keys::NAME, "GET /api/users")
            .with_attribute(keys::SERVICE_NAME, "checkout"),
        span("b2", "trace-b", 3, 150.0)
            .with_attribute(keys::PARENT_ID, "b1")
            .with_attribute(keys::NAME, "SELECT users")
            .with_attribute("error", true),
        span("c1", "trace-c", 4, 10.0)
            .with_attribute("http.path", "/api/users")
            .with_attribute(keys::SERVICE_NAME, "checkout"),
        span("h1", "trace-h", 5, 1.0).with_attribute("http.path", "/health"),
    ];
    let logs = vec![
        LogEntry::new(at("2024-01-01T00:03:00Z"), "query failed: connection pool exhausted")
            .with_trace_id("trace-b")
            .with_span_id("b2")
            .with_attribute("severity", "ERROR"),
        LogEntry::new(at("2024-01-01T00:02:00Z"), "request received").with_trace_id("trace-b"),
    ];
    InMemoryBackend::with_data(spans, logs)
}

/// Runs one stage: reads `stdin`, emits `stage` and returns what was written.
pub fn run_stage(
    stdin: &[u8],
    stage: StageResult,
    format: OutputFormat,
) -> Result<String, PipelineError> {
    let passthrough = Passthrough::from_reader(stdin, false)?;
    let mut out = Vec::new();
    passthrough.emit(stage, format, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}
