//! Analysis prompt rendering.
//!
//! Prompts are rendered deterministically from a [`CombinedData`]: a framing
//! paragraph, a data summary, the ordered list of report sections the model
//! must produce and the full payload as indented JSON.

use crate::models::{CombinedData, LogEntry, Span};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

/// Instruction block appended as the last segment of Japanese prompts.
pub const JAPANESE_INSTRUCTIONS: &str = "## Language Instructions
Please provide the analysis report in Japanese. Keep technical terms, metrics, code snippets and the section headers listed above in English.";

/// Report sections requested by a duration analysis, in order.
pub const DURATION_SECTIONS: [(&str, &str); 6] = [
    (
        "Performance Bottlenecks",
        "Identify the slowest operations and services",
    ),
    (
        "Duration Outliers",
        "Analyze span durations and identify outliers",
    ),
    ("Critical Path", "Identify the critical path through the system"),
    (
        "Resource Utilization",
        "Look for signs of resource contention or inefficiency",
    ),
    (
        "Correlation with Logs",
        "Correlate performance issues with logs and error patterns",
    ),
    (
        "Optimization Recommendations",
        "Provide specific, actionable recommendations",
    ),
];

/// Report sections requested by an error analysis, in order.
pub const ERROR_SECTIONS: [(&str, &str); 7] = [
    ("Error Summary", "Summarize the errors found and their frequency"),
    (
        "Error Patterns",
        "Group recurring errors by service, operation and message",
    ),
    (
        "Root Cause Analysis",
        "Identify the most likely root cause of each error pattern",
    ),
    (
        "Error Propagation",
        "Trace how errors propagate between spans and services",
    ),
    (
        "Impact Assessment",
        "Assess the impact on requests, users and dependent services",
    ),
    (
        "Correlation with Logs",
        "Relate span errors to the log entries around them",
    ),
    (
        "Remediation Recommendations",
        "Provide specific, actionable fixes and safeguards",
    ),
];

/// Log message substrings counted as error indicators, matched case-insensitively.
const ERROR_KEYWORDS: [&str; 5] = ["error", "exception", "fail", "fatal", "panic"];

/// Span attributes holding an HTTP status code.
const HTTP_STATUS_KEYS: [&str; 4] = [
    "http.statusCode",
    "http.status_code",
    "http.response.status_code",
    "response.status",
];

/// Span attributes holding an error message.
const ERROR_MESSAGE_KEYS: [&str; 3] = ["error.message", "errorMessage", "exception.message"];

/// Errors that can occur while building a prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    /// The analysis kind is not known.
    #[error("Unsupported analysis type: {0} (supported: duration, error)")]
    UnsupportedAnalysisKind(String),

    /// The language is not known.
    #[error("Unsupported language: {0} (supported: en, ja)")]
    UnsupportedLanguage(String),

    /// The payload could not be serialized.
    #[error("Failed to serialize telemetry data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Kind of analysis to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Performance and latency analysis.
    Duration,
    /// Error and failure analysis.
    Error,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duration => write!(f, "duration"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for AnalysisKind {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duration" => Ok(Self::Duration),
            "error" => Ok(Self::Error),
            _ => Err(PromptError::UnsupportedAnalysisKind(s.to_string())),
        }
    }
}

/// Language of the generated report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    /// English (`en`).
    #[default]
    English,
    /// Japanese (`ja`).
    Japanese,
}

impl Language {
    /// ISO 639-1 code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Japanese => "ja",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "en" => Ok(Self::English),
            "ja" => Ok(Self::Japanese),
            _ => Err(PromptError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Error indicator counts found by [`scan_errors`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorScan {
    /// Spans carrying at least one error indicator.
    pub error_spans: usize,
    /// Logs whose message contains an error keyword.
    pub error_logs: usize,
}

/// Counts spans and logs that look like errors.
///
/// A span counts when its HTTP status is at least 400, its `error` flag is
/// true or it carries a non-empty error message. A log counts when its
/// message contains one of `error`, `exception`, `fail`, `fatal` or `panic`.
#[must_use]
pub fn scan_errors(data: &CombinedData) -> ErrorScan {
    ErrorScan {
        error_spans: data.spans.iter().filter(|s| span_has_error(s)).count(),
        error_logs: data.logs.iter().filter(|l| log_has_error(l)).count(),
    }
}

fn span_has_error(span: &Span) -> bool {
    let http_error = HTTP_STATUS_KEYS
        .iter()
        .filter_map(|key| span.get(key))
        .filter_map(|value| match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .any(|status| status >= 400);

    let flagged = span.get("error").and_then(Value::as_bool).unwrap_or(false);

    let message = ERROR_MESSAGE_KEYS
        .iter()
        .filter_map(|key| span.get_str(key))
        .any(|m| !m.trim().is_empty());

    http_error || flagged || message
}

fn log_has_error(log: &LogEntry) -> bool {
    let message = log.message.to_lowercase();
    ERROR_KEYWORDS.iter().any(|k| message.contains(k))
}

/// Renders the prompt for `kind` in `language`.
///
/// # Errors
///
/// Returns [`PromptError::Serialize`] if the payload cannot be encoded.
pub fn generate_prompt(
    kind: AnalysisKind,
    data: &CombinedData,
    language: Language,
) -> Result<String, PromptError> {
    let payload = serde_json::to_string_pretty(data)?;
    let mut prompt = String::new();

    match kind {
        AnalysisKind::Duration => {
            prompt.push_str(
                "You are an expert in observability and performance analysis. \
                 Please analyze the following telemetry data for performance issues and bottlenecks.\n\n",
            );
            write_summary(&mut prompt, data, None);
            write_sections(
                &mut prompt,
                "Please provide a comprehensive performance analysis including:",
                &DURATION_SECTIONS,
            );
        }
        AnalysisKind::Error => {
            let scan = scan_errors(data);
            tracing::debug!(
                error_spans = scan.error_spans,
                error_logs = scan.error_logs,
                "Scanned data for error indicators"
            );
            prompt.push_str(
                "You are an expert in observability and incident analysis. \
                 Please analyze the following telemetry data for errors, failures and their root causes.\n\n",
            );
            write_summary(&mut prompt, data, Some(scan));
            write_sections(
                &mut prompt,
                "Please provide a comprehensive error analysis including:",
                &ERROR_SECTIONS,
            );
        }
    }

    prompt.push_str("## Output Format\n");
    prompt.push_str(
        "Please structure your response as a markdown report with clear sections and bullet points.\n\n",
    );
    prompt.push_str("## Telemetry Data\n");
    prompt.push_str(&payload);

    if language == Language::Japanese {
        prompt.push_str("\n\n");
        prompt.push_str(JAPANESE_INSTRUCTIONS);
    }

    Ok(prompt)
}

fn write_summary(prompt: &mut String, data: &CombinedData, scan: Option<ErrorScan>) {
    prompt.push_str("## Data Summary\n");
    let _ = writeln!(prompt, "- Spans: {} entries", data.spans.len());
    let _ = writeln!(prompt, "- Logs: {} entries", data.logs.len());
    let _ = writeln!(prompt, "- Traces: {} entries", data.traces.len());
    let _ = writeln!(prompt, "- Values: {} entries", data.values.len());
    if let Some(scan) = scan {
        let _ = writeln!(prompt, "- Spans with error indicators: {}", scan.error_spans);
        let _ = writeln!(prompt, "- Logs with error keywords: {}", scan.error_logs);
    }
    if let Some((earliest, latest)) = data.time_range() {
        #[allow(clippy::cast_precision_loss)]
        let seconds = (latest - earliest).num_milliseconds() as f64 / 1000.0;
        let _ = writeln!(
            prompt,
            "Time range: {} to {} (duration: {seconds:.3}s)",
            earliest.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            latest.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
    }
    prompt.push('\n');
}

fn write_sections(prompt: &mut String, lead: &str, sections: &[(&str, &str)]) {
    prompt.push_str("## Analysis Requirements\n");
    prompt.push_str(lead);
    prompt.push_str("\n\n");
    for (i, (title, description)) in sections.iter().enumerate() {
        let _ = writeln!(prompt, "{}. **{title}**: {description}", i + 1);
    }
    prompt.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{keys, TraceSummary};
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn sample() -> CombinedData {
        let mut data = CombinedData::new();
        data.spans.push(
            Span::new("s1", 1_704_067_200_000.0)
                .with_attribute(keys::DURATION_MS, 1500.0)
                .with_attribute("http.statusCode", 500),
        );
        data.spans.push(Span::new("s2", 1_704_067_200_100.0).with_attribute("error", true));
        data.spans.push(Span::new("s3", 1_704_067_200_200.0).with_attribute("http.status_code", "200"));
        data.spans
            .push(Span::new("s4", 1_704_067_200_300.0).with_attribute("error.message", "timeout"));
        data.logs.push(LogEntry::new(at("2024-01-01T00:00:01Z"), "Payment FAILED"));
        data.logs.push(LogEntry::new(at("2024-01-01T00:00:02Z"), "request ok"));
        data.logs
            .push(LogEntry::new(at("2024-01-01T00:00:03Z"), "NullPointerException thrown"));
        data
    }

    #[test]
    fn test_analysis_kind_from_str() {
        assert_eq!("duration".parse::<AnalysisKind>().unwrap(), AnalysisKind::Duration);
        assert_eq!("ERROR".parse::<AnalysisKind>().unwrap(), AnalysisKind::Error);
        assert!(matches!(
            "latency".parse::<AnalysisKind>(),
            Err(PromptError::UnsupportedAnalysisKind(k)) if k == "latency"
        ));
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("".parse::<Language>().unwrap(), Language::English);
        assert_eq!("ja".parse::<Language>().unwrap(), Language::Japanese);
        assert!(matches!(
            "fr".parse::<Language>(),
            Err(PromptError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_scan_errors() {
        let scan = scan_errors(&sample());

        assert_eq!(scan.error_spans, 3);
        assert_eq!(scan.error_logs, 2);
    }

    #[test]
    fn test_duration_prompt_sections_in_order() {
        let prompt = generate_prompt(AnalysisKind::Duration, &sample(), Language::English).unwrap();

        let positions: Vec<usize> = DURATION_SECTIONS
            .iter()
            .map(|(title, _)| prompt.find(&format!("**{title}**")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.contains("- Spans: 4 entries"));
        assert!(prompt.contains("Time range: 2024-01-01T00:00:00Z to 2024-01-01T00:00:03Z"));
        assert!(!prompt.contains("error indicators"));
    }

    #[test]
    fn test_duration_prompt_payload_is_lossless() {
        let data = sample();
        let prompt = generate_prompt(AnalysisKind::Duration, &data, Language::English).unwrap();

        let payload = prompt.split("## Telemetry Data\n").nth(1).unwrap();
        let parsed: CombinedData = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_prompt_without_time_range() {
        let mut data = CombinedData::new();
        data.values.push("/health".to_string());

        let prompt = generate_prompt(AnalysisKind::Duration, &data, Language::English).unwrap();

        assert!(!prompt.contains("Time range:"));
    }

    #[test]
    fn test_error_prompt_counts_and_sections() {
        let data = sample();
        let prompt = generate_prompt(AnalysisKind::Error, &data, Language::English).unwrap();

        assert!(prompt.contains("- Spans with error indicators: 3"));
        assert!(prompt.contains("- Logs with error keywords: 2"));
        for (title, _) in ERROR_SECTIONS {
            assert!(prompt.contains(&format!("**{title}**")), "missing {title}");
        }
        assert!(prompt.contains("request ok"));
    }

    #[test]
    fn test_error_prompt_japanese_appends_block_last() {
        let prompt = generate_prompt(AnalysisKind::Error, &sample(), Language::Japanese).unwrap();

        assert!(prompt.ends_with(JAPANESE_INSTRUCTIONS));
        assert!(prompt.contains("1. **Error Summary**"));
        assert!(prompt.contains("7. **Remediation Recommendations**"));
    }

    #[test]
    fn test_english_prompt_has_no_language_block() {
        let prompt = generate_prompt(AnalysisKind::Error, &sample(), Language::English).unwrap();

        assert!(!prompt.contains("## Language Instructions"));
    }

    #[test]
    fn test_trace_end_extends_time_range() {
        let mut data = CombinedData::new();
        data.traces
            .push(TraceSummary::new("t1", at("2024-01-01T00:00:00Z"), 2.0));

        let prompt = generate_prompt(AnalysisKind::Duration, &data, Language::English).unwrap();

        assert!(prompt.contains("(duration: 2.000s)"));
    }
}
