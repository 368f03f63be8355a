//! Pipe passthrough between chained invocations.
//!
//! A stage reads whatever the previous stage wrote to its stdin, appends its
//! own backend result and decides how to emit. Without upstream data the
//! stage result is rendered natively; with upstream data the merged
//! [`CombinedData`] is emitted so the next stage sees everything.

use crate::aggregator::{aggregate, AggregationError};
use crate::models::CombinedData;
use crate::output::{self, OutputError, OutputFormat, StageResult};
use std::io::{IsTerminal, Read, Write};
use thiserror::Error;

/// Errors that can occur in the pipe passthrough.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The format cannot represent merged data.
    #[error("Output format '{0}' is not supported for merged pipeline data")]
    UnsupportedFormat(OutputFormat),

    /// Upstream data could not be parsed.
    #[error("Failed to aggregate piped input: {0}")]
    Aggregation(#[from] AggregationError),

    /// Reading piped input failed.
    #[error("Failed to read piped input: {0}")]
    Io(#[from] std::io::Error),

    /// Rendering failed.
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Upstream data of one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Passthrough {
    upstream: CombinedData,
}

impl Passthrough {
    /// A stage with no upstream.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads upstream data from `reader` unless it is interactive.
    ///
    /// An empty stream yields no upstream data.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the input is not valid pipe JSON.
    pub fn from_reader<R: Read>(mut reader: R, interactive: bool) -> Result<Self, PipelineError> {
        if interactive {
            tracing::debug!("Input is interactive, no upstream data");
            return Ok(Self::empty());
        }

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        let upstream = aggregate(&buffer)?;

        tracing::debug!(bytes = buffer.len(), upstream = %upstream.summary(), "Read upstream data");
        Ok(Self { upstream })
    }

    /// Reads upstream data from stdin when it is redirected.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the input is not valid pipe JSON.
    pub fn from_stdin() -> Result<Self, PipelineError> {
        let stdin = std::io::stdin();
        let interactive = stdin.is_terminal();
        Self::from_reader(stdin.lock(), interactive)
    }

    /// Upstream data read so far.
    #[must_use]
    pub fn upstream(&self) -> &CombinedData {
        &self.upstream
    }

    /// Returns true if the previous stage produced any record.
    #[must_use]
    pub fn has_upstream(&self) -> bool {
        !self.upstream.is_empty()
    }

    /// Appends the stage result after the upstream records.
    #[must_use]
    pub fn merge(&self, stage: StageResult) -> CombinedData {
        let mut merged = self.upstream.clone();
        merged.append(stage.into_combined());
        merged
    }

    /// Emits the stage result, merged with upstream data when there is any.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedFormat`] for CSV with upstream
    /// data, before anything is written, or an error if rendering fails.
    pub fn emit(
        &self,
        stage: StageResult,
        format: OutputFormat,
        out: &mut dyn Write,
    ) -> Result<(), PipelineError> {
        if !self.has_upstream() {
            output::render(&stage, format, out)?;
            return Ok(());
        }

        let merged = self.merge(stage);
        match format {
            OutputFormat::Json => output::render_combined_json(&merged, out)?,
            OutputFormat::Table => output::render_combined_table(&merged, out)?,
            OutputFormat::Csv => return Err(PipelineError::UnsupportedFormat(format)),
        }
        tracing::info!(merged = %merged.summary(), "Emitted merged pipeline data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ListLogsResponse, SearchValuesResponse};
    use crate::models::LogEntry;
    use chrono::Utc;

    fn values_stage() -> StageResult {
        StageResult::Values(SearchValuesResponse {
            values: vec!["/health".to_string()],
            web_link: String::new(),
        })
    }

    #[test]
    fn test_interactive_input_is_not_read() {
        let passthrough = Passthrough::from_reader(&b"not json"[..], true).unwrap();

        assert!(!passthrough.has_upstream());
    }

    #[test]
    fn test_empty_stream_is_not_an_error() {
        let passthrough = Passthrough::from_reader(&b""[..], false).unwrap();

        assert!(!passthrough.has_upstream());
    }

    #[test]
    fn test_invalid_upstream_is_an_error() {
        let result = Passthrough::from_reader(&b"{oops"[..], false);

        assert!(matches!(result, Err(PipelineError::Aggregation(_))));
    }

    #[test]
    fn test_merge_appends_after_upstream() {
        let passthrough =
            Passthrough::from_reader(&br#"{"values":["/api/users"]}"#[..], false).unwrap();

        let merged = passthrough.merge(values_stage());

        assert_eq!(merged.values, vec!["/api/users", "/health"]);
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let passthrough =
            Passthrough::from_reader(&br#"{"values":["/health"]}"#[..], false).unwrap();

        let merged = passthrough.merge(values_stage());

        assert_eq!(merged.values, vec!["/health", "/health"]);
    }

    #[test]
    fn test_emit_native_csv_without_upstream() {
        let mut buf = Vec::new();

        Passthrough::empty()
            .emit(values_stage(), OutputFormat::Csv, &mut buf)
            .unwrap();

        assert_eq!(String::from_utf8(buf).unwrap(), "value\n/health\n");
    }

    #[test]
    fn test_emit_merged_csv_is_rejected_before_writing() {
        let passthrough = Passthrough::from_reader(&br#"{"values":["a"]}"#[..], false).unwrap();
        let mut buf = Vec::new();

        let result = passthrough.emit(values_stage(), OutputFormat::Csv, &mut buf);

        assert!(matches!(
            result,
            Err(PipelineError::UnsupportedFormat(OutputFormat::Csv))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_emit_merged_json_has_all_sections() {
        let passthrough = Passthrough::from_reader(&br#"{"values":["a"]}"#[..], false).unwrap();
        let stage = StageResult::Logs(ListLogsResponse {
            logs: vec![LogEntry::new(Utc::now(), "boom")],
            web_link: "https://example.com".to_string(),
        });
        let mut buf = Vec::new();

        passthrough
            .emit(stage, OutputFormat::Json, &mut buf)
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["values"], serde_json::json!(["a"]));
        assert_eq!(json["logs"][0]["message"], "boom");
        assert_eq!(json["spans"], serde_json::json!([]));
        assert_eq!(json["traces"], serde_json::json!([]));
        assert!(json.get("web_link").is_none());
    }

    #[test]
    fn test_emit_merged_table_counts() {
        let passthrough = Passthrough::from_reader(&br#"{"values":["a"]}"#[..], false).unwrap();
        let mut buf = Vec::new();

        passthrough
            .emit(values_stage(), OutputFormat::Table, &mut buf)
            .unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("- Values: 2"));
        assert!(text.contains("- Spans: 0"));
    }
}
