//! Parsing of piped JSON into [`CombinedData`].
//!
//! Input is either one JSON object (possibly pretty-printed) or
//! newline-delimited JSON with one object per line. Every object may carry
//! any subset of the `spans`, `logs`, `traces` and `values` sections.
//!
//! # Example
//!
//! ```
//! use shared::aggregator::aggregate;
//!
//! let input = br#"{"spans":[{"id":"s1"}]}
//! {"logs":[{"timestamp":"2024-01-01T00:00:00Z","message":"boom"}]}"#;
//!
//! let data = aggregate(input).unwrap();
//! assert_eq!(data.summary(), "1 spans, 1 logs");
//! ```

use crate::models::{CombinedData, LogEntry, SearchValue, Span, TraceSummary};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while aggregating piped input.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// A document could not be decoded.
    #[error("Failed to parse input at line {line}: {source}")]
    Parse {
        /// 1-based line number of the failing document.
        line: usize,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

/// One pipe document. Absent and `null` sections are both empty.
#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    spans: Option<Vec<Span>>,
    #[serde(default)]
    logs: Option<Vec<LogEntry>>,
    #[serde(default)]
    traces: Option<Vec<TraceSummary>>,
    #[serde(default)]
    values: Option<Vec<SearchValue>>,
}

impl Document {
    fn merge_into(self, data: &mut CombinedData) {
        data.append(CombinedData {
            spans: self.spans.unwrap_or_default(),
            logs: self.logs.unwrap_or_default(),
            traces: self.traces.unwrap_or_default(),
            values: self.values.unwrap_or_default(),
        });
    }
}

/// Parses `input` into a fresh [`CombinedData`].
///
/// # Errors
///
/// Returns [`AggregationError::Parse`] if any document fails to decode.
pub fn aggregate(input: &[u8]) -> Result<CombinedData, AggregationError> {
    let mut data = CombinedData::new();
    aggregate_into(&mut data, input)?;
    Ok(data)
}

/// Parses `input` and appends every document to `data` in input order.
///
/// On error `data` is left untouched.
///
/// # Errors
///
/// Returns [`AggregationError::Parse`] if any document fails to decode.
pub fn aggregate_into(data: &mut CombinedData, input: &[u8]) -> Result<(), AggregationError> {
    if is_blank(input) {
        return Ok(());
    }

    if let Ok(document) = serde_json::from_slice::<Document>(input) {
        tracing::debug!("Parsed input as a single JSON document");
        document.merge_into(data);
        return Ok(());
    }

    let mut parsed = CombinedData::new();
    let mut documents = 0usize;
    for (idx, line) in input.split(|b| *b == b'\n').enumerate() {
        if is_blank(line) {
            continue;
        }
        let document: Document = serde_json::from_slice(line)
            .map_err(|source| AggregationError::Parse {
                line: idx + 1,
                source,
            })?;
        document.merge_into(&mut parsed);
        documents += 1;
    }

    tracing::debug!(documents, "Parsed input as newline-delimited JSON");
    data.append(parsed);
    Ok(())
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}
