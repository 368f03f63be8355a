//! Canonical telemetry model shared by every backend adapter.
//!
//! This module contains the data structures for spans, logs, trace summaries
//! and the combined container that travels through pipes.

pub mod combined;
pub mod log;
pub mod trace;

pub use combined::{CombinedData, SearchValue};
pub use log::LogEntry;
pub use trace::{keys, Span, SpanValidationError, TraceSummary};
