//! Sightline Shared Library
//!
//! This crate contains the canonical telemetry model, the observability
//! backend adapters and the aggregation and analysis chain used by the
//! Sightline CLI.
//!
//! # Modules
//!
//! - [`models`] - Spans, logs, trace summaries and the combined pipe payload
//! - [`backend`] - Backend trait and vendor adapters (New Relic, GCP, `ClickHouse`)
//! - [`collector`] - Spans and optional logs of one trace from one or two backends
//! - [`aggregator`] - Merging of JSON documents read from a pipe
//! - [`pipeline`] - Pipe passthrough between chained invocations
//! - [`output`] - Table, JSON and CSV rendering
//! - [`prompt`] - Analysis prompt generation
//! - [`provider`] - Text generation providers
//! - [`analyzer`] - Prompt plus provider orchestration
//! - [`config`] - Typed, validated settings
//!
//! # Example
//!
//! ```
//! use shared::aggregator::aggregate;
//! use shared::prompt::{generate_prompt, AnalysisKind, Language};
//!
//! let input = br#"{"spans":[{"id":"s1","duration.ms":120.0}]}"#;
//! let data = aggregate(input).unwrap();
//! assert_eq!(data.spans.len(), 1);
//!
//! let prompt = generate_prompt(AnalysisKind::Duration, &data, Language::English).unwrap();
//! assert!(prompt.contains("## Data Summary"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregator;
pub mod analyzer;
pub mod backend;
pub mod collector;
pub mod config;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod provider;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
