//! Trace collection across backends.
//!
//! Spans come from one backend and are mandatory. Logs may come from a
//! second backend; when that source fails the trace is still returned, with
//! no logs and a warning.

use crate::backend::{Backend, BackendError, ListLogsRequest, ListSpansRequest, TimeWindow};
use crate::models::CombinedData;

/// Request for everything known about one trace.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    /// Trace identifier.
    pub trace_id: String,
    /// Query window.
    pub window: TimeWindow,
    /// Maximum number of log entries; the adapter default applies when `None`.
    pub log_limit: Option<usize>,
}

impl CollectRequest {
    /// Creates a request with the default log limit.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            trace_id: trace_id.into(),
            window,
            log_limit: None,
        }
    }

    /// Sets the log limit.
    #[must_use]
    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = Some(limit);
        self
    }
}

/// Gathers the spans and logs of one trace.
pub struct TraceCollector<'a> {
    spans: &'a dyn Backend,
    logs: Option<&'a dyn Backend>,
}

impl<'a> TraceCollector<'a> {
    /// Creates a collector reading spans from `spans`.
    #[must_use]
    pub fn new(spans: &'a dyn Backend) -> Self {
        Self { spans, logs: None }
    }

    /// Reads logs from `logs` as well.
    #[must_use]
    pub fn with_logs(mut self, logs: &'a dyn Backend) -> Self {
        self.logs = Some(logs);
        self
    }

    /// Collects the trace into a [`CombinedData`].
    ///
    /// # Errors
    ///
    /// Returns an error if the span backend fails. Log failures are logged
    /// and yield zero logs.
    pub async fn collect(&self, request: &CollectRequest) -> Result<CombinedData, BackendError> {
        let spans = self
            .spans
            .list_spans(&ListSpansRequest {
                trace_id: request.trace_id.clone(),
                window: request.window,
            })
            .await?;

        let mut data = CombinedData::new();
        data.spans = spans.spans;

        if let Some(logs) = self.logs {
            let result = logs
                .list_logs(&ListLogsRequest {
                    trace_id: request.trace_id.clone(),
                    window: request.window,
                    limit: request.log_limit,
                })
                .await;
            match result {
                Ok(response) => data.logs = response.logs,
                Err(e) => tracing::warn!(
                    backend = logs.name(),
                    trace_id = %request.trace_id,
                    error = %e,
                    "Log source failed, continuing without logs"
                ),
            }
        }

        tracing::info!(
            trace_id = %request.trace_id,
            spans = data.spans.len(),
            logs = data.logs.len(),
            "Collected trace"
        );
        Ok(data)
    }
}
