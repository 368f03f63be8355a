//! Backend connection settings.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default New Relic `NerdGraph` endpoint (US region).
pub const NEW_RELIC_DEFAULT_ENDPOINT: &str = "https://api.newrelic.com/graphql";

/// Default Cloud Logging API base URL.
pub const GCP_LOGGING_DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

/// Default Cloud Trace API base URL.
pub const GCP_TRACE_DEFAULT_ENDPOINT: &str = "https://cloudtrace.googleapis.com";

/// New Relic connection settings.
///
/// # Example
///
/// ```
/// use shared::config::NewRelicConfig;
/// use validator::Validate;
///
/// let config = NewRelicConfig::new("NRAK-123", 42);
/// assert!(config.validate().is_ok());
/// assert!(NewRelicConfig::new("", 42).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewRelicConfig {
    /// User API key sent in the `API-Key` header.
    #[validate(length(min = 1, message = "New Relic API key is required"))]
    pub api_key: String,

    /// Account to run NRQL against.
    #[validate(range(min = 1, message = "New Relic account ID is required"))]
    pub account_id: i64,

    /// `NerdGraph` endpoint.
    #[validate(length(min = 1))]
    pub endpoint: String,

    /// Optional HTTP request timeout in seconds.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl NewRelicConfig {
    /// Creates settings for the default endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>, account_id: i64) -> Self {
        Self {
            api_key: api_key.into(),
            account_id,
            endpoint: NEW_RELIC_DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: None,
        }
    }

    /// Overrides the `NerdGraph` endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets an HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }
}

/// Google Cloud connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct GcpConfig {
    /// Project that owns the logs and traces.
    #[validate(length(min = 1, message = "GCP project ID is required"))]
    pub project_id: String,

    /// OAuth2 access token, e.g. from `gcloud auth print-access-token`.
    #[validate(length(min = 1, message = "GCP access token is required"))]
    pub access_token: String,

    /// Cloud Logging base URL.
    #[validate(length(min = 1))]
    pub logging_endpoint: String,

    /// Cloud Trace base URL.
    #[validate(length(min = 1))]
    pub trace_endpoint: String,

    /// Optional HTTP request timeout in seconds.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl GcpConfig {
    /// Creates settings for the public Google endpoints.
    #[must_use]
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token: access_token.into(),
            logging_endpoint: GCP_LOGGING_DEFAULT_ENDPOINT.to_string(),
            trace_endpoint: GCP_TRACE_DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: None,
        }
    }

    /// Points both APIs at one base URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.logging_endpoint.clone_from(&endpoint);
        self.trace_endpoint = endpoint;
        self
    }

    /// Sets an HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }
}

/// `ClickHouse` connection settings for the OpenTelemetry exporter schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ClickHouseConfig {
    /// HTTP interface URL (e.g., <http://localhost:8123>).
    #[validate(length(min = 1, message = "ClickHouse URL is required"))]
    pub url: String,

    /// Database name.
    #[validate(length(min = 1, message = "ClickHouse database is required"))]
    pub database: String,

    /// Username for authentication.
    pub user: String,

    /// Password for authentication.
    pub password: String,

    /// Span table name.
    #[validate(length(min = 1))]
    pub traces_table: String,

    /// Log table name.
    #[validate(length(min = 1))]
    pub logs_table: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "otel".to_string(),
            user: "default".to_string(),
            password: String::new(),
            traces_table: "otel_traces".to_string(),
            logs_table: "otel_logs".to_string(),
        }
    }
}
