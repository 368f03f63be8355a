//! Credential and provider settings.
//!
//! Every setting can be given as a flag or through the environment (a `.env`
//! file is loaded first). Missing values are left empty and reported by the
//! shared library as a missing credential when the adapter is built.

use clap::{Args, ValueEnum};
use shared::backend::{BackendConfig, BackendKind};
use shared::config::{
    ClickHouseConfig, GcpConfig, GeminiConfig, NewRelicConfig, OllamaConfig, ProviderConfig,
    VertexAiConfig,
};

/// New Relic credentials.
#[derive(Debug, Clone, Args)]
pub struct NewRelicArgs {
    /// User API key
    #[arg(
        long = "newrelic-api-key",
        env = "NEW_RELIC_API_KEY",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true,
    )]
    pub api_key: String,

    /// Account ID
    #[arg(
        long = "newrelic-account-id",
        env = "NEW_RELIC_ACCOUNT_ID",
        default_value_t = 0,
        hide_default_value = true,
    )]
    pub account_id: i64,

    /// `NerdGraph` endpoint override
    #[arg(id = "newrelic_endpoint", long = "newrelic-endpoint", env = "NEW_RELIC_ENDPOINT")]
    pub endpoint: Option<String>,
}

impl NewRelicArgs {
    /// Builds the backend settings.
    #[must_use]
    pub fn config(&self) -> NewRelicConfig {
        let config = NewRelicConfig::new(&self.api_key, self.account_id);
        match &self.endpoint {
            Some(endpoint) => config.with_endpoint(endpoint),
            None => config,
        }
    }
}

/// Google Cloud credentials.
#[derive(Debug, Clone, Args)]
pub struct GcpArgs {
    /// Project ID
    #[arg(
        long = "gcp-project-id",
        env = "GCP_PROJECT_ID",
        default_value = "",
        hide_default_value = true,
    )]
    pub project_id: String,

    /// OAuth2 access token, e.g. from `gcloud auth print-access-token`
    #[arg(
        long = "gcp-access-token",
        env = "GCP_ACCESS_TOKEN",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true,
    )]
    pub access_token: String,

    /// Endpoint override for both Cloud Logging and Cloud Trace
    #[arg(id = "gcp_endpoint", long = "gcp-endpoint", env = "GCP_ENDPOINT")]
    pub endpoint: Option<String>,
}

impl GcpArgs {
    /// Builds the backend settings.
    #[must_use]
    pub fn config(&self) -> GcpConfig {
        let config = GcpConfig::new(&self.project_id, &self.access_token);
        match &self.endpoint {
            Some(endpoint) => config.with_endpoint(endpoint),
            None => config,
        }
    }
}

/// `ClickHouse` connection settings.
#[derive(Debug, Clone, Args)]
pub struct ClickHouseArgs {
    /// HTTP interface URL
    #[arg(long = "clickhouse-url", env = "CLICKHOUSE_URL", default_value = "http://localhost:8123")]
    pub url: String,

    /// Database name
    #[arg(long = "clickhouse-database", env = "CLICKHOUSE_DATABASE", default_value = "otel")]
    pub database: String,

    /// Username
    #[arg(long = "clickhouse-user", env = "CLICKHOUSE_USER", default_value = "default")]
    pub user: String,

    /// Password
    #[arg(
        long = "clickhouse-password",
        env = "CLICKHOUSE_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true,
    )]
    pub password: String,

    /// Span table
    #[arg(
        long = "clickhouse-traces-table",
        env = "CLICKHOUSE_TRACES_TABLE",
        default_value = "otel_traces",
    )]
    pub traces_table: String,

    /// Log table
    #[arg(
        long = "clickhouse-logs-table",
        env = "CLICKHOUSE_LOGS_TABLE",
        default_value = "otel_logs",
    )]
    pub logs_table: String,
}

impl ClickHouseArgs {
    /// Builds the backend settings.
    #[must_use]
    pub fn config(&self) -> ClickHouseConfig {
        ClickHouseConfig {
            url: self.url.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            traces_table: self.traces_table.clone(),
            logs_table: self.logs_table.clone(),
        }
    }
}

/// Settings of every backend, for commands that may read from several.
#[derive(Debug, Clone, Args)]
pub struct BackendArgs {
    #[command(flatten)]
    pub newrelic: NewRelicArgs,

    #[command(flatten)]
    pub gcp: GcpArgs,

    #[command(flatten)]
    pub clickhouse: ClickHouseArgs,
}

impl BackendArgs {
    /// Settings of the backend named by `kind`.
    #[must_use]
    pub fn config(&self, kind: BackendKind) -> BackendConfig {
        match kind {
            BackendKind::NewRelic => BackendConfig::NewRelic(self.newrelic.config()),
            BackendKind::Gcp => BackendConfig::Gcp(self.gcp.config()),
            BackendKind::ClickHouse => BackendConfig::ClickHouse(self.clickhouse.config()),
        }
    }
}

/// Generation provider names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Fixed answer, no network
    Mock,
    /// Gemini through the Generative Language API
    Gemini,
    /// Gemini through Vertex AI
    #[value(name = "vertexai")]
    VertexAi,
    /// Local Ollama server
    Ollama,
}

/// Generation provider settings.
#[derive(Debug, Clone, Args)]
pub struct ProviderArgs {
    /// Provider
    #[arg(short, long, value_enum)]
    pub provider: ProviderKind,

    /// Model name, e.g. `gemini-1.5-flash`
    #[arg(short, long, default_value = "")]
    pub model: String,

    /// Gemini API key
    #[arg(
        long,
        env = "GEMINI_API_KEY",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true,
    )]
    pub gemini_api_key: String,

    /// Vertex AI project
    #[arg(long, env = "VERTEX_PROJECT_ID", default_value = "", hide_default_value = true)]
    pub vertex_project_id: String,

    /// Vertex AI region
    #[arg(long, env = "VERTEX_LOCATION", default_value = "us-central1")]
    pub vertex_location: String,

    /// Vertex AI OAuth2 access token
    #[arg(
        long,
        env = "VERTEX_ACCESS_TOKEN",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true,
    )]
    pub vertex_access_token: String,

    /// Ollama server URL
    #[arg(long, env = "OLLAMA_HOST")]
    pub ollama_host: Option<String>,

    /// Answer of the mock provider
    #[arg(long)]
    pub mock_response: Option<String>,
}

impl ProviderArgs {
    /// Builds the provider settings.
    #[must_use]
    pub fn config(&self) -> ProviderConfig {
        match self.provider {
            ProviderKind::Mock => match &self.mock_response {
                Some(response) => ProviderConfig::Mock {
                    response: response.clone(),
                },
                None => ProviderConfig::mock(),
            },
            ProviderKind::Gemini => {
                ProviderConfig::Gemini(GeminiConfig::new(&self.model, &self.gemini_api_key))
            }
            ProviderKind::VertexAi => ProviderConfig::VertexAi(VertexAiConfig::new(
                &self.model,
                &self.vertex_project_id,
                &self.vertex_location,
                &self.vertex_access_token,
            )),
            ProviderKind::Ollama => {
                let config = OllamaConfig::new(&self.model);
                ProviderConfig::Ollama(match &self.ollama_host {
                    Some(host) => config.with_endpoint(host),
                    None => config,
                })
            }
        }
    }
}
