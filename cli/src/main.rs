//! Sightline CLI
//!
//! Command-line interface for querying observability backends, chaining the
//! results through pipes and analyzing them with a language model.
//!
//! # Usage
//!
//! ```bash
//! sightline --help
//! sightline newrelic search-values --attribute http.path --query '*user*'
//! sightline newrelic spans --trace-id abc123 --format json \
//!   | sightline gcp logs --trace-id abc123 --format json \
//!   | sightline analyze --type error --provider gemini --model gemini-1.5-flash
//! ```

#![deny(unsafe_code)]

mod config;
mod time_range;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{BackendArgs, ClickHouseArgs, GcpArgs, NewRelicArgs, ProviderArgs};
use shared::analyzer::{AnalysisResult, Analyzer};
use shared::backend::{
    build_backend, Backend, BackendConfig, BackendKind, ListLogsRequest, ListLogsResponse,
    ListSpansRequest, ListSpansResponse, SearchValuesRequest, TimeWindow, TopTracesRequest,
    WildcardPattern,
};
use shared::collector::{CollectRequest, TraceCollector};
use shared::output::{self, OutputFormat, StageResult};
use shared::pipeline::{Passthrough, PipelineError};
use shared::prompt::{AnalysisKind, Language};
use shared::provider::build_provider;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sightline CLI - query observability backends and analyze telemetry
#[derive(Parser)]
#[command(name = "sightline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query New Relic
    #[command(name = "newrelic")]
    NewRelic {
        #[command(flatten)]
        credentials: NewRelicArgs,

        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Query Google Cloud Logging and Cloud Trace
    Gcp {
        #[command(flatten)]
        credentials: GcpArgs,

        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Query `ClickHouse` tables written by the OpenTelemetry exporter
    #[command(name = "clickhouse")]
    ClickHouse {
        #[command(flatten)]
        credentials: ClickHouseArgs,

        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Collect the spans and logs of one trace, possibly from two backends
    Collect(CollectArgs),

    /// Analyze telemetry read from stdin with a language model
    Analyze(AnalyzeArgs),
}

/// Flags shared by every query.
#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// Time range 'from,to' (e.g. '2024-01-15T10:00:00Z,2024-01-15T11:00:00Z'). Default: last hour
    #[arg(short, long)]
    time_range: Option<String>,

    /// Relative window ending now, e.g. 30m, 2h, 7d
    #[arg(long, conflicts_with = "time_range")]
    since: Option<String>,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

impl CommonArgs {
    fn window(&self) -> Result<TimeWindow> {
        time_range::resolve_window(self.time_range.as_deref(), self.since.as_deref())
    }
}

#[derive(Subcommand)]
enum QueryCommand {
    /// Search distinct values of an attribute
    SearchValues {
        /// Attribute name, e.g. http.path
        #[arg(short, long)]
        attribute: String,

        /// Value pattern with * wildcards, e.g. '*user*'
        #[arg(short, long)]
        query: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Find the slowest traces containing an exact attribute value
    TopTraces {
        /// Attribute name
        #[arg(short, long)]
        attribute: String,

        /// Exact value
        #[arg(short, long)]
        value: String,

        /// Number of traces
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// List the spans of one trace
    Spans {
        /// Trace ID
        #[arg(long)]
        trace_id: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// List the logs of one trace
    Logs {
        /// Trace ID
        #[arg(long)]
        trace_id: String,

        /// Maximum number of entries
        #[arg(short, long)]
        limit: Option<usize>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CollectArgs {
    /// Trace ID
    #[arg(long)]
    trace_id: String,

    /// Backend holding the spans
    #[arg(long)]
    spans_from: BackendKind,

    /// Backend holding the logs; failures there only produce a warning
    #[arg(long)]
    logs_from: Option<BackendKind>,

    /// Maximum number of log entries
    #[arg(long)]
    log_limit: Option<usize>,

    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    backends: BackendArgs,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Analysis type (duration, error)
    #[arg(short = 't', long = "type")]
    kind: AnalysisKind,

    /// Report language (en, ja)
    #[arg(short, long, default_value = "en")]
    language: Language,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,

    #[command(flatten)]
    provider: ProviderArgs,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::NewRelic { credentials, query } => {
            run_query(BackendConfig::NewRelic(credentials.config()), query).await
        }
        Commands::Gcp { credentials, query } => {
            run_query(BackendConfig::Gcp(credentials.config()), query).await
        }
        Commands::ClickHouse { credentials, query } => {
            run_query(BackendConfig::ClickHouse(credentials.config()), query).await
        }
        Commands::Collect(args) => run_collect(args).await,
        Commands::Analyze(args) => run_analyze(args, &cancel).await,
    }
}

async fn run_query(config: BackendConfig, query: QueryCommand) -> Result<()> {
    let kind = config.kind();
    let backend =
        build_backend(config).with_context(|| format!("failed to create {kind} client"))?;
    let upstream = Passthrough::from_stdin()?;

    let (stage, format) = execute(backend.as_ref(), query).await?;
    tracing::info!(backend = %kind, records = stage.len(), "Query finished");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    upstream.emit(stage, format, &mut out)?;
    out.flush()?;
    Ok(())
}

async fn execute(
    backend: &dyn Backend,
    query: QueryCommand,
) -> Result<(StageResult, OutputFormat)> {
    Ok(match query {
        QueryCommand::SearchValues {
            attribute,
            query,
            common,
        } => {
            let window = common.window()?;
            let request = SearchValuesRequest {
                attribute,
                pattern: WildcardPattern::new(query),
                window,
            };
            let response = backend
                .search_values(&request)
                .await
                .context("failed to search values")?;
            (StageResult::Values(response), common.format)
        }
        QueryCommand::TopTraces {
            attribute,
            value,
            limit,
            common,
        } => {
            let window = common.window()?;
            let request = TopTracesRequest {
                attribute,
                value,
                window,
                limit,
            };
            let response = backend
                .top_traces(&request)
                .await
                .context("failed to search top traces")?;
            (StageResult::Traces(response), common.format)
        }
        QueryCommand::Spans { trace_id, common } => {
            let window = common.window()?;
            let response = backend
                .list_spans(&ListSpansRequest { trace_id, window })
                .await
                .context("failed to list spans")?;
            (StageResult::Spans(response), common.format)
        }
        QueryCommand::Logs {
            trace_id,
            limit,
            common,
        } => {
            let window = common.window()?;
            let response = backend
                .list_logs(&ListLogsRequest {
                    trace_id,
                    window,
                    limit,
                })
                .await
                .context("failed to list logs")?;
            (StageResult::Logs(response), common.format)
        }
    })
}

async fn run_collect(args: CollectArgs) -> Result<()> {
    if args.common.format == OutputFormat::Csv {
        return Err(PipelineError::UnsupportedFormat(OutputFormat::Csv).into());
    }
    let window = args.common.window()?;

    let spans_backend = build_backend(args.backends.config(args.spans_from))
        .with_context(|| format!("failed to create {} client", args.spans_from))?;
    let logs_backend = match args.logs_from {
        Some(kind) if kind != args.spans_from => Some(
            build_backend(args.backends.config(kind))
                .with_context(|| format!("failed to create {kind} client"))?,
        ),
        _ => None,
    };

    let mut collector = TraceCollector::new(spans_backend.as_ref());
    match (&logs_backend, args.logs_from) {
        (Some(logs), _) => collector = collector.with_logs(logs.as_ref()),
        (None, Some(_)) => collector = collector.with_logs(spans_backend.as_ref()),
        (None, None) => {}
    }

    let mut request = CollectRequest::new(&args.trace_id, window);
    if let Some(limit) = args.log_limit {
        request = request.with_log_limit(limit);
    }
    let collected = collector
        .collect(&request)
        .await
        .with_context(|| format!("failed to collect trace {}", args.trace_id))?;

    let upstream = Passthrough::from_stdin()?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut merged = upstream.upstream().clone();
    merged.append(collected);
    match args.common.format {
        OutputFormat::Json => output::render_combined_json(&merged, &mut out)?,
        _ if upstream.has_upstream() => output::render_combined_table(&merged, &mut out)?,
        _ => {
            let logs = std::mem::take(&mut merged.logs);
            output::render(
                &StageResult::Spans(ListSpansResponse {
                    spans: merged.spans,
                    web_link: String::new(),
                }),
                OutputFormat::Table,
                &mut out,
            )?;
            writeln!(out)?;
            output::render(
                &StageResult::Logs(ListLogsResponse {
                    logs,
                    web_link: String::new(),
                }),
                OutputFormat::Table,
                &mut out,
            )?;
        }
    }
    out.flush()?;
    Ok(())
}

async fn run_analyze(args: AnalyzeArgs, cancel: &CancellationToken) -> Result<()> {
    if args.format == OutputFormat::Csv {
        anyhow::bail!("Unsupported output format for analysis: csv (supported: table, json)");
    }

    let input = Passthrough::from_stdin().context("failed to read data from stdin")?;
    let data = input.upstream();
    tracing::info!(data = %data.summary(), "Aggregated data");

    let provider_config = args.provider.config();
    let provider = build_provider(&provider_config)
        .with_context(|| format!("failed to create {} provider", provider_config.name()))?;
    let analyzer = Analyzer::new(Arc::from(provider)).with_language(args.language);

    let result = analyzer
        .analyze(args.kind, data, cancel)
        .await
        .context("failed to perform analysis")?;
    if let Err(e) = analyzer.close().await {
        tracing::warn!(error = %e, "Failed to close provider");
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    print_analysis(&result, args.format, &mut out)?;
    out.flush()?;
    Ok(())
}

fn print_analysis(
    result: &AnalysisResult,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    if format == OutputFormat::Json {
        serde_json::to_writer_pretty(&mut *out, result)?;
        writeln!(out)?;
        return Ok(());
    }
    writeln!(out, "=== {} analysis ===", result.analysis_kind)?;
    writeln!(out, "Provider: {} ({})", result.provider, result.model)?;
    writeln!(out, "Data: {}", result.summary)?;
    writeln!(out)?;
    writeln!(out, "{}", result.content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use config::ProviderKind;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["sightline"]).is_err());
    }

    #[test]
    fn test_cli_search_values_command() {
        let cli = Cli::try_parse_from([
            "sightline",
            "newrelic",
            "--newrelic-account-id",
            "7",
            "search-values",
            "--attribute",
            "http.path",
            "--query",
            "*user*",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::NewRelic { credentials, query } => {
                assert_eq!(credentials.account_id, 7);
                match query {
                    QueryCommand::SearchValues {
                        attribute,
                        query,
                        common,
                    } => {
                        assert_eq!(attribute, "http.path");
                        assert_eq!(query, "*user*");
                        assert_eq!(common.format, OutputFormat::Json);
                    }
                    _ => panic!("expected search-values"),
                }
            }
            _ => panic!("expected newrelic"),
        }
    }

    #[test]
    fn test_cli_top_traces_default_limit() {
        let cli = Cli::try_parse_from([
            "sightline",
            "clickhouse",
            "top-traces",
            "-a",
            "service.name",
            "-v",
            "checkout",
        ])
        .unwrap();

        match cli.command {
            Commands::ClickHouse { query, .. } => match query {
                QueryCommand::TopTraces { limit, common, .. } => {
                    assert_eq!(limit, 5);
                    assert_eq!(common.format, OutputFormat::Table);
                }
                _ => panic!("expected top-traces"),
            },
            _ => panic!("expected clickhouse"),
        }
    }

    #[test]
    fn test_cli_time_range_conflicts_with_since() {
        let result = Cli::try_parse_from([
            "sightline",
            "gcp",
            "logs",
            "--trace-id",
            "abc",
            "--time-range",
            "2024-01-15,2024-01-16",
            "--since",
            "30m",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        let result = Cli::try_parse_from([
            "sightline",
            "gcp",
            "spans",
            "--trace-id",
            "abc",
            "--format",
            "xml",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_cli_collect_command() {
        let cli = Cli::try_parse_from([
            "sightline",
            "collect",
            "--trace-id",
            "abc",
            "--spans-from",
            "newrelic",
            "--logs-from",
            "gcp",
        ])
        .unwrap();

        match cli.command {
            Commands::Collect(args) => {
                assert_eq!(args.spans_from, BackendKind::NewRelic);
                assert_eq!(args.logs_from, Some(BackendKind::Gcp));
            }
            _ => panic!("expected collect"),
        }
    }

    #[test]
    fn test_cli_collect_keeps_backend_endpoints_apart() {
        let cli = Cli::try_parse_from([
            "sightline",
            "collect",
            "--trace-id",
            "abc",
            "--spans-from",
            "newrelic",
            "--newrelic-endpoint",
            "http://nr.local/graphql",
            "--gcp-endpoint",
            "http://gcp.local",
        ])
        .unwrap();

        match cli.command {
            Commands::Collect(args) => {
                assert_eq!(
                    args.backends.newrelic.endpoint.as_deref(),
                    Some("http://nr.local/graphql")
                );
                assert_eq!(args.backends.gcp.endpoint.as_deref(), Some("http://gcp.local"));
            }
            _ => panic!("expected collect"),
        }
    }

    #[test]
    fn test_cli_analyze_command() {
        let cli = Cli::try_parse_from([
            "sightline",
            "analyze",
            "--type",
            "error",
            "--provider",
            "mock",
            "--language",
            "ja",
        ])
        .unwrap();

        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.kind, AnalysisKind::Error);
                assert_eq!(args.language, Language::Japanese);
                assert_eq!(args.provider.provider, ProviderKind::Mock);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_cli_analyze_rejects_unknown_type() {
        let result = Cli::try_parse_from([
            "sightline",
            "analyze",
            "--type",
            "latency",
            "--provider",
            "mock",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_print_analysis_table() {
        let result = AnalysisResult {
            analysis_kind: AnalysisKind::Duration,
            summary: "3 spans".to_string(),
            content: "The database call dominates.".to_string(),
            provider: "mock".to_string(),
            model: "mock".to_string(),
        };
        let mut out = Vec::new();

        print_analysis(&result, OutputFormat::Table, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("=== duration analysis ==="));
        assert!(text.contains("Data: 3 spans"));
        assert!(text.ends_with("The database call dominates.\n"));
    }
}
