// Copyright 2026 Resgraph Contributors
// SPDX-License-Identifier: Apache-2.0

//! Resgraph CLI — entry point.

mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use resgraph::{
    query_data, CloudEnvironment, DatasourceInfo, ExecutorSettings, QueryContext, QuerySpec,
    ReqwestTransport, TimeRange,
};

const TOKEN_ENV: &str = "RESGRAPH_ACCESS_TOKEN";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "resgraph",
    about = "Run Azure Resource Graph queries with KQL macros",
    version
)]
struct Cli {
    /// Output results as JSON (machine-readable).
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a KQL query against Resource Graph.
    Query {
        /// KQL query, may contain $__ macros.
        query: String,

        /// Cloud to query (public, china, us-government, germany).
        #[arg(long)]
        cloud: Option<String>,

        /// Resource Graph base URL, overriding the cloud default.
        #[arg(long)]
        url: Option<String>,

        /// Subscription to query; repeat for several.
        #[arg(long = "subscription", short = 's')]
        subscriptions: Vec<String>,

        /// Range start (RFC 3339). Defaults to one hour before --to.
        #[arg(long)]
        from: Option<String>,

        /// Range end (RFC 3339). Defaults to now.
        #[arg(long)]
        to: Option<String>,

        /// Datasource settings file (jsonData object).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bearer token for the management API.
        /// Also reads from RESGRAPH_ACCESS_TOKEN env var.
        #[arg(long)]
        token: Option<String>,
    },

    /// Print a query with its macros expanded.
    Interpolate {
        query: String,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,
    },

    /// Print the portal URL of a cloud.
    PortalUrl {
        /// Cloud identifier.
        cloud: String,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   resgraph completions bash > ~/.local/share/bash-completion/completions/resgraph
    ///   resgraph completions zsh > ~/.zfunc/_resgraph
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    output::set_json(cli.json);

    match cli.command {
        Commands::Query {
            query,
            cloud,
            url,
            subscriptions,
            from,
            to,
            config,
            token,
        } => {
            let mut ds = match config {
                Some(path) => DatasourceInfo::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => DatasourceInfo::default(),
            }
            .with_env_overrides()?;
            if let Some(cloud) = cloud {
                let cloud: CloudEnvironment = cloud.parse()?;
                ds.cloud = cloud;
                ds.resource_graph_url = cloud.api_url().to_string();
            }
            if let Some(url) = url {
                ds.resource_graph_url = url;
            }

            let range = time_range(from.as_deref(), to.as_deref())?;
            let model = serde_json::json!({
                "queryType": "Azure Resource Graph",
                "subscriptions": subscriptions,
                "azureResourceGraph": { "query": query },
            });
            let specs = [QuerySpec::new("A", model.to_string(), range)];

            let mut transport = ReqwestTransport::new(CONNECT_TIMEOUT)?;
            if let Some(token) = token.or_else(|| std::env::var(TOKEN_ENV).ok()) {
                transport = transport.with_bearer_token(token);
            }

            let (ctx, cancel) = QueryContext::with_cancel();
            let settings = ExecutorSettings::from_env();
            tracing::info!(url = %ds.resource_graph_url, cloud = %ds.cloud, "running query");

            let responses = tokio::select! {
                res = query_data(&ctx, &specs, &ds, &transport, &settings) => res?,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    anyhow::bail!("interrupted");
                }
            };

            if output::print_responses(&responses) > 0 {
                std::process::exit(1);
            }
        }

        Commands::Interpolate { query, from, to } => {
            let range = time_range(from.as_deref(), to.as_deref())?;
            let expanded = resgraph::macros::interpolate(&query, &range)?;
            if output::is_json() {
                output::print_json(&serde_json::json!({
                    "query": query,
                    "interpolated": expanded,
                    "from": range.from_literal(),
                    "to": range.to_literal(),
                }));
            } else {
                println!("{expanded}");
            }
        }

        Commands::PortalUrl { cloud } => {
            let url = resgraph::portal_url(&cloud)?;
            if output::is_json() {
                output::print_json(&serde_json::json!({ "cloud": cloud, "portalUrl": url }));
            } else {
                println!("{url}");
            }
        }

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "resgraph", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn time_range(from: Option<&str>, to: Option<&str>) -> Result<TimeRange> {
    let to = match to {
        Some(raw) => parse_time(raw)?,
        None => Utc::now(),
    };
    let from = match from {
        Some(raw) => parse_time(raw)?,
        None => to - chrono::Duration::hours(1),
    };
    anyhow::ensure!(from <= to, "--from must not be after --to");
    Ok(TimeRange::new(from, to))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid RFC 3339 timestamp '{raw}'"))
}
