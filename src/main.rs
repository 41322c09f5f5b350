//! Databricks Unity Catalog MCP server.

mod logging;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use dbx_mcp::{
    AggregatorOptions, CatalogAggregator, ConfigOverrides, DatabricksConfig, DatabricksMcpServer,
    RestWorkspaceClient,
};
use tracing::info;

use crate::logging::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "databricks-mcp", version, about, long_about = None)]
struct CliArgs {
    /// YAML configuration file
    #[arg(long, env = "DATABRICKS_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Profile in the Databricks config file
    #[arg(long, env = "DATABRICKS_CONFIG_PROFILE")]
    profile: Option<String>,

    /// Databricks config file (defaults to ~/.databrickscfg)
    #[arg(long, env = "DATABRICKS_CONFIG_FILE")]
    profiles_file: Option<PathBuf>,

    /// Workspace URL
    #[arg(long, env = "DATABRICKS_HOST")]
    host: Option<String>,

    /// Personal access token
    #[arg(long, env = "DATABRICKS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Upper bound on simultaneous remote calls
    #[arg(long)]
    max_concurrent_requests: Option<usize>,

    /// Metadata cache time-to-live in seconds
    #[arg(long)]
    cache_ttl_secs: Option<u64>,

    /// Metadata cache capacity in entries
    #[arg(long)]
    cache_capacity: Option<usize>,

    /// Disable the metadata cache
    #[arg(long, default_value_t = false)]
    no_cache: bool,

    #[arg(long, default_value = "info", env = "DATABRICKS_MCP_LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

impl CliArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            profile: self.profile.clone(),
            profiles_file: self.profiles_file.clone(),
            host: self.host.clone(),
            token: self.token.clone(),
            max_concurrent_requests: self.max_concurrent_requests,
            cache_ttl_secs: self.cache_ttl_secs,
            cache_capacity: self.cache_capacity,
            disable_cache: self.no_cache,
        }
    }

    fn log_format(&self) -> LogFormat {
        if self.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    logging::init(&args.log_level, args.log_format()).context("failed to initialise logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Databricks MCP server");

    let config = DatabricksConfig::resolve(args.overrides())
        .await
        .context("invalid Databricks configuration")?;
    info!(
        host = %config.host(),
        max_concurrent_requests = config.client.max_concurrent_requests,
        cache_enabled = config.cache.enabled,
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration resolved"
    );

    let client = RestWorkspaceClient::new(&config).context("failed to build workspace client")?;
    let aggregator = Arc::new(CatalogAggregator::new(
        Arc::new(client),
        AggregatorOptions::from_config(&config),
    ));

    let mut server = DatabricksMcpServer::new(Arc::clone(&aggregator));
    if let Some(path) = &args.profiles_file {
        server = server.with_profiles_path(path);
    }
    server.serve_stdio().await.context("MCP server failed")?;

    let metrics = aggregator.metrics();
    info!(
        remote_calls = metrics.remote_calls,
        remote_failures = metrics.remote_failures,
        branch_failures = metrics.branch_failures,
        failed_operations = metrics.failed_operations,
        cache = ?aggregator.cache_stats(),
        "Shutting down"
    );
    Ok(())
}
