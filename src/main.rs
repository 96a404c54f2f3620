//! # MCP Server Operator
//!
//! Operator binary. See the library documentation for the reconcile model.

use anyhow::Result;
use clap::Parser;

use mcp_server_operator::config::load_config;
use mcp_server_operator::constants;
use mcp_server_operator::runtime::initialization::initialize;
use mcp_server_operator::runtime::watch_loop::run_watch_loop;

/// Kubernetes operator for MCP servers
#[derive(Debug, Parser)]
#[command(name = "mcp-server-operator", version, about)]
struct Args {
    /// Only watch MCPServer resources in this namespace (default: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Port for the metrics and health probe server
    #[arg(long, env = "METRICS_PORT", default_value_t = constants::DEFAULT_METRICS_PORT)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (controller_config, mut server_config) = load_config();
    server_config.metrics_port = args.metrics_port;

    let init_result = initialize(controller_config, server_config).await?;

    run_watch_loop(
        init_result.client,
        args.namespace,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
