// SPDX-License-Identifier: MIT
//! `mcp-shell-bridge`: the CLI and MCP server binary over `mcp-shell-core`.

mod commands;
mod mcp;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::serve::Transport;
use tracing_subscriber::EnvFilter;

/// A policy-gated shell tool server speaking MCP over stdio or HTTP.
#[derive(Debug, Parser)]
#[command(name = "mcp-shell-bridge", version, about)]
struct Cli {
    /// Path to the tool catalog YAML. Falls back to the discovery order
    /// (§10.3) when omitted.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Log verbosity, e.g. "info", "debug", "mcp_shell_core=trace".
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP server.
    Serve {
        #[arg(long, value_enum, default_value_t = Transport::Stdio)]
        transport: Transport,

        #[arg(long, default_value = "127.0.0.1:8765")]
        http_addr: String,
    },
    /// Invoke a single tool directly and print its output.
    Call {
        tool: String,
        /// Arguments as `key=value` pairs.
        args: Vec<String>,
    },
    /// List the tools the catalog accepts, after prerequisite filtering.
    List,
    /// Load and compile the catalog without serving anything.
    Validate,
}

/// Logging always goes to stderr, in every mode, so stdout stays clean
/// for the stdio transport's JSON-RPC frames (§10.1).
fn init_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let catalog = cli.catalog.as_deref();
    match cli.command {
        Command::Serve { transport, http_addr } => commands::serve::run(catalog, transport, &http_addr).await,
        Command::Call { tool, args } => commands::call::run(catalog, &tool, &args).await,
        Command::List => commands::list::run(catalog).await,
        Command::Validate => commands::validate::run(catalog).await,
    }
}
