//! `serve`: stand up the MCP server on the stdio or HTTP transport.

use std::path::Path;
use std::sync::Arc;

use crate::mcp;

#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

pub async fn run(catalog: Option<&Path>, transport: Transport, http_addr: &str) -> anyhow::Result<()> {
    let registry = Arc::new(super::load_registry(catalog).await?);
    match transport {
        Transport::Stdio => mcp::stdio::serve(registry).await,
        Transport::Http => mcp::http::serve(registry, http_addr).await,
    }
}
