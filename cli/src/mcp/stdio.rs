//! Stdio transport: newline-delimited JSON-RPC frames on standard
//! input/output. Standard error is reserved for server logging (§6).

use std::sync::Arc;

use mcp_shell_core::ToolRegistry;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, warn};

use super::protocol::{dispatch, JsonRpcRequest};

pub async fn serve(registry: Arc<ToolRegistry>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "discarding malformed JSON-RPC frame");
                continue;
            }
        };
        let response = dispatch(&registry, request).await;
        let encoded = serde_json::to_string(&response)?;
        if let Err(e) = stdout.write_all(encoded.as_bytes()).await {
            error!(error = %e, "failed writing response frame");
            break;
        }
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
