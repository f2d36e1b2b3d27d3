//! HTTP transport: a single POST endpoint accepting a JSON-RPC request and
//! returning a JSON-RPC response. Named `/rpc` to honestly reflect
//! request/response semantics rather than implying SSE streaming (§9 Open
//! Questions, recorded decision).

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use mcp_shell_core::ToolRegistry;
use tracing::info;

use super::protocol::{dispatch, JsonRpcRequest, JsonRpcResponse};

async fn rpc_handler(
    State(registry): State<Arc<ToolRegistry>>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    Json(dispatch(&registry, request).await)
}

pub async fn serve(registry: Arc<ToolRegistry>, addr: &str) -> anyhow::Result<()> {
    let app = Router::new().route("/rpc", post(rpc_handler)).with_state(registry);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening for JSON-RPC requests");
    axum::serve(listener, app).await?;
    Ok(())
}
