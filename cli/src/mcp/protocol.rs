//! JSON-RPC 2.0 wire types and the method dispatcher shared by the stdio
//! and HTTP transports (§6 External interfaces).

use std::collections::BTreeMap;

use mcp_shell_core::domain::errors::ToolError;
use mcp_shell_core::domain::tool::{ParamKind, ParamValue};
use mcp_shell_core::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    #[allow(dead_code)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(JsonRpcError { code, message: message.into() }) }
    }
}

/// Route one JSON-RPC request to the registry. Shared by both transports
/// so `initialize`/`tools/list`/`tools/call` behave identically regardless
/// of how the bytes arrived (§4.5).
pub async fn dispatch(registry: &ToolRegistry, request: JsonRpcRequest) -> JsonRpcResponse {
    debug!(method = %request.method, "dispatching MCP request");
    match request.method.as_str() {
        "initialize" => JsonRpcResponse::ok(request.id, initialize_result(registry)),
        "tools/list" => JsonRpcResponse::ok(request.id, tools_list_result(registry)),
        "tools/call" => match tools_call(registry, &request.params).await {
            Ok(text) => JsonRpcResponse::ok(request.id, content_result(&text, false)),
            Err(err) => JsonRpcResponse::ok(request.id, content_result(&err.to_string(), true)),
        },
        other => JsonRpcResponse::err(request.id, -32601, format!("method not found: {other}")),
    }
}

fn initialize_result(registry: &ToolRegistry) -> Value {
    let tool_names: Vec<&str> = registry.list().iter().map(|t| t.name.as_str()).collect();
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": { "name": "mcp-shell-bridge", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": { "allowedTools": tool_names } },
        "sessionId": uuid::Uuid::new_v4().to_string(),
    })
}

fn tools_list_result(registry: &ToolRegistry) -> Value {
    let tools: Vec<Value> = registry
        .list()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": input_schema(tool),
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn input_schema(tool: &mcp_shell_core::ToolInfo) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for (name, spec) in &tool.params {
        let json_kind = match spec.kind {
            mcp_shell_core::domain::tool::ParamKind::String => "string",
            mcp_shell_core::domain::tool::ParamKind::Number => "number",
            mcp_shell_core::domain::tool::ParamKind::Integer => "integer",
            mcp_shell_core::domain::tool::ParamKind::Boolean => "boolean",
        };
        properties.insert(name.clone(), json!({ "type": json_kind, "description": spec.description }));
        if spec.is_effectively_required() {
            required.push(name.clone());
        }
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

fn content_result(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

async fn tools_call(registry: &ToolRegistry, params: &Value) -> Result<String, ToolError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::Configuration("tools/call requires a 'name'".to_string()))?;

    let tool = registry
        .list()
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| ToolError::Configuration(format!("unknown tool '{name}'")))?;

    let mut arguments: BTreeMap<String, ParamValue> = BTreeMap::new();
    if let Some(raw_args) = params.get("arguments").and_then(Value::as_object) {
        for (key, value) in raw_args {
            let spec = tool
                .params
                .get(key)
                .ok_or_else(|| ToolError::ParameterValidation(format!("tool '{name}' has no parameter '{key}'")))?;
            arguments.insert(key.clone(), json_value_to_param(value, spec.kind)?);
        }
    }

    registry.call(name, arguments, CancellationToken::new(), None).await
}

/// MCP arguments arrive as JSON, which already carries its own type
/// (string/number/bool), but the wire shape doesn't always match the tool's
/// declared kind (an `integer` parameter sent as the JSON string `"5"`, say)
/// — so re-render to text and coerce against the declared kind the same way
/// the Direct-Execute Entrypoint's `coerce_argument` does (§4.8).
fn json_value_to_param(value: &Value, kind: ParamKind) -> Result<ParamValue, ToolError> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    ToolRegistry::coerce_argument(kind, &raw)
}
