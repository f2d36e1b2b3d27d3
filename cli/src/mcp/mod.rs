//! The MCP transports: stdio and HTTP, both driving the same JSON-RPC
//! dispatcher over the same `ToolRegistry` (§4.5, §6).

pub mod http;
pub mod protocol;
pub mod stdio;
