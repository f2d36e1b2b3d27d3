// SPDX-License-Identifier: MIT
//! `mcp_shell_core`: the policy-gated shell tool execution pipeline backing
//! an MCP server.
//!
//! # Layers
//!
//! | Layer | Responsibility |
//! |-------|----------------|
//! | `domain` | Pure types: catalog model, policy AST, error taxonomy, invocation context. |
//! | `infrastructure` | IO-touching collaborators: policy compiler, template engine, catalog loader, runners. |
//! | `application` | Orchestration: the Tool Handler call algorithm, prerequisite probing, fault isolation. |
//!
//! ```text
//! transport → application::FaultIsolator → application::ToolHandler
//!     → (defaults → required-check → policy → template → runner) → output
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{ToolHandler, ToolInfo, ToolRegistry, DIRECT_CALL_DEFAULT_TIMEOUT};
