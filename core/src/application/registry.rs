// SPDX-License-Identifier: MIT
//! Tool Registry / Server Façade (§4.5): loads the catalog, filters tools
//! by prerequisite probe, compiles the survivors' policies and templates,
//! and hands transports a uniform `call`/`list` surface. Holds no mutable
//! state once built — every `ToolHandler` is wrapped in `Arc` so the
//! registry is freely shareable across tasks (§5).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::ToolError;
use crate::domain::tool::{ParamKind, ParamValue, ParameterSpec, ToolDefinition};
use crate::infrastructure::catalog;

use super::prerequisite_prober::PrerequisiteProber;
use super::tool_handler::ToolHandler;

/// A registered tool's public shape, enough to derive an MCP input schema
/// (§4.5: kind→JSON-schema mapping, required set from `required=true` and
/// no default).
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub params: BTreeMap<String, ParameterSpec>,
}

pub struct ToolRegistry {
    handlers: BTreeMap<String, Arc<ToolHandler>>,
    infos: Vec<ToolInfo>,
}

impl ToolRegistry {
    /// Load the catalog at `path`, probe every tool's prerequisites, and
    /// compile the survivors. Tools whose prerequisites are unmet are
    /// logged and skipped, not treated as an error (§4.5). Compilation
    /// failures (policy/template errors) abort the whole load.
    pub async fn load(path: &Path, default_shell_override: Option<&str>) -> Result<Self, ToolError> {
        let (catalog_shell, tools) = catalog::load_catalog(path)?;
        let shell = default_shell_override.unwrap_or(&catalog_shell);
        Self::build(tools, shell).await
    }

    /// Build a registry directly from already-parsed tool definitions
    /// (used by tests and by the `validate`/`list` CLI commands that load
    /// the catalog separately).
    pub async fn build(tools: Vec<ToolDefinition>, shell: &str) -> Result<Self, ToolError> {
        let prober = PrerequisiteProber::new();
        let mut handlers = BTreeMap::new();
        let mut infos = Vec::new();

        for tool in tools {
            let Some(candidate) = select_runner(&tool, &prober).await else {
                warn!(tool = %tool.name, "skipping tool: no runner candidate has satisfied prerequisites");
                continue;
            };

            let info = ToolInfo {
                name: tool.name.clone(),
                description: tool.description.clone(),
                params: tool.params.clone(),
            };
            let name = tool.name.clone();
            let handler = ToolHandler::new(tool, candidate, shell)?;
            debug!(tool = %name, "tool compiled and registered");
            handlers.insert(name, Arc::new(handler));
            infos.push(info);
        }

        info!(registered = handlers.len(), "catalog loaded");
        Ok(Self { handlers, infos })
    }

    pub fn list(&self) -> &[ToolInfo] {
        &self.infos
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Invoke a registered tool by name, wrapped by the Fault Isolator so
    /// a panic inside the handler never escapes as a process-level
    /// failure (§4.7).
    pub async fn call(
        &self,
        name: &str,
        arguments: BTreeMap<String, ParamValue>,
        cancellation: CancellationToken,
        implicit_default_timeout: Option<Duration>,
    ) -> Result<String, ToolError> {
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::Configuration(format!("unknown tool '{name}'")))?;

        match super::fault_isolator::isolate(async move {
            handler.call(arguments, cancellation, implicit_default_timeout).await
        })
        .await
        {
            Ok(output) => Ok(output),
            Err(err) => Err(err),
        }
    }

    /// Coerce a raw `key=value` string into a typed [`ParamValue`] per a
    /// parameter's declared kind, following the Direct-Execute
    /// Entrypoint's parsing rules (§4.8): booleans accept
    /// `true|false|1|0|yes|no` case-insensitively, numerics are decimal,
    /// strings are taken verbatim.
    pub fn coerce_argument(kind: ParamKind, raw: &str) -> Result<ParamValue, ToolError> {
        match kind {
            ParamKind::String => Ok(ParamValue::String(raw.to_string())),
            ParamKind::Number => raw
                .parse::<f64>()
                .map(ParamValue::Number)
                .map_err(|_| ToolError::ParameterValidation(format!("'{raw}' is not a valid number"))),
            ParamKind::Integer => raw
                .parse::<i64>()
                .map(ParamValue::Integer)
                .map_err(|_| ToolError::ParameterValidation(format!("'{raw}' is not a valid integer"))),
            ParamKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(ParamValue::Boolean(true)),
                "false" | "0" | "no" => Ok(ParamValue::Boolean(false)),
                _ => Err(ToolError::ParameterValidation(format!("'{raw}' is not a valid boolean"))),
            },
        }
    }
}

/// Pick the first runner candidate whose declared and implicit
/// requirements are satisfied, trying candidates in declaration order.
async fn select_runner(
    tool: &ToolDefinition,
    prober: &PrerequisiteProber,
) -> Option<crate::domain::tool::RunnerCandidate> {
    for candidate in &tool.runners {
        if prober.probe_runner(candidate).await.is_ok() {
            return Some(candidate.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::{Requirements, RunnerCandidate, RunnerKind, RunnerOptions};

    fn unreachable_tool() -> ToolDefinition {
        let mut params = BTreeMap::new();
        params.insert(
            "name".to_string(),
            ParameterSpec { kind: ParamKind::String, description: String::new(), required: true, default: None },
        );
        ToolDefinition {
            name: "unreachable".to_string(),
            description: String::new(),
            params,
            command: "echo {{name}}".to_string(),
            output: None,
            runners: vec![RunnerCandidate {
                kind: RunnerKind::Exec,
                requirements: Requirements {
                    executables: vec!["definitely-not-a-real-executable-xyz".to_string()],
                    os: vec![],
                },
                options: RunnerOptions::default(),
            }],
            constraints: vec![],
            env: vec![],
            timeout: None,
        }
    }

    fn hello_tool() -> ToolDefinition {
        let mut params = BTreeMap::new();
        params.insert(
            "name".to_string(),
            ParameterSpec { kind: ParamKind::String, description: String::new(), required: true, default: None },
        );
        ToolDefinition {
            name: "hello_world".to_string(),
            description: String::new(),
            params,
            command: "echo {{name}}".to_string(),
            output: None,
            runners: vec![RunnerCandidate {
                kind: RunnerKind::Exec,
                requirements: Requirements::default(),
                options: RunnerOptions::default(),
            }],
            constraints: vec![],
            env: vec![],
            timeout: None,
        }
    }

    #[tokio::test]
    async fn unsatisfiable_prerequisites_skip_the_tool_without_failing_the_load() {
        let registry = ToolRegistry::build(vec![unreachable_tool()], "/bin/sh").await.unwrap();
        assert!(registry.list().is_empty());
        assert!(registry.get("unreachable").is_none());
    }

    #[tokio::test]
    async fn registered_tool_can_be_called_by_name() {
        let registry = ToolRegistry::build(vec![hello_tool()], "/bin/sh").await.unwrap();
        assert_eq!(registry.list().len(), 1);
        let mut args = BTreeMap::new();
        args.insert("name".to_string(), ParamValue::String("World".to_string()));
        let output = registry
            .call("hello_world", args, CancellationToken::new(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(output, "World");
    }

    #[tokio::test]
    async fn calling_an_unknown_tool_is_a_configuration_error() {
        let registry = ToolRegistry::build(vec![], "/bin/sh").await.unwrap();
        let err = registry
            .call("does_not_exist", BTreeMap::new(), CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn coerce_argument_handles_boolean_synonyms() {
        assert_eq!(ToolRegistry::coerce_argument(ParamKind::Boolean, "yes").unwrap(), ParamValue::Boolean(true));
        assert_eq!(ToolRegistry::coerce_argument(ParamKind::Boolean, "0").unwrap(), ParamValue::Boolean(false));
        assert!(ToolRegistry::coerce_argument(ParamKind::Boolean, "maybe").is_err());
    }

    #[test]
    fn coerce_argument_parses_numerics() {
        assert_eq!(ToolRegistry::coerce_argument(ParamKind::Number, "3.5").unwrap(), ParamValue::Number(3.5));
        assert_eq!(ToolRegistry::coerce_argument(ParamKind::Integer, "7").unwrap(), ParamValue::Integer(7));
        assert!(ToolRegistry::coerce_argument(ParamKind::Integer, "3.5").is_err());
    }
}
