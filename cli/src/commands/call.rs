//! `call`: the Direct-Execute Entrypoint (§4.8). Invokes a single tool
//! with `key=value` arguments from the command line, applies the
//! implicit 60s timeout, and reports the outcome via process exit code.

use std::collections::BTreeMap;
use std::path::Path;

use mcp_shell_core::domain::errors::ToolError;
use mcp_shell_core::domain::tool::ParamValue;
use mcp_shell_core::{ToolRegistry, DIRECT_CALL_DEFAULT_TIMEOUT};
use tokio_util::sync::CancellationToken;

pub async fn run(catalog: Option<&Path>, tool: &str, raw_args: &[String]) -> anyhow::Result<()> {
    let registry = super::load_registry(catalog).await?;
    let arguments = coerce_arguments(&registry, tool, raw_args)?;

    match registry.call(tool, arguments, CancellationToken::new(), Some(DIRECT_CALL_DEFAULT_TIMEOUT)).await {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn coerce_arguments(
    registry: &ToolRegistry,
    tool: &str,
    raw_args: &[String],
) -> anyhow::Result<BTreeMap<String, ParamValue>> {
    let info = registry
        .list()
        .iter()
        .find(|t| t.name == tool)
        .ok_or_else(|| anyhow::anyhow!("unknown tool: {tool}"))?;

    let mut arguments = BTreeMap::new();
    for raw in raw_args {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{raw}'"))?;
        let spec = info
            .params
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("tool '{tool}' has no parameter '{key}'"))?;
        arguments.insert(key.to_string(), ToolRegistry::coerce_argument(spec.kind, value)?);
    }
    Ok(arguments)
}

/// Maps the error taxonomy (§7) onto process exit codes: policy
/// violations and bad input are distinguished from internal failures.
fn exit_code_for(err: &ToolError) -> i32 {
    match err {
        ToolError::PolicyViolation { .. } => 2,
        ToolError::ParameterValidation(_) | ToolError::Configuration(_) => 3,
        ToolError::Prerequisite(_) => 4,
        ToolError::Timeout(_) | ToolError::Cancelled => 5,
        ToolError::Compilation { .. } | ToolError::TemplateRender(_) | ToolError::RunnerSetup(_) | ToolError::RunnerExecution { .. } => 6,
        ToolError::Internal(_) => 70,
    }
}
