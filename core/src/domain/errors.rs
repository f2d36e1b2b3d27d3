// SPDX-License-Identifier: MIT
//! The single error taxonomy every layer funnels into (§7, §10.2).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("compilation error in tool {tool}: {reason}")]
    Compilation { tool: String, reason: String },

    #[error("prerequisite not satisfied: {0}")]
    Prerequisite(String),

    #[error("parameter validation error: {0}")]
    ParameterValidation(String),

    #[error("policy violation: {} expression(s) failed", failed.len())]
    PolicyViolation { failed: Vec<String> },

    #[error("template render error: {0}")]
    TemplateRender(String),

    #[error("runner setup error: {0}")]
    RunnerSetup(String),

    #[error("runner execution error (exit code {exit_code:?})")]
    RunnerExecution {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("call cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// A short, stable name for the error kind, used for logging and for
    /// the direct-exec entrypoint's non-zero-exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Configuration(_) => "configuration",
            ToolError::Compilation { .. } => "compilation",
            ToolError::Prerequisite(_) => "prerequisite",
            ToolError::ParameterValidation(_) => "parameter_validation",
            ToolError::PolicyViolation { .. } => "policy_violation",
            ToolError::TemplateRender(_) => "template_render",
            ToolError::RunnerSetup(_) => "runner_setup",
            ToolError::RunnerExecution { .. } => "runner_execution",
            ToolError::Timeout(_) => "timeout",
            ToolError::Cancelled => "cancelled",
            ToolError::Internal(_) => "internal",
        }
    }
}
