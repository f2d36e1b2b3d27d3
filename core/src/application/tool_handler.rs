// SPDX-License-Identifier: MIT
//! The per-tool object orchestrating the call algorithm (§4.4): merge
//! defaults, check required parameters, evaluate policy, render the
//! command, build the environment, invoke the runner, and apply the
//! output prefix. Holds no mutable shared state — safe to wrap in `Arc`
//! and call concurrently (§5).

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::errors::ToolError;
use crate::domain::invocation::InvocationContext;
use crate::domain::policy::CompiledPolicy;
use crate::domain::tool::{EnvEntry, ParamKind, ParamValue, ParameterSpec, RunnerCandidate, RunnerOptions, ToolDefinition};
use crate::infrastructure::policy_compiler;
use crate::infrastructure::runner::{self, Runner, RunRequest};
use crate::infrastructure::template_engine::{CompiledTemplate, TemplateEngine};

/// A `run.env[]` whitelist entry after its template (if any) has been
/// parsed once, at construction time.
enum EnvSpec {
    Inherit(String),
    Define { name: String, template: CompiledTemplate },
}

/// Direct calls apply this when the tool declares no timeout of its own;
/// transport-driven calls pass `None` and get no implicit ceiling (§4.4
/// step 8).
pub const DIRECT_CALL_DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Large enough that `Instant::now() + UNBOUNDED_TIMEOUT` never overflows
/// in practice, used when neither the tool nor the caller impose a
/// deadline — cancellation is still honored.
const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);

pub struct ToolHandler {
    pub name: String,
    params: BTreeMap<String, ParameterSpec>,
    command_template: CompiledTemplate,
    output_template: Option<CompiledTemplate>,
    env: Vec<EnvSpec>,
    runner: Box<dyn Runner>,
    runner_options: RunnerOptions,
    policy: CompiledPolicy,
    timeout: Option<Duration>,
    shell: String,
    engine: TemplateEngine,
}

impl ToolHandler {
    pub fn new(tool: ToolDefinition, chosen_runner: RunnerCandidate, default_shell: &str) -> Result<Self, ToolError> {
        let schema: BTreeMap<String, ParamKind> =
            tool.params.iter().map(|(name, spec)| (name.clone(), spec.kind)).collect();
        let policy = policy_compiler::compile(&tool.name, &tool.constraints, &schema)?;

        let mut engine = TemplateEngine::new();
        let command_template = engine.compile(&format!("{}::command", tool.name), &tool.command)?;
        let output_template = tool
            .output
            .as_ref()
            .and_then(|o| o.prefix.as_deref())
            .map(|prefix| engine.compile(&format!("{}::output_prefix", tool.name), prefix))
            .transpose()?;

        let env = tool
            .env
            .into_iter()
            .map(|entry| match entry {
                EnvEntry::Inherit(name) => Ok(EnvSpec::Inherit(name)),
                EnvEntry::Define { name, template } => {
                    let key = format!("{}::env::{name}", tool.name);
                    let compiled = engine.compile(&key, &template)?;
                    Ok(EnvSpec::Define { name, template: compiled })
                }
            })
            .collect::<Result<Vec<_>, ToolError>>()?;

        Ok(Self {
            name: tool.name,
            params: tool.params,
            command_template,
            output_template,
            env,
            runner: runner::build(chosen_runner.kind),
            runner_options: chosen_runner.options,
            policy,
            timeout: tool.timeout,
            shell: default_shell.to_string(),
            engine,
        })
    }

    /// Checked once before registration (§4.6): the runner's own implicit
    /// requirements (e.g. `bwrap` present, Docker reachable).
    pub async fn probe_runner_requirements(&self) -> Result<(), ToolError> {
        self.runner.probe_implicit_requirements().await
    }

    /// Run the call algorithm end-to-end. `implicit_default_timeout` is
    /// `Some(60s)` for the direct entrypoint and `None` for transport-driven
    /// calls, which rely solely on `cancellation` (§4.4 step 8).
    pub async fn call(
        &self,
        arguments: BTreeMap<String, ParamValue>,
        cancellation: CancellationToken,
        implicit_default_timeout: Option<Duration>,
    ) -> Result<String, ToolError> {
        // 1. merge caller-supplied arguments with declared defaults.
        let mut params = arguments;
        for (name, spec) in &self.params {
            if !params.contains_key(name) {
                if let Some(default) = &spec.default {
                    params.insert(name.clone(), default.clone());
                }
            }
        }

        // 2. verify every required parameter has a value.
        for (name, spec) in &self.params {
            if spec.is_effectively_required() && !params.contains_key(name) {
                return Err(ToolError::ParameterValidation(format!(
                    "missing required parameter '{name}'"
                )));
            }
        }

        // 3. verify every supplied value's runtime kind matches its
        // declared kind. Transports (MCP JSON arguments, `call`'s
        // key=value strings) coerce against the declared kind on their
        // own side, but the core re-checks here so a value that slipped
        // through unconverted never reaches the policy evaluator as a
        // confusing `ToolError::Internal`.
        for (name, value) in &params {
            if let Some(spec) = self.params.get(name) {
                if !kind_matches(value, spec.kind) {
                    return Err(ToolError::ParameterValidation(format!(
                        "parameter '{name}' is {:?}, expected {:?}",
                        value.kind(),
                        spec.kind
                    )));
                }
            }
        }

        // 4. evaluate the compiled policy.
        let outcome = policy_compiler::evaluate(&self.policy, &params)?;
        if !outcome.satisfied {
            return Err(ToolError::PolicyViolation { failed: outcome.failed });
        }

        // 5. render the command template.
        let command_text = self.engine.render(&self.command_template, &params)?;

        // 6. build the environment from the whitelist.
        let mut env_pairs = Vec::with_capacity(self.env.len());
        for spec in &self.env {
            match spec {
                EnvSpec::Inherit(name) => {
                    if let Ok(value) = std::env::var(name) {
                        env_pairs.push((name.clone(), value));
                    }
                }
                EnvSpec::Define { name, template } => {
                    let value = self.engine.render(template, &params)?;
                    env_pairs.push((name.clone(), value));
                }
            }
        }

        // 8. create the per-call deadline.
        let effective_timeout = self
            .timeout
            .or(implicit_default_timeout)
            .unwrap_or(UNBOUNDED_TIMEOUT);
        let invocation = InvocationContext::new(params.clone(), effective_timeout, cancellation);

        // 9. invoke the selected runner.
        let materialize_as_tempfile = command_text.contains('\n');
        let request = RunRequest {
            shell: &self.shell,
            command_text: &command_text,
            env_pairs: &env_pairs,
            materialize_as_tempfile,
            deadline: invocation.deadline,
            cancellation: invocation.cancellation.clone(),
            options: &self.runner_options,
        };
        let output = self.runner.run(request).await?;

        // 10. prepend the rendered output prefix, if configured.
        let final_output = match &self.output_template {
            Some(template) => {
                let prefix = self.engine.render(template, &params)?;
                format!("{prefix}\n\n{output}")
            }
            None => output,
        };

        // 11. return the final string.
        Ok(final_output)
    }
}

/// A declared `number` parameter also accepts an integer value (every
/// integer is a valid number); every other kind must match exactly.
fn kind_matches(value: &ParamValue, kind: ParamKind) -> bool {
    matches!(
        (kind, value),
        (ParamKind::String, ParamValue::String(_))
            | (ParamKind::Boolean, ParamValue::Boolean(_))
            | (ParamKind::Integer, ParamValue::Integer(_))
            | (ParamKind::Number, ParamValue::Number(_) | ParamValue::Integer(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::{OutputSpec, RunnerKind, Requirements};
    use std::collections::BTreeMap as Map;

    fn hello_world_tool() -> ToolDefinition {
        let mut params = Map::new();
        params.insert(
            "name".to_string(),
            ParameterSpec {
                kind: ParamKind::String,
                description: "who to greet".to_string(),
                required: true,
                default: None,
            },
        );
        ToolDefinition {
            name: "hello_world".to_string(),
            description: "greets the caller".to_string(),
            params,
            command: "echo 'Hello, {{name}}!'".to_string(),
            output: None,
            runners: vec![],
            constraints: vec!["name.size() <= 100 && !name.contains('/')".to_string()],
            env: vec![],
            timeout: None,
        }
    }

    fn exec_candidate() -> RunnerCandidate {
        RunnerCandidate {
            kind: RunnerKind::Exec,
            requirements: Requirements::default(),
            options: RunnerOptions::default(),
        }
    }

    #[tokio::test]
    async fn hello_world_scenario_succeeds() {
        let handler = ToolHandler::new(hello_world_tool(), exec_candidate(), "/bin/sh").unwrap();
        let mut args = Map::new();
        args.insert("name".to_string(), ParamValue::String("World".to_string()));
        let output = handler.call(args, CancellationToken::new(), Some(DIRECT_CALL_DEFAULT_TIMEOUT)).await.unwrap();
        assert_eq!(output, "Hello, World!");
    }

    #[tokio::test]
    async fn hello_world_scenario_blocks_oversized_name() {
        let handler = ToolHandler::new(hello_world_tool(), exec_candidate(), "/bin/sh").unwrap();
        let mut args = Map::new();
        args.insert("name".to_string(), ParamValue::String("a".repeat(150)));
        let err = handler
            .call(args, CancellationToken::new(), Some(DIRECT_CALL_DEFAULT_TIMEOUT))
            .await
            .unwrap_err();
        match err {
            ToolError::PolicyViolation { failed } => {
                assert_eq!(failed, vec!["name.size() <= 100 && !name.contains('/')"]);
            }
            other => panic!("expected PolicyViolation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hello_world_scenario_blocks_path_traversal_name() {
        let handler = ToolHandler::new(hello_world_tool(), exec_candidate(), "/bin/sh").unwrap();
        let mut args = Map::new();
        args.insert("name".to_string(), ParamValue::String("a/b".to_string()));
        let err = handler
            .call(args, CancellationToken::new(), Some(DIRECT_CALL_DEFAULT_TIMEOUT))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PolicyViolation { .. }));
    }

    #[tokio::test]
    async fn missing_required_parameter_is_rejected() {
        let handler = ToolHandler::new(hello_world_tool(), exec_candidate(), "/bin/sh").unwrap();
        let err = handler
            .call(Map::new(), CancellationToken::new(), Some(DIRECT_CALL_DEFAULT_TIMEOUT))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ParameterValidation(_)));
    }

    #[tokio::test]
    async fn environment_is_whitelisted_not_inherited() {
        let mut tool = hello_world_tool();
        tool.command = "env".to_string();
        tool.env = vec![EnvEntry::Define {
            name: "TEST_MESSAGE".to_string(),
            template: "{{name}}".to_string(),
        }];
        let handler = ToolHandler::new(tool, exec_candidate(), "/bin/sh").unwrap();
        let mut args = Map::new();
        args.insert("name".to_string(), ParamValue::String("hi".to_string()));
        let output = handler.call(args, CancellationToken::new(), Some(DIRECT_CALL_DEFAULT_TIMEOUT)).await.unwrap();
        // `/bin/sh` sets `PWD` itself on startup; everything else must come
        // only from the whitelist, never from the test process's own env.
        let lines: Vec<&str> = output.lines().filter(|l| !l.starts_with("PWD=")).collect();
        assert_eq!(lines, vec!["TEST_MESSAGE=hi"]);
    }

    #[tokio::test]
    async fn output_prefix_is_prepended() {
        let mut tool = hello_world_tool();
        tool.output = Some(OutputSpec {
            prefix: Some("Result for {{name}}:".to_string()),
            format: None,
        });
        let handler = ToolHandler::new(tool, exec_candidate(), "/bin/sh").unwrap();
        let mut args = Map::new();
        args.insert("name".to_string(), ParamValue::String("World".to_string()));
        let output = handler.call(args, CancellationToken::new(), Some(DIRECT_CALL_DEFAULT_TIMEOUT)).await.unwrap();
        assert_eq!(output, "Result for World:\n\nHello, World!");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_runner_error_not_a_policy_violation() {
        let mut tool = hello_world_tool();
        tool.command = "exit 3".to_string();
        tool.constraints = vec![];
        let handler = ToolHandler::new(tool, exec_candidate(), "/bin/sh").unwrap();
        let mut args = Map::new();
        args.insert("name".to_string(), ParamValue::String("World".to_string()));
        let err = handler.call(args, CancellationToken::new(), Some(DIRECT_CALL_DEFAULT_TIMEOUT)).await.unwrap_err();
        assert!(matches!(err, ToolError::RunnerExecution { exit_code: Some(3), .. }));
    }

    #[tokio::test]
    async fn timeout_kills_long_running_child() {
        let mut tool = hello_world_tool();
        tool.command = "sleep 5".to_string();
        tool.constraints = vec![];
        tool.timeout = Some(Duration::from_millis(50));
        let handler = ToolHandler::new(tool, exec_candidate(), "/bin/sh").unwrap();
        let mut args = Map::new();
        args.insert("name".to_string(), ParamValue::String("World".to_string()));
        let start = std::time::Instant::now();
        let err = handler.call(args, CancellationToken::new(), None).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(6));
    }
}
