// SPDX-License-Identifier: MIT
//! The tool catalog loader: external YAML representation → domain
//! [`ToolDefinition`]s, mirroring the YAML-manifest-to-domain translation
//! this codebase already uses for workflow manifests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::ToolError;
use crate::domain::tool::{
    EnvEntry, OutputSpec, ParamKind, ParamValue, ParameterSpec, Requirements, RunnerCandidate,
    RunnerKind, RunnerOptions, ToolDefinition, RESERVED_OPTION_KEYS,
};

const ENV_VAR: &str = "MCP_SHELL_CATALOG";

/// Resolve the catalog path using the discovery order: explicit flag, the
/// `MCP_SHELL_CATALOG` environment variable, `./tools.yaml`,
/// `~/.config/mcp-shell-bridge/tools.yaml`, `/etc/mcp-shell-bridge/tools.yaml`.
pub fn discover_catalog_path(explicit: Option<&Path>) -> Result<PathBuf, ToolError> {
    let mut checked = Vec::new();

    if let Some(path) = explicit {
        checked.push(path.display().to_string());
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    if let Ok(env_path) = std::env::var(ENV_VAR) {
        let path = PathBuf::from(&env_path);
        checked.push(path.display().to_string());
        if path.exists() {
            return Ok(path);
        }
    }

    let cwd_candidate = PathBuf::from("tools.yaml");
    checked.push(cwd_candidate.display().to_string());
    if cwd_candidate.exists() {
        return Ok(cwd_candidate);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join("mcp-shell-bridge").join("tools.yaml");
        checked.push(candidate.display().to_string());
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let system_candidate = PathBuf::from("/etc/mcp-shell-bridge/tools.yaml");
    checked.push(system_candidate.display().to_string());
    if system_candidate.exists() {
        return Ok(system_candidate);
    }

    Err(ToolError::Configuration(format!(
        "no tool catalog found; checked: {}",
        checked.join(", ")
    )))
}

const DEFAULT_SHELL: &str = "/bin/sh";

/// Load and validate the catalog at `path`, producing the catalog-wide
/// default shell plus the domain tool list.
pub fn load_catalog(path: &Path) -> Result<(String, Vec<ToolDefinition>), ToolError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ToolError::Configuration(format!("reading {}: {e}", path.display())))?;
    parse_catalog_with_shell(&text)
}

/// Parse a catalog from an in-memory YAML document, returning only the
/// tool list with the default shell applied (split out for tests that
/// predate `run.shell` support).
pub fn parse_catalog(yaml: &str) -> Result<Vec<ToolDefinition>, ToolError> {
    parse_catalog_with_shell(yaml).map(|(_, tools)| tools)
}

/// Parse a catalog, also surfacing `mcp.run.shell` (defaults to `/bin/sh`
/// if the `run` section or `shell` key is absent).
pub fn parse_catalog_with_shell(yaml: &str) -> Result<(String, Vec<ToolDefinition>), ToolError> {
    let manifest: CatalogYaml = serde_yaml::from_str(yaml)
        .map_err(|e| ToolError::Configuration(format!("invalid catalog YAML: {e}")))?;

    let shell = manifest
        .mcp
        .run
        .as_ref()
        .and_then(|run| run.shell.clone())
        .unwrap_or_else(|| DEFAULT_SHELL.to_string());

    let mut tools = Vec::with_capacity(manifest.mcp.tools.len());
    let mut seen = std::collections::BTreeSet::new();
    for tool_yaml in manifest.mcp.tools {
        if !seen.insert(tool_yaml.name.clone()) {
            return Err(ToolError::Configuration(format!(
                "duplicate tool name '{}'",
                tool_yaml.name
            )));
        }
        tools.push(convert_tool(tool_yaml)?);
    }
    Ok((shell, tools))
}

// ---------------------------------------------------------------------
// External YAML representation
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogYaml {
    mcp: McpSectionYaml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct McpSectionYaml {
    #[serde(default)]
    description: Option<String>,
    /// Catalog-wide defaults; currently only the default shell.
    #[serde(default)]
    run: Option<GlobalRunYaml>,
    #[serde(default)]
    tools: Vec<ToolYaml>,
    /// Prompt/description rendering is an external collaborator (§1
    /// Out of scope); the key is accepted so existing catalogs still
    /// parse, and discarded.
    #[serde(default)]
    #[allow(dead_code)]
    prompts: serde_yaml::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GlobalRunYaml {
    #[serde(default)]
    shell: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolYaml {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    params: BTreeMap<String, ParamSpecYaml>,
    #[serde(default)]
    constraints: Vec<String>,
    run: ToolRunYaml,
    #[serde(default)]
    output: Option<OutputYaml>,
    #[serde(default, with = "humantime_serde::option")]
    timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParamSpecYaml {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolRunYaml {
    command: String,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    runners: Vec<RunnerYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunnerYaml {
    name: String,
    #[serde(default)]
    requirements: RequirementsYaml,
    #[serde(default)]
    options: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RequirementsYaml {
    #[serde(default)]
    executables: Vec<String>,
    #[serde(default)]
    os: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OutputYaml {
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

// ---------------------------------------------------------------------
// Conversion to the domain model
// ---------------------------------------------------------------------

fn convert_tool(yaml: ToolYaml) -> Result<ToolDefinition, ToolError> {
    let mut params = BTreeMap::new();
    for (name, spec) in yaml.params {
        params.insert(name.clone(), convert_param_spec(&yaml.name, &name, spec)?);
    }

    let env = yaml
        .run
        .env
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, template)) => EnvEntry::Define {
                name: name.to_string(),
                template: template.to_string(),
            },
            None => EnvEntry::Inherit(entry),
        })
        .collect();

    let runners = yaml
        .run
        .runners
        .into_iter()
        .map(|r| convert_runner(&yaml.name, r))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ToolDefinition {
        name: yaml.name,
        description: yaml.description,
        params,
        command: yaml.run.command,
        output: yaml.output.map(|o| OutputSpec {
            prefix: o.prefix,
            format: o.format,
        }),
        runners,
        constraints: yaml.constraints,
        env,
        timeout: yaml.timeout,
    })
}

fn convert_param_spec(
    tool: &str,
    param: &str,
    yaml: ParamSpecYaml,
) -> Result<ParameterSpec, ToolError> {
    let kind = match yaml.kind.as_deref().unwrap_or("string") {
        "string" => ParamKind::String,
        "number" => ParamKind::Number,
        "integer" => ParamKind::Integer,
        "boolean" => ParamKind::Boolean,
        other => {
            return Err(ToolError::Configuration(format!(
                "tool '{tool}' parameter '{param}': unknown parameter kind '{other}'"
            )))
        }
    };
    let default = yaml
        .default
        .map(|v| coerce_default(tool, param, kind, v))
        .transpose()?;
    Ok(ParameterSpec {
        kind,
        description: yaml.description,
        required: yaml.required,
        default,
    })
}

fn coerce_default(
    tool: &str,
    param: &str,
    kind: ParamKind,
    value: serde_yaml::Value,
) -> Result<ParamValue, ToolError> {
    let bad = || {
        ToolError::Configuration(format!(
            "tool '{tool}' parameter '{param}': default value does not match declared kind {kind:?}"
        ))
    };
    match kind {
        ParamKind::String => value.as_str().map(|s| ParamValue::String(s.to_string())).ok_or_else(bad),
        ParamKind::Number => value.as_f64().map(ParamValue::Number).ok_or_else(bad),
        ParamKind::Integer => value.as_i64().map(ParamValue::Integer).ok_or_else(bad),
        ParamKind::Boolean => value.as_bool().map(ParamValue::Boolean).ok_or_else(bad),
    }
}

fn convert_runner(tool: &str, yaml: RunnerYaml) -> Result<RunnerCandidate, ToolError> {
    let kind = match yaml.name.as_str() {
        "exec" => RunnerKind::Exec,
        "linux-jail" => RunnerKind::LinuxJail,
        "mac-sandbox" => RunnerKind::MacSandbox,
        "container" => RunnerKind::Container,
        other => {
            return Err(ToolError::Configuration(format!(
                "tool '{tool}': unknown runner variant '{other}'"
            )))
        }
    };
    let requirements = Requirements {
        executables: yaml.requirements.executables,
        os: yaml.requirements.os,
    };
    let options = convert_runner_options(tool, yaml.options)?;
    Ok(RunnerCandidate {
        kind,
        requirements,
        options,
    })
}

fn convert_runner_options(
    tool: &str,
    raw: BTreeMap<String, serde_yaml::Value>,
) -> Result<RunnerOptions, ToolError> {
    let mut options = RunnerOptions {
        memory_swappiness: -1,
        ..RunnerOptions::default()
    };

    for (key, value) in raw {
        if !RESERVED_OPTION_KEYS.contains(&key.as_str()) {
            return Err(ToolError::Configuration(format!(
                "tool '{tool}': unknown runner option '{key}'"
            )));
        }
        let bad_value = || {
            ToolError::Configuration(format!(
                "tool '{tool}': runner option '{key}' has the wrong shape"
            ))
        };
        match key.as_str() {
            "profile" => options.profile = Some(value.as_str().ok_or_else(bad_value)?.to_string()),
            "allow_networking" => {
                options.allow_networking = Some(value.as_bool().ok_or_else(bad_value)?)
            }
            "allowed_paths" => options.allowed_paths = string_sequence(&value).ok_or_else(bad_value)?,
            "image" => options.image = Some(value.as_str().ok_or_else(bad_value)?.to_string()),
            "user" => options.user = Some(value.as_str().ok_or_else(bad_value)?.to_string()),
            "workdir" => options.workdir = Some(value.as_str().ok_or_else(bad_value)?.to_string()),
            "mounts" => options.mounts = string_sequence(&value).ok_or_else(bad_value)?,
            "network" => options.network = Some(value.as_str().ok_or_else(bad_value)?.to_string()),
            "memory" => options.memory = Some(value.as_str().ok_or_else(bad_value)?.to_string()),
            "memory_swap" => options.memory_swap = Some(value.as_str().ok_or_else(bad_value)?.to_string()),
            "memory_swappiness" => options.memory_swappiness = value.as_i64().ok_or_else(bad_value)?,
            "cap_add" => options.cap_add = string_sequence(&value).ok_or_else(bad_value)?,
            "cap_drop" => options.cap_drop = string_sequence(&value).ok_or_else(bad_value)?,
            "dns" => options.dns = string_sequence(&value).ok_or_else(bad_value)?,
            "dns_search" => options.dns_search = string_sequence(&value).ok_or_else(bad_value)?,
            "platform" => options.platform = Some(value.as_str().ok_or_else(bad_value)?.to_string()),
            "prepare_command" => {
                options.prepare_command = Some(value.as_str().ok_or_else(bad_value)?.to_string())
            }
            "docker_run_opts" => {
                options.docker_run_opts = Some(value.as_str().ok_or_else(bad_value)?.to_string())
            }
            _ => unreachable!("checked against RESERVED_OPTION_KEYS above"),
        }
    }
    Ok(options)
}

fn string_sequence(value: &serde_yaml::Value) -> Option<Vec<String>> {
    value
        .as_sequence()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD_YAML: &str = r#"
mcp:
  description: demo catalog
  tools:
    - name: hello_world
      description: greets the caller
      params:
        name:
          type: string
          description: who to greet
          required: true
      constraints:
        - "name.size() <= 100 && !name.contains('/')"
      run:
        command: "echo Hello, {{name}}!"
        env: []
        runners:
          - name: exec
"#;

    #[test]
    fn parses_hello_world_scenario() {
        let tools = parse_catalog(HELLO_WORLD_YAML).unwrap();
        assert_eq!(tools.len(), 1);
        let tool = &tools[0];
        assert_eq!(tool.name, "hello_world");
        assert_eq!(tool.constraints.len(), 1);
        assert_eq!(tool.runners[0].kind, RunnerKind::Exec);
        assert_eq!(tool.runners[0].options.memory_swappiness, -1);
    }

    #[test]
    fn default_shell_is_bin_sh_when_unspecified() {
        let (shell, _) = parse_catalog_with_shell(HELLO_WORLD_YAML).unwrap();
        assert_eq!(shell, "/bin/sh");
    }

    #[test]
    fn run_shell_overrides_the_default() {
        let yaml = r#"
mcp:
  description: test
  run:
    shell: /bin/bash
  tools:
    - name: hello_world
      run:
        command: echo hi
"#;
        let (shell, _) = parse_catalog_with_shell(yaml).unwrap();
        assert_eq!(shell, "/bin/bash");
    }

    #[test]
    fn duplicate_tool_names_are_rejected() {
        let yaml = format!("{HELLO_WORLD_YAML}\n  tools:\n    - name: hello_world\n      run:\n        command: echo hi\n");
        // construct a catalog with the tool listed twice instead of relying on string surgery above
        let doubled = r#"
mcp:
  tools:
    - name: dup
      run:
        command: echo hi
    - name: dup
      run:
        command: echo bye
"#;
        let _ = yaml;
        let err = parse_catalog(doubled).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn unknown_parameter_kind_is_rejected() {
        let yaml = r#"
mcp:
  tools:
    - name: bad
      params:
        x:
          type: wat
      run:
        command: echo hi
"#;
        let err = parse_catalog(yaml).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn unknown_runner_variant_is_rejected() {
        let yaml = r#"
mcp:
  tools:
    - name: bad
      run:
        command: echo hi
        runners:
          - name: firecracker
"#;
        let err = parse_catalog(yaml).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn reserved_runner_option_keys_are_typed_and_unknown_keys_rejected() {
        let yaml = r#"
mcp:
  tools:
    - name: container_tool
      run:
        command: echo hi
        runners:
          - name: container
            options:
              image: alpine:latest
              allow_networking: true
              mounts:
                - "/host:/container:ro"
"#;
        let tools = parse_catalog(yaml).unwrap();
        let opts = &tools[0].runners[0].options;
        assert_eq!(opts.image.as_deref(), Some("alpine:latest"));
        assert_eq!(opts.allow_networking, Some(true));
        assert_eq!(opts.mounts, vec!["/host:/container:ro".to_string()]);

        let bad_yaml = r#"
mcp:
  tools:
    - name: container_tool
      run:
        command: echo hi
        runners:
          - name: container
            options:
              not_a_real_option: 1
"#;
        let err = parse_catalog(bad_yaml).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn env_whitelist_parses_inherit_and_define_forms() {
        let yaml = r#"
mcp:
  tools:
    - name: envy
      run:
        command: echo hi
        env:
          - "HOME"
          - "TEST_MESSAGE={{message}}"
"#;
        let tools = parse_catalog(yaml).unwrap();
        let env = &tools[0].env;
        assert!(matches!(&env[0], EnvEntry::Inherit(n) if n == "HOME"));
        assert!(matches!(&env[1], EnvEntry::Define { name, template } if name == "TEST_MESSAGE" && template == "{{message}}"));
    }

    #[test]
    fn timeout_parses_human_duration() {
        let yaml = r#"
mcp:
  tools:
    - name: slow
      timeout: 30s
      run:
        command: sleep 30
"#;
        let tools = parse_catalog(yaml).unwrap();
        assert_eq!(tools[0].timeout, Some(Duration::from_secs(30)));
    }
}
