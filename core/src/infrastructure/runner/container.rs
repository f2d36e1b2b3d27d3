// SPDX-License-Identifier: MIT
//! The container runner: launches a short-lived container via the Docker
//! Engine API, the same API this codebase already speaks for agent
//! sandboxes.

use std::time::Instant;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, RemoveContainerOptionsBuilder,
};
use bollard::Docker;
use futures::StreamExt;

use crate::domain::errors::ToolError;
use crate::domain::tool::RunnerOptions;

use super::{materialize, Runner, RunRequest};

pub struct ContainerRunner;

impl ContainerRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ContainerRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn connect() -> Result<Docker, ToolError> {
    Docker::connect_with_local_defaults()
        .map_err(|e| ToolError::RunnerSetup(format!("connecting to Docker daemon: {e}")))
}

/// Forces removal of the container on drop, so a container created inside
/// `run_in_container` is still torn down when that future is dropped
/// mid-flight by the deadline/cancellation race in `run` (§5) — not just on
/// its own success/error return. `Drop` can't await, so cleanup runs as a
/// detached task; its result is unobserved either way.
struct ContainerGuard {
    docker: Docker,
    name: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let docker = self.docker.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let _ = docker
                .remove_container(&name, Some(RemoveContainerOptionsBuilder::new().force(true).build()))
                .await;
        });
    }
}

#[async_trait]
impl Runner for ContainerRunner {
    async fn probe_implicit_requirements(&self) -> Result<(), ToolError> {
        let docker = connect()?;
        docker
            .ping()
            .await
            .map_err(|e| ToolError::Prerequisite(format!("Docker daemon unreachable: {e}")))?;
        Ok(())
    }

    async fn run(&self, request: RunRequest<'_>) -> Result<String, ToolError> {
        let image = request
            .options
            .image
            .clone()
            .ok_or_else(|| ToolError::RunnerSetup("container runner requires an 'image' option".to_string()))?;

        let docker = connect()?;
        let (argv, temp_guard) = materialize(request.shell, request.command_text, request.materialize_as_tempfile)?;

        let remaining = request.deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            biased;
            _ = request.cancellation.cancelled() => Err(ToolError::Cancelled),
            result = run_in_container(&docker, &image, request.shell, &argv, request.env_pairs, request.options, temp_guard.as_deref()) => result,
            _ = tokio::time::sleep(remaining) => Err(ToolError::Timeout(remaining)),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_in_container(
    docker: &Docker,
    image: &str,
    shell: &str,
    argv: &[String],
    env_pairs: &[(String, String)],
    options: &RunnerOptions,
    host_script_path: Option<&std::path::Path>,
) -> Result<String, ToolError> {
    ensure_image_present(docker, image).await?;

    let host_config = build_host_config(options, host_script_path)?;
    let container_name = format!("mcp-shell-{}", uuid::Uuid::new_v4());

    let mut create_options_builder = CreateContainerOptionsBuilder::new().name(&container_name);
    if let Some(platform) = &options.platform {
        create_options_builder = create_options_builder.platform(platform);
    }
    let create_options = create_options_builder.build();
    let env: Vec<String> = env_pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();

    let container_config = ContainerCreateBody {
        image: Some(image.to_string()),
        tty: Some(false),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        cmd: Some(vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()]),
        env: Some(env.clone()),
        user: options.user.clone(),
        working_dir: options.workdir.clone(),
        host_config: Some(host_config),
        ..Default::default()
    };

    docker
        .create_container(Some(create_options), container_config)
        .await
        .map_err(|e| ToolError::RunnerSetup(format!("creating container: {e}")))?;
    let _guard = ContainerGuard { docker: docker.clone(), name: container_name.clone() };

    docker
        .start_container(&container_name, None)
        .await
        .map_err(|e| ToolError::RunnerSetup(format!("starting container: {e}")))?;

    if let Some(prepare) = &options.prepare_command {
        exec_in_container(docker, &container_name, &["sh".to_string(), "-c".to_string(), prepare.clone()]).await?;
    }

    let mut cmd = vec![shell.to_string()];
    cmd.extend(argv.iter().cloned());
    exec_in_container(docker, &container_name, &cmd).await
}

async fn ensure_image_present(docker: &Docker, image: &str) -> Result<(), ToolError> {
    if docker.inspect_image(image).await.is_ok() {
        return Ok(());
    }
    let pull_options = Some(CreateImageOptionsBuilder::new().from_image(image).build());
    let mut stream = docker.create_image(pull_options, None, None);
    while let Some(result) = stream.next().await {
        result.map_err(|e| ToolError::RunnerSetup(format!("pulling image '{image}': {e}")))?;
    }
    Ok(())
}

async fn exec_in_container(docker: &Docker, container_name: &str, cmd: &[String]) -> Result<String, ToolError> {
    let exec = docker
        .create_exec(
            container_name,
            CreateExecOptions {
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                cmd: Some(cmd.to_vec()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| ToolError::RunnerSetup(format!("creating exec: {e}")))?;

    let start_result = docker
        .start_exec(&exec.id, Some(StartExecOptions { detach: false, ..Default::default() }))
        .await
        .map_err(|e| ToolError::RunnerExecution {
            exit_code: None,
            output: format!("starting exec: {e}"),
        })?;

    let mut combined = String::new();
    if let StartExecResults::Attached { mut output, .. } = start_result {
        while let Some(chunk) = output.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    combined.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(ToolError::RunnerExecution {
                        exit_code: None,
                        output: format!("reading exec output: {e}"),
                    })
                }
            }
        }
    }

    let inspect = docker
        .inspect_exec(&exec.id)
        .await
        .map_err(|e| ToolError::RunnerSetup(format!("inspecting exec: {e}")))?;
    let exit_code = inspect.exit_code.map(|c| c as i32);

    let trimmed = combined.trim().to_string();
    match exit_code {
        Some(0) | None => Ok(trimmed),
        Some(code) => Err(ToolError::RunnerExecution {
            exit_code: Some(code),
            output: trimmed,
        }),
    }
}

fn build_host_config(
    options: &RunnerOptions,
    host_script_path: Option<&std::path::Path>,
) -> Result<bollard::service::HostConfig, ToolError> {
    let mut binds: Vec<String> = options.mounts.clone();
    if let Some(path) = host_script_path {
        let path_str = path.to_string_lossy();
        binds.push(format!("{path_str}:{path_str}:ro"));
    }

    let mut host_config = bollard::service::HostConfig {
        binds: if binds.is_empty() { None } else { Some(binds) },
        cap_add: if options.cap_add.is_empty() { None } else { Some(options.cap_add.clone()) },
        cap_drop: if options.cap_drop.is_empty() { None } else { Some(options.cap_drop.clone()) },
        dns: if options.dns.is_empty() { None } else { Some(options.dns.clone()) },
        dns_search: if options.dns_search.is_empty() { None } else { Some(options.dns_search.clone()) },
        memory_swappiness: Some(options.memory_swappiness),
        ..Default::default()
    };

    if !options.allow_networking.unwrap_or(true) {
        host_config.network_mode = Some("none".to_string());
    } else if let Some(network) = &options.network {
        host_config.network_mode = Some(network.clone());
    }

    if let Some(memory) = &options.memory {
        host_config.memory = Some(parse_memory_bytes(memory)?);
    }
    if let Some(memory_swap) = &options.memory_swap {
        host_config.memory_swap = Some(parse_memory_bytes(memory_swap)?);
    }

    if let Some(raw) = &options.docker_run_opts {
        apply_docker_run_opts(&mut host_config, raw)?;
    }

    Ok(host_config)
}

/// Apply a small, whitespace-tokenized subset of real `docker run` flags not
/// otherwise covered by a dedicated `RunnerOptions` field. Rejects anything
/// it doesn't recognize rather than silently ignoring it.
fn apply_docker_run_opts(host_config: &mut bollard::service::HostConfig, raw: &str) -> Result<(), ToolError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "--read-only" => {
                host_config.readonly_rootfs = Some(true);
                i += 1;
            }
            "--privileged" => {
                host_config.privileged = Some(true);
                i += 1;
            }
            "--security-opt" => {
                let value = tokens.get(i + 1).ok_or_else(|| {
                    ToolError::Configuration("docker_run_opts: --security-opt requires a value".to_string())
                })?;
                host_config.security_opt.get_or_insert_with(Vec::new).push(value.to_string());
                i += 2;
            }
            "--pids-limit" => {
                let value = tokens.get(i + 1).ok_or_else(|| {
                    ToolError::Configuration("docker_run_opts: --pids-limit requires a value".to_string())
                })?;
                host_config.pids_limit = Some(
                    value
                        .parse()
                        .map_err(|_| ToolError::Configuration(format!("docker_run_opts: invalid --pids-limit '{value}'")))?,
                );
                i += 2;
            }
            "--shm-size" => {
                let value = tokens.get(i + 1).ok_or_else(|| {
                    ToolError::Configuration("docker_run_opts: --shm-size requires a value".to_string())
                })?;
                host_config.shm_size = Some(parse_memory_bytes(value)?);
                i += 2;
            }
            other => {
                return Err(ToolError::Configuration(format!("docker_run_opts: unsupported flag '{other}'")));
            }
        }
    }
    Ok(())
}

/// Parse a Docker-style human memory quantity (`"128m"`, `"1g"`, `"512k"`,
/// a bare byte count) into bytes.
fn parse_memory_bytes(raw: &str) -> Result<i64, ToolError> {
    let raw = raw.trim();
    let (digits, suffix) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len()));
    let value: i64 = digits
        .parse()
        .map_err(|_| ToolError::RunnerSetup(format!("invalid memory quantity '{raw}'")))?;
    let multiplier: i64 = match suffix.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        other => return Err(ToolError::RunnerSetup(format!("unrecognized memory unit '{other}'"))),
    };
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_byte_counts() {
        assert_eq!(parse_memory_bytes("512").unwrap(), 512);
    }

    #[test]
    fn parses_suffixed_quantities() {
        assert_eq!(parse_memory_bytes("128m").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("512k").unwrap(), 512 * 1024);
    }

    #[test]
    fn rejects_unknown_units() {
        assert!(parse_memory_bytes("5x").is_err());
    }

    #[test]
    fn host_config_defaults_memory_swappiness_to_unset() {
        let options = RunnerOptions { memory_swappiness: -1, ..Default::default() };
        let host_config = build_host_config(&options, None).unwrap();
        assert_eq!(host_config.memory_swappiness, Some(-1));
    }

    #[test]
    fn host_config_denies_network_when_allow_networking_is_false() {
        let options = RunnerOptions {
            allow_networking: Some(false),
            ..Default::default()
        };
        let host_config = build_host_config(&options, None).unwrap();
        assert_eq!(host_config.network_mode.as_deref(), Some("none"));
    }

    #[test]
    fn docker_run_opts_applies_read_only_and_privileged() {
        let options = RunnerOptions {
            docker_run_opts: Some("--read-only --privileged".to_string()),
            ..Default::default()
        };
        let host_config = build_host_config(&options, None).unwrap();
        assert_eq!(host_config.readonly_rootfs, Some(true));
        assert_eq!(host_config.privileged, Some(true));
    }

    #[test]
    fn docker_run_opts_collects_repeated_security_opt() {
        let options = RunnerOptions {
            docker_run_opts: Some("--security-opt no-new-privileges --security-opt seccomp=unconfined".to_string()),
            ..Default::default()
        };
        let host_config = build_host_config(&options, None).unwrap();
        assert_eq!(
            host_config.security_opt,
            Some(vec!["no-new-privileges".to_string(), "seccomp=unconfined".to_string()])
        );
    }

    #[test]
    fn docker_run_opts_parses_pids_limit_and_shm_size() {
        let options = RunnerOptions {
            docker_run_opts: Some("--pids-limit 128 --shm-size 256m".to_string()),
            ..Default::default()
        };
        let host_config = build_host_config(&options, None).unwrap();
        assert_eq!(host_config.pids_limit, Some(128));
        assert_eq!(host_config.shm_size, Some(256 * 1024 * 1024));
    }

    #[test]
    fn docker_run_opts_rejects_unrecognized_flag() {
        let options = RunnerOptions {
            docker_run_opts: Some("--cap-add NET_ADMIN".to_string()),
            ..Default::default()
        };
        assert!(build_host_config(&options, None).is_err());
    }

    #[test]
    fn docker_run_opts_rejects_missing_value() {
        let options = RunnerOptions {
            docker_run_opts: Some("--pids-limit".to_string()),
            ..Default::default()
        };
        assert!(build_host_config(&options, None).is_err());
    }
}
