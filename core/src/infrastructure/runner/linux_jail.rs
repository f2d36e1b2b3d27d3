// SPDX-License-Identifier: MIT
//! The Linux jail runner: wraps the shell invocation in `bwrap`
//! (bubblewrap), denying network and filesystem access by default.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::errors::ToolError;

use super::{executable_on_path, materialize, run_child, Runner, RunRequest};

pub struct LinuxJailRunner;

#[async_trait]
impl Runner for LinuxJailRunner {
    async fn probe_implicit_requirements(&self) -> Result<(), ToolError> {
        if executable_on_path("bwrap") {
            Ok(())
        } else {
            Err(ToolError::Prerequisite(
                "required executable 'bwrap' not found on PATH".to_string(),
            ))
        }
    }

    async fn run(&self, request: RunRequest<'_>) -> Result<String, ToolError> {
        let (argv, _guard) = materialize(request.shell, request.command_text, request.materialize_as_tempfile)?;

        let mut cmd = Command::new("bwrap");
        cmd.args(bwrap_args(request.shell, &argv, request.options))
            .env_clear()
            .envs(request.env_pairs.iter().cloned());
        #[cfg(unix)]
        cmd.process_group(0);

        run_child(cmd, request.deadline, request.cancellation).await
    }
}

fn bwrap_args(shell: &str, argv: &[String], options: &crate::domain::tool::RunnerOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--die-with-parent".to_string(),
        "--unshare-pid".to_string(),
        "--proc".to_string(),
        "/proc".to_string(),
        "--dev".to_string(),
        "/dev".to_string(),
        "--ro-bind".to_string(),
        "/usr".to_string(),
        "/usr".to_string(),
        "--ro-bind".to_string(),
        "/bin".to_string(),
        "/bin".to_string(),
        "--ro-bind".to_string(),
        "/lib".to_string(),
        "/lib".to_string(),
        "--ro-bind".to_string(),
        "/etc".to_string(),
        "/etc".to_string(),
    ];
    if Path::new("/lib64").exists() {
        args.extend(["--ro-bind".to_string(), "/lib64".to_string(), "/lib64".to_string()]);
    }

    if !options.allow_networking.unwrap_or(false) {
        args.push("--unshare-net".to_string());
    }

    for path in &options.allowed_paths {
        args.extend(["--bind".to_string(), path.clone(), path.clone()]);
    }

    args.push("--cap-drop".to_string());
    args.push("ALL".to_string());

    args.push("--".to_string());
    args.push(shell.to_string());
    args.extend(argv.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::RunnerOptions;

    #[test]
    fn denies_network_by_default() {
        let options = RunnerOptions::default();
        let args = bwrap_args("/bin/sh", &["-c".to_string(), "true".to_string()], &options);
        assert!(args.contains(&"--unshare-net".to_string()));
    }

    #[test]
    fn honors_allow_networking() {
        let options = RunnerOptions {
            allow_networking: Some(true),
            ..Default::default()
        };
        let args = bwrap_args("/bin/sh", &["-c".to_string(), "true".to_string()], &options);
        assert!(!args.contains(&"--unshare-net".to_string()));
    }

    #[test]
    fn binds_allowed_paths() {
        let options = RunnerOptions {
            allowed_paths: vec!["/tmp/scratch".to_string()],
            ..Default::default()
        };
        let args = bwrap_args("/bin/sh", &["-c".to_string(), "true".to_string()], &options);
        assert!(args.windows(2).any(|w| w == ["--bind".to_string(), "/tmp/scratch".to_string()]));
    }
}
