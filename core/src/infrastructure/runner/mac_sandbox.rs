// SPDX-License-Identifier: MIT
//! The macOS sandbox runner: generates a deny-by-default sandbox profile
//! and invokes the shell under `sandbox-exec`.

use std::io::Write;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::errors::ToolError;
use crate::domain::tool::RunnerOptions;

use super::{executable_on_path, materialize, run_child, Runner, RunRequest};

pub struct MacSandboxRunner;

#[async_trait]
impl Runner for MacSandboxRunner {
    async fn probe_implicit_requirements(&self) -> Result<(), ToolError> {
        if executable_on_path("sandbox-exec") {
            Ok(())
        } else {
            Err(ToolError::Prerequisite(
                "required executable 'sandbox-exec' not found on PATH".to_string(),
            ))
        }
    }

    async fn run(&self, request: RunRequest<'_>) -> Result<String, ToolError> {
        let (argv, _guard) = materialize(request.shell, request.command_text, request.materialize_as_tempfile)?;

        let mut profile_file = tempfile::NamedTempFile::new()
            .map_err(|e| ToolError::RunnerSetup(format!("creating sandbox profile file: {e}")))?;
        write!(profile_file, "{}", generate_profile(request.options))
            .map_err(|e| ToolError::RunnerSetup(format!("writing sandbox profile file: {e}")))?;
        let profile_path = profile_file.into_temp_path();

        let mut cmd = Command::new("sandbox-exec");
        cmd.arg("-f")
            .arg(&profile_path)
            .arg(request.shell)
            .args(&argv)
            .env_clear()
            .envs(request.env_pairs.iter().cloned());
        #[cfg(unix)]
        cmd.process_group(0);

        run_child(cmd, request.deadline, request.cancellation).await
    }
}

/// A minimal deny-by-default Seatbelt profile: process exec/fork and
/// read-only file access are allowed broadly (needed for the shell and any
/// interpreter it loads), writes are scoped to `allowed_paths`, and network
/// mirrors the Linux jail's `allow_networking` default of false.
fn generate_profile(options: &RunnerOptions) -> String {
    let mut lines = vec![
        "(version 1)".to_string(),
        "(deny default)".to_string(),
        "(allow process-fork)".to_string(),
        "(allow process-exec)".to_string(),
        "(allow file-read*)".to_string(),
        "(allow sysctl-read)".to_string(),
    ];
    for path in &options.allowed_paths {
        lines.push(format!("(allow file-write* (subpath \"{path}\"))"));
    }
    if options.allow_networking.unwrap_or(false) {
        lines.push("(allow network*)".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_denies_by_default() {
        let profile = generate_profile(&RunnerOptions::default());
        assert!(profile.contains("(deny default)"));
        assert!(!profile.contains("(allow network*)"));
    }

    #[test]
    fn profile_scopes_writes_to_allowed_paths() {
        let options = RunnerOptions {
            allowed_paths: vec!["/tmp/scratch".to_string()],
            ..Default::default()
        };
        let profile = generate_profile(&options);
        assert!(profile.contains(r#"(allow file-write* (subpath "/tmp/scratch"))"#));
    }
}
