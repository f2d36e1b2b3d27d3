// SPDX-License-Identifier: MIT
//! The direct runner: spawns the tool's shell on the host with no
//! confinement beyond the environment whitelist.

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::errors::ToolError;

use super::{materialize, run_child, Runner, RunRequest};

pub struct DirectRunner;

#[async_trait]
impl Runner for DirectRunner {
    async fn probe_implicit_requirements(&self) -> Result<(), ToolError> {
        Ok(())
    }

    async fn run(&self, request: RunRequest<'_>) -> Result<String, ToolError> {
        let (argv, _guard) = materialize(request.shell, request.command_text, request.materialize_as_tempfile)?;

        let mut cmd = Command::new(request.shell);
        cmd.args(&argv).env_clear().envs(request.env_pairs.iter().cloned());
        #[cfg(unix)]
        cmd.process_group(0);

        run_child(cmd, request.deadline, request.cancellation).await
    }
}
