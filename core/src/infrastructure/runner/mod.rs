// SPDX-License-Identifier: MIT
//! Runner strategy (§4.3): a uniform contract over four confinement
//! backends. Option bags are validated into typed [`RunnerOptions`] at
//! catalog-load time (see `infrastructure::catalog`) — nothing downstream
//! of that ever sees an untyped map again.

pub mod container;
pub mod direct;
pub mod linux_jail;
pub mod mac_sandbox;

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::ToolError;
use crate::domain::tool::{RunnerKind, RunnerOptions};

/// Everything the Tool Handler has already resolved for one call; runners
/// only add their own confinement layer on top of it.
pub struct RunRequest<'a> {
    pub shell: &'a str,
    pub command_text: &'a str,
    pub env_pairs: &'a [(String, String)],
    pub materialize_as_tempfile: bool,
    pub deadline: Instant,
    pub cancellation: CancellationToken,
    pub options: &'a RunnerOptions,
}

#[async_trait]
pub trait Runner: Send + Sync {
    /// Checked once before registration (§4.6): verifies the runner's own
    /// implicit dependencies, e.g. `bwrap` on `PATH` or a reachable Docker
    /// daemon. A tool is skipped, not fatal, if this fails.
    async fn probe_implicit_requirements(&self) -> Result<(), ToolError>;

    async fn run(&self, request: RunRequest<'_>) -> Result<String, ToolError>;
}

pub fn build(kind: RunnerKind) -> Box<dyn Runner> {
    match kind {
        RunnerKind::Exec => Box::new(direct::DirectRunner),
        RunnerKind::LinuxJail => Box::new(linux_jail::LinuxJailRunner),
        RunnerKind::MacSandbox => Box::new(mac_sandbox::MacSandboxRunner),
        RunnerKind::Container => Box::new(container::ContainerRunner::new()),
    }
}

/// Materialize `command_text` to a scratch file when requested, returning
/// the argv tail to hand to the shell and an optional guard that deletes
/// the file on drop (covering every exit path, including panics).
pub(crate) fn materialize(
    shell: &str,
    command_text: &str,
    as_tempfile: bool,
) -> Result<(Vec<String>, Option<tempfile::TempPath>), ToolError> {
    if !as_tempfile {
        return Ok((vec!["-c".to_string(), command_text.to_string()], None));
    }
    let mut file = tempfile::NamedTempFile::new()
        .map_err(|e| ToolError::RunnerSetup(format!("creating scratch file: {e}")))?;
    use std::io::Write;
    write!(file, "{command_text}").map_err(|e| ToolError::RunnerSetup(format!("writing scratch file: {e}")))?;
    let path = file.into_temp_path();
    let _ = shell; // shell is invoked by the caller with this path as argv
    Ok((vec![path.to_string_lossy().into_owned()], Some(path)))
}

/// Spawn `cmd`, race it against the deadline and cancellation signal, and
/// return its combined trimmed stdout+stderr. Shared by the direct, Linux
/// jail, and macOS sandbox runners, which differ only in how `cmd` itself
/// is wrapped.
pub(crate) async fn run_child(
    mut cmd: Command,
    deadline: Instant,
    cancellation: CancellationToken,
) -> Result<String, ToolError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::RunnerSetup(format!("spawning child: {e}")))?;

    let mut stdout = child.stdout.take().expect("stdout is piped");
    let mut stderr = child.stderr.take().expect("stderr is piped");

    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let io_fut = async {
        let (r1, r2) = tokio::join!(
            stdout.read_to_end(&mut out_buf),
            stderr.read_to_end(&mut err_buf),
        );
        r1.and(r2)
    };

    let remaining = deadline.saturating_duration_since(Instant::now());

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => {
            terminate_gracefully(&mut child).await;
            Err(ToolError::Cancelled)
        }
        _ = tokio::time::sleep(remaining) => {
            terminate_gracefully(&mut child).await;
            Err(ToolError::Timeout(remaining))
        }
        io_result = io_fut => {
            io_result.map_err(|e| ToolError::RunnerExecution {
                exit_code: None,
                output: format!("reading child output: {e}"),
            })?;
            let status = child
                .wait()
                .await
                .map_err(|e| ToolError::RunnerSetup(format!("waiting for child: {e}")))?;
            let mut combined = String::from_utf8_lossy(&out_buf).into_owned();
            combined.push_str(&String::from_utf8_lossy(&err_buf));
            let trimmed = combined.trim().to_string();
            if status.success() {
                Ok(trimmed)
            } else {
                Err(ToolError::RunnerExecution {
                    exit_code: status.code(),
                    output: trimmed,
                })
            }
        }
    }
}

/// SIGTERM, then SIGKILL after a short grace window, matching §5's
/// cancellation discipline. Every runner that reaches here spawns its
/// command in its own process group (`process_group(0)`), so signaling
/// `-pid` reaches the whole group — any pipeline stage or forked
/// grandchild the shell started, not just the shell itself. Falls back
/// to an immediate kill on platforms without POSIX signals.
#[cfg(unix)]
async fn terminate_gracefully(child: &mut tokio::process::Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    let grace = tokio::time::sleep(std::time::Duration::from_secs(5));
    tokio::select! {
        _ = child.wait() => {}
        _ = grace => {
            if let Some(pid) = child.id() {
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_gracefully(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

pub(crate) fn platform_os() -> &'static str {
    std::env::consts::OS
}

pub(crate) fn executable_on_path(name: &str) -> bool {
    which::which(name).is_ok()
}
