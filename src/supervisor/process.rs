//! Child process helpers: short setup commands and the supervised agent run.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::SetupError;

/// Captured result of a short-lived setup command.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn and wait for a process, capturing its output.
pub async fn run_process(program: &str, args: &[String]) -> Result<ProcessOutput, SetupError> {
    let mut cmd = Command::new(program);
    // A dropped run future must not leave setup commands behind.
    cmd.kill_on_drop(true);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| SetupError::Spawn(format!("{program}: {e}")))?;

    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Turn a non-zero exit into a one-line description with context.
pub fn ensure_success(output: ProcessOutput, context: &str) -> Result<ProcessOutput, String> {
    if output.exit_code == 0 {
        return Ok(output);
    }
    let mut details = if output.stderr.trim().is_empty() {
        output.stdout.trim().to_string()
    } else {
        output.stderr.trim().to_string()
    };
    if details.is_empty() {
        details = format!("command exited with {}", output.exit_code);
    }
    Err(format!("{context}: {details}"))
}

/// Why the supervisor stopped a child before it exited by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    Timeout(Duration),
    Aborted,
}

impl KillReason {
    /// Text recorded in the synthesized interrupted result.
    pub fn describe(&self) -> String {
        match self {
            Self::Timeout(limit) => format!("timed out after {}", format_duration(*limit)),
            Self::Aborted => "aborted by caller".to_string(),
        }
    }
}

/// How the agent process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, when the process exited on its own with one.
    pub code: Option<i32>,
    pub killed: Option<KillReason>,
}

/// A launched agent: two output streams and a completion signal.
///
/// `done` resolves once the process has exited or been killed. Output still
/// buffered in the pipes can be read after that.
#[derive(Debug)]
pub struct AgentProcess {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub done: JoinHandle<ExitOutcome>,
}

/// Spawn `command` with piped output under a watchdog that kills it when
/// `timeout` elapses or `cancel` flips to `true`.
pub fn spawn_supervised(
    mut command: Command,
    timeout: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<AgentProcess, SetupError> {
    let program = command.as_std().get_program().to_string_lossy().to_string();
    command
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| SetupError::Spawn(format!("{program}: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SetupError::Spawn(format!("{program}: stdout was not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SetupError::Spawn(format!("{program}: stderr was not captured")))?;

    let done = tokio::spawn(watch_child(child, timeout, cancel));
    Ok(AgentProcess {
        stdout,
        stderr,
        done,
    })
}

async fn watch_child(
    mut child: Child,
    timeout: Option<Duration>,
    mut cancel: Option<watch::Receiver<bool>>,
) -> ExitOutcome {
    let deadline = async {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };

    let reason = tokio::select! {
        status = child.wait() => {
            let code = match status {
                Ok(status) => status.code(),
                Err(err) => {
                    tracing::warn!(error = %err, "waiting on agent process failed");
                    None
                }
            };
            return ExitOutcome { code, killed: None };
        }
        limit = deadline => KillReason::Timeout(limit),
        _ = wait_for_cancellation(&mut cancel) => KillReason::Aborted,
    };

    tracing::info!(reason = %reason.describe(), "stopping agent process");
    if let Err(err) = child.kill().await {
        tracing::warn!(error = %err, "failed to kill agent process");
    }
    ExitOutcome {
        code: None,
        killed: Some(reason),
    }
}

/// Resolve once cancellation is requested. A missing receiver, or a sender
/// dropped without cancelling, never resolves.
async fn wait_for_cancellation(cancel: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Human-oriented duration formatting used in kill reasons.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    if secs == 0 {
        return format!("{millis}ms");
    }
    if millis == 0 {
        if secs % 3600 == 0 {
            return format!("{}h", secs / 3600);
        }
        if secs % 60 == 0 {
            return format!("{}m", secs / 60);
        }
        return format!("{secs}s");
    }
    format!("{secs}.{millis:03}s")
}
