// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent subprocess execution.
//!
//! Spawns the external agent CLI non-interactively, streams its output
//! as it arrives, and enforces a hard timeout. The process never
//! inherits interactive I/O (stdin is null) and must not be able to open
//! a GUI — display-server variables are stripped from its environment.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Failure text the provider sometimes embeds in output while still
/// exiting 0. Any match turns a "successful" run into a failure.
const FAILURE_SIGNATURES: &[&str] = &[
    "rate limit",
    "rate_limit_error",
    "overloaded_error",
    "resource_exhausted",
    "usage limit reached",
    "credit balance is too low",
    "quota exceeded",
];

/// First failure signature found in the given output, if any.
pub fn failure_signature(output: &str) -> Option<&'static str> {
    let haystack = output.to_lowercase();
    FAILURE_SIGNATURES
        .iter()
        .find(|sig| haystack.contains(*sig))
        .copied()
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn agent process: {0}")]
    Spawn(std::io::Error),
    #[error("agent process timed out after {0:?}")]
    Timeout(Duration),
    #[error("agent i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// How to invoke a provider's agent CLI.
///
/// `{mode}` and `{prompt}` placeholders in the argument list are
/// substituted at execution time, so the command shape stays
/// configuration rather than code.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AgentCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn render(&self, mode: &str, prompt: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{mode}", mode).replace("{prompt}", prompt))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub mode: String,
    pub prompt: String,
    pub work_dir: PathBuf,
    pub timeout: Duration,
}

/// Incremental output from a running agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Output(String),
    ErrorOutput(String),
}

/// Final result of one agent invocation.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub success: bool,
    /// Combined stdout + stderr text
    pub output: String,
    pub error: Option<String>,
}

impl ExecOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }
}

/// Executes one agent invocation, streaming incremental output events.
#[async_trait]
pub trait AgentRunner: Send + Sync + 'static {
    async fn execute(
        &self,
        req: &ExecRequest,
        events: mpsc::Sender<RunnerEvent>,
    ) -> Result<ExecOutcome, RunnerError>;
}

/// Runs the agent CLI as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    command: AgentCommand,
}

impl ProcessRunner {
    pub fn new(command: AgentCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl AgentRunner for ProcessRunner {
    async fn execute(
        &self,
        req: &ExecRequest,
        events: mpsc::Sender<RunnerEvent>,
    ) -> Result<ExecOutcome, RunnerError> {
        let args = self.command.render(&req.mode, &req.prompt);
        tracing::info!(
            program = %self.command.program,
            mode = %req.mode,
            cwd = %req.work_dir.display(),
            timeout_secs = req.timeout.as_secs(),
            "spawning agent process"
        );

        let mut cmd = tokio::process::Command::new(&self.command.program);
        cmd.args(&args)
            .current_dir(&req.work_dir)
            // Hard operational constraint: no terminal UI, no GUI.
            .stdin(Stdio::null())
            .env_remove("DISPLAY")
            .env_remove("WAYLAND_DISPLAY")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = drain_lines(stdout, events.clone(), RunnerEvent::Output);
        let stderr_task = drain_lines(stderr, events, RunnerEvent::ErrorOutput);

        let status = match tokio::time::timeout(req.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                tracing::warn!(
                    program = %self.command.program,
                    timeout_secs = req.timeout.as_secs(),
                    "agent process timed out, killing"
                );
                child.start_kill()?;
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(RunnerError::Timeout(req.timeout));
            }
        };

        let stdout_text = stdout_task.await.unwrap_or_default();
        let stderr_text = stderr_task.await.unwrap_or_default();
        let combined = if stderr_text.is_empty() {
            stdout_text
        } else if stdout_text.is_empty() {
            stderr_text
        } else {
            format!("{stdout_text}\n{stderr_text}")
        };

        let exit_code = status.code().unwrap_or(-1);
        if let Some(signature) = failure_signature(&combined) {
            // The agent sometimes reports exit 0 while its payload
            // encodes a rate-limit message.
            tracing::warn!(exit_code, signature, "failure signature in agent output");
            return Ok(ExecOutcome::failure(
                combined,
                format!("agent reported failure: {signature}"),
            ));
        }
        if !status.success() {
            let tail: String = combined
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(ExecOutcome::failure(
                combined.clone(),
                format!("agent exited with status {exit_code}: {tail}"),
            ));
        }

        tracing::info!(exit_code, bytes = combined.len(), "agent process finished");
        Ok(ExecOutcome::success(combined))
    }
}

/// Forward lines from a child pipe as runner events, accumulating the
/// full text for the final outcome.
fn drain_lines<R>(
    pipe: Option<R>,
    events: mpsc::Sender<RunnerEvent>,
    wrap: fn(String) -> RunnerEvent,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut collected = String::new();
        let Some(pipe) = pipe else {
            return collected;
        };
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !collected.is_empty() {
                collected.push('\n');
            }
            collected.push_str(&line);
            // Consumers append chunks to the job's event stream; a full
            // channel only drops the streaming copy, never the result.
            let _ = events.try_send(wrap(line));
        }
        collected
    })
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
