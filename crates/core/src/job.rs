// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and status state machine.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::session::SessionId;

crate::define_id! {
    /// Unique identifier for a job.
    ///
    /// Each submitted unit of agent work gets a unique ID used to claim
    /// it, stream its events, and reference it in logs.
    pub struct JobId("job-");
}

/// Well-known keys (and values) of the opaque job `args` bag.
///
/// The bag is untyped by design — the external layer and the engine agree
/// on these keys only. At minimum every job carries [`MODE`] and
/// [`PROMPT`]; TDD phase jobs additionally carry [`PHASE`] and
/// [`SESSION`].
pub mod args {
    pub const MODE: &str = "mode";
    pub const PROMPT: &str = "prompt";
    pub const PHASE: &str = "phase";
    pub const SESSION: &str = "session";
    pub const WORK_DIR: &str = "work_dir";
    /// Start index of the batch a TDD phase job was built for; completion
    /// handlers drop results whose index no longer matches the cycle.
    pub const BATCH: &str = "batch";

    /// Test-generation jobs get a longer inter-dispatch delay.
    pub const MODE_GENERATE_TESTS: &str = "generate_tests";
    pub const MODE_IMPLEMENT: &str = "implement";

    pub const PHASE_GREEN: &str = "tdd_green";
    pub const PHASE_REFACTOR: &str = "tdd_refactor";
}

/// Status of a job.
///
/// Transitions are strictly forward: `Pending → Running → {Completed,
/// Failed}`. A terminal job is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed by a dispatcher
    Pending,
    /// Claimed; the agent subprocess is (or should be) running
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

/// One discrete unit of work submitted to an external AI agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Project this job belongs to
    pub project: String,
    /// Owning coding session, when the job is a TDD phase job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    /// Which agent backend executes this job
    pub provider: String,
    /// Opaque args bag; see [`args`] for the well-known keys
    pub args: HashMap<String, String>,
    pub status: JobStatus,
    /// Accumulated agent output (appended as chunks stream in)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        project: impl Into<String>,
        provider: impl Into<String>,
        jargs: HashMap<String, String>,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id: JobId::new(),
            project: project.into(),
            session: None,
            provider: provider.into(),
            args: jargs,
            status: JobStatus::Pending,
            output: None,
            error: None,
            created_at_ms: clock.epoch_ms(),
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    /// Attach the owning coding session.
    pub fn for_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    pub fn mode(&self) -> &str {
        self.args.get(args::MODE).map(String::as_str).unwrap_or("")
    }

    pub fn prompt(&self) -> &str {
        self.args
            .get(args::PROMPT)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// TDD phase this job executes, if any.
    pub fn phase(&self) -> Option<&str> {
        self.args.get(args::PHASE).map(String::as_str)
    }

    /// Directory the agent subprocess executes in.
    pub fn work_dir(&self) -> std::path::PathBuf {
        self.args
            .get(args::WORK_DIR)
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| std::path::PathBuf::from("."))
    }

    /// Test-generation-class jobs are dispatched with a longer delay.
    pub fn is_test_generation(&self) -> bool {
        self.mode() == args::MODE_GENERATE_TESTS
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Claim the job: `Pending → Running`, stamping `started_at_ms`.
    ///
    /// Returns whether the transition applied. Claiming a job in any
    /// other status is a no-op so replayed claims are harmless.
    pub fn claim(&mut self, now_ms: u64) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at_ms = Some(now_ms);
        true
    }

    /// Mark the job completed with its final output.
    ///
    /// No-op on an already-terminal job (at-least-once delivery means a
    /// reclaimed job's original execution may still report in).
    pub fn complete(&mut self, output: impl Into<String>, now_ms: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.output = Some(output.into());
        self.finished_at_ms = Some(now_ms);
        true
    }

    /// Mark the job failed with an error. No-op on an already-terminal job.
    pub fn fail(&mut self, error: impl Into<String>, now_ms: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.finished_at_ms = Some(now_ms);
        true
    }

    /// Append a streamed output chunk to the accumulated output.
    pub fn append_output(&mut self, chunk: &str) {
        match &mut self.output {
            Some(out) => out.push_str(chunk),
            None => self.output = Some(chunk.to_string()),
        }
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: JobId = "job-test-1",
            project: String = "test-project",
            provider: String = "claude",
        }
        set {
            args: HashMap<String, String> = HashMap::new(),
            status: JobStatus = JobStatus::Pending,
            created_at_ms: u64 = 1_000_000,
        }
        option {
            session: SessionId,
            output: String,
            error: String,
            started_at_ms: u64,
            finished_at_ms: u64,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
