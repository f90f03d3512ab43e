// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coding session record and lifecycle transitions.

use crate::tdd::{TddCycle, TddPhase};
use serde::{Deserialize, Serialize};
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a coding session.
    pub struct SessionId("ses-");
}

/// Status of a coding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    GeneratingTests,
    TestsGenerated,
    /// Implementing a batch of tests
    TddGreen,
    /// Strategic cleanup checkpoint
    TddRefactor,
    Running,
    /// Pending jobs are skipped, not deleted; resume restores eligibility
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Statuses from which the external layer may pause the session.
    pub fn is_pausable(&self) -> bool {
        matches!(
            self,
            SessionStatus::TddGreen | SessionStatus::TddRefactor | SessionStatus::Running
        )
    }
}

crate::simple_display! {
    SessionStatus {
        Pending => "pending",
        GeneratingTests => "generating_tests",
        TestsGenerated => "tests_generated",
        TddGreen => "tdd_green",
        TddRefactor => "tdd_refactor",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Rejected session lifecycle transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("session is not pausable from status {0}")]
    NotPausable(SessionStatus),
    #[error("session is not paused (status {0})")]
    NotResumable(SessionStatus),
    #[error("session is already terminal (status {0})")]
    Terminal(SessionStatus),
}

/// A coding session: the unit of work that owns a TDD cycle.
///
/// Only the TDD cycle engine and the dispatcher (on job completion)
/// write `status`/`tdd` — the external layer goes through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingSession {
    pub id: SessionId,
    /// Reference to the unit of work (story/task) being implemented
    pub story: String,
    pub programmer_type: String,
    pub status: SessionStatus,
    /// 0–100 composite of test + implementation progress
    pub progress: u8,
    /// Embedded TDD cycle, absent until initialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tdd: Option<TddCycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CodingSession {
    pub fn new(story: impl Into<String>, programmer_type: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            story: story.into(),
            programmer_type: programmer_type.into(),
            status: SessionStatus::Pending,
            progress: 0,
            tdd: None,
            error: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status == SessionStatus::Paused
    }

    /// Pause the session. Its pending jobs become ineligible for claiming.
    pub fn pause(&mut self) -> Result<(), TransitionError> {
        if !self.status.is_pausable() {
            return Err(TransitionError::NotPausable(self.status));
        }
        self.status = SessionStatus::Paused;
        Ok(())
    }

    /// Resume a paused session.
    ///
    /// The status is re-derived from the embedded cycle's phase so the
    /// projection reflects where work will pick up; the jobs themselves
    /// were never touched.
    pub fn resume(&mut self) -> Result<(), TransitionError> {
        if self.status != SessionStatus::Paused {
            return Err(TransitionError::NotResumable(self.status));
        }
        self.status = match self.tdd.as_ref().map(|cycle| cycle.phase) {
            Some(TddPhase::Green) => SessionStatus::TddGreen,
            Some(TddPhase::Refactor) => SessionStatus::TddRefactor,
            None => SessionStatus::Running,
        };
        Ok(())
    }

    /// Cancel on user request.
    ///
    /// Recorded as failed with an explicit reason; in-flight subprocesses
    /// are not interrupted (the timeout path is the only interruption).
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        self.status = SessionStatus::Failed;
        self.error = Some("cancelled by user".to_string());
        Ok(())
    }

    /// Mark the session failed. No-op when already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Failed;
        self.error = Some(error.into());
        true
    }

    /// Mark the session completed. No-op when already terminal.
    pub fn complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Completed;
        self.progress = 100;
        true
    }
}

crate::builder! {
    pub struct CodingSessionBuilder => CodingSession {
        into {
            id: SessionId = "ses-test-1",
            story: String = "story-1",
            programmer_type: String = "fullstack",
        }
        set {
            status: SessionStatus = SessionStatus::Pending,
            progress: u8 = 0,
        }
        option {
            tdd: TddCycle,
            error: String,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
