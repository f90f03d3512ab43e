// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test suite and execution records.
//!
//! Downstream of the output extractor: when a phase job's output carries
//! recoverable test counts, they are recorded here. A suite owns zero or
//! more executions, most-recent-first, append-only per run.

use crate::session::SessionId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a test suite.
    pub struct SuiteId("sui-");
}

/// Suite grouping, detected from test names and code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    Unit,
    Integration,
    Unknown,
}

impl SuiteKind {
    /// Best-effort detection from a test's name and source.
    pub fn detect(name: &str, code: &str) -> Self {
        let haystack = format!("{} {}", name.to_lowercase(), code.to_lowercase());
        if haystack.contains("integration") || haystack.contains("e2e") {
            SuiteKind::Integration
        } else if haystack.contains("test") || haystack.contains("spec") {
            SuiteKind::Unit
        } else {
            SuiteKind::Unknown
        }
    }
}

crate::simple_display! {
    SuiteKind {
        Unit => "unit",
        Integration => "integration",
        Unknown => "unknown",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Passed,
    Failed,
    Skipped,
    Error,
}

crate::simple_display! {
    ExecutionStatus {
        Running => "running",
        Passed => "passed",
        Failed => "failed",
        Skipped => "skipped",
        Error => "error",
    }
}

/// Aggregate result of one test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestExecution {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub status: ExecutionStatus,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl TestExecution {
    /// Finished execution with status derived from the counts.
    pub fn from_counts(
        total: u32,
        passed: u32,
        failed: u32,
        skipped: u32,
        started_at_ms: u64,
        finished_at_ms: u64,
    ) -> Self {
        let status = if total == 0 {
            ExecutionStatus::Error
        } else if failed > 0 {
            ExecutionStatus::Failed
        } else if passed == 0 && skipped > 0 {
            ExecutionStatus::Skipped
        } else {
            ExecutionStatus::Passed
        };
        Self {
            total,
            passed,
            failed,
            skipped,
            status,
            started_at_ms,
            finished_at_ms: Some(finished_at_ms),
        }
    }
}

/// Groups a session's test executions by detected suite kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub id: SuiteId,
    pub session: SessionId,
    pub kind: SuiteKind,
    /// Most-recent-first
    pub executions: Vec<TestExecution>,
}

impl TestSuite {
    pub fn new(session: SessionId, kind: SuiteKind) -> Self {
        Self {
            id: SuiteId::new(),
            session,
            kind,
            executions: Vec::new(),
        }
    }

    /// Append a run, keeping most-recent-first order.
    pub fn record(&mut self, execution: TestExecution) {
        self.executions.insert(0, execution);
    }

    pub fn latest(&self) -> Option<&TestExecution> {
        self.executions.first()
    }
}

#[cfg(test)]
#[path = "suite_tests.rs"]
mod tests;
