// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TDD cycle value object.
//!
//! The cycle is embedded in a [`crate::CodingSession`] and persisted by
//! whole-state replace. All mutation goes through methods that keep the
//! invariants: `test_index` never decreases, a test's status only
//! advances `Pending → Green → Refactored`, and `stuck_count` resets
//! whenever a batch succeeds.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Tests implemented per Green-phase agent job.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Consecutive no-pass-signal attempts before a batch is force-advanced.
pub const STUCK_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TddPhase {
    /// Implementing a batch of tests until they pass
    Green,
    /// Behavior-preserving cleanup at a strategic checkpoint
    Refactor,
}

crate::simple_display! {
    TddPhase {
        Green => "green",
        Refactor => "refactor",
    }
}

/// Status of a single generated test within the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    Green,
    Refactored,
}

crate::simple_display! {
    TestStatus {
        Pending => "pending",
        Green => "green",
        Refactored => "refactored",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub code: String,
    pub status: TestStatus,
    /// Green-phase attempts that included this test
    pub attempts: u32,
}

impl TestCase {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            status: TestStatus::Pending,
            attempts: 0,
        }
    }
}

/// Why a refactor phase is due.
///
/// Refactoring runs only at checkpoints — never after every test — to
/// keep the total number of agent calls bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefactorCheckpoint {
    /// First advance crossing the midpoint of the test list (fires once)
    Midpoint,
    /// All batches processed
    Completion,
    /// Repeated stuck batches; cleanup may unblock the agent
    Stuck,
}

/// Batch Green/Refactor cycle state for one coding session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TddCycle {
    /// Cursor into `tests`: the next test to process
    pub test_index: usize,
    pub phase: TddPhase,
    pub batch_size: usize,
    /// Ordered test list; indices are stable for the cycle's lifetime
    pub tests: Vec<TestCase>,
    pub total_tests: usize,
    pub refactor_count: u32,
    /// Consecutive batch attempts without a pass signal
    pub stuck_count: u32,
    /// Latch for the once-only midpoint checkpoint
    #[serde(default)]
    mid_refactor_done: bool,
    /// Opaque context blob assembled once and reused by every phase prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_bundle: Option<String>,
}

impl TddCycle {
    /// Build a cycle over a non-empty ordered test list.
    ///
    /// Callers validate non-emptiness at the boundary; an empty list here
    /// yields an immediately-complete cycle rather than a panic.
    pub fn new(tests: Vec<TestCase>, batch_size: usize) -> Self {
        let total_tests = tests.len();
        Self {
            test_index: 0,
            phase: TddPhase::Green,
            batch_size: batch_size.max(1),
            tests,
            total_tests,
            refactor_count: 0,
            stuck_count: 0,
            mid_refactor_done: false,
            context_bundle: None,
        }
    }

    pub fn with_context(mut self, bundle: impl Into<String>) -> Self {
        self.context_bundle = Some(bundle.into());
        self
    }

    /// The current batch slice `[test_index, test_index + batch_size)`.
    pub fn batch_range(&self) -> Range<usize> {
        self.test_index..(self.test_index + self.batch_size).min(self.total_tests)
    }

    pub fn batch(&self) -> &[TestCase] {
        &self.tests[self.batch_range()]
    }

    pub fn is_complete(&self) -> bool {
        self.test_index >= self.total_tests
    }

    /// Percent of the test list the cursor has moved past.
    pub fn progress_percent(&self) -> u8 {
        if self.total_tests == 0 {
            return 100;
        }
        ((self.test_index * 100 / self.total_tests) as u8).min(100)
    }

    pub fn green_count(&self) -> usize {
        self.tests
            .iter()
            .filter(|t| t.status != TestStatus::Pending)
            .count()
    }

    /// Record a batch attempt that produced no pass signal.
    ///
    /// Returns the new consecutive stuck count.
    pub fn record_stuck(&mut self) -> u32 {
        let range = self.batch_range();
        for test in &mut self.tests[range] {
            test.attempts += 1;
        }
        self.stuck_count += 1;
        self.stuck_count
    }

    /// Whether the current batch has hit the force-advance ceiling.
    pub fn batch_is_stuck(&self) -> bool {
        self.stuck_count >= STUCK_THRESHOLD
    }

    /// Record a successful batch: every test in the slice goes green and
    /// the stuck counter resets.
    pub fn mark_batch_green(&mut self) {
        let range = self.batch_range();
        for test in &mut self.tests[range] {
            test.attempts += 1;
            if test.status == TestStatus::Pending {
                test.status = TestStatus::Green;
            }
        }
        self.stuck_count = 0;
    }

    /// Move the cursor past the current batch. The cursor never moves
    /// backwards; advancing a complete cycle is a no-op.
    pub fn advance(&mut self) {
        self.test_index = (self.test_index + self.batch_size).min(self.total_tests);
    }

    /// Checkpoint predicate, consulted once per batch advance.
    ///
    /// Completion wins over a stuck trigger so the final cleanup is not
    /// followed by another green batch; the midpoint latch guarantees the
    /// mid-cycle checkpoint fires at most once.
    pub fn refactor_checkpoint(&mut self) -> Option<RefactorCheckpoint> {
        if self.is_complete() {
            return Some(RefactorCheckpoint::Completion);
        }
        if self.stuck_count > 2 {
            return Some(RefactorCheckpoint::Stuck);
        }
        if !self.mid_refactor_done && self.progress_percent() >= 50 {
            self.mid_refactor_done = true;
            return Some(RefactorCheckpoint::Midpoint);
        }
        None
    }

    /// Record a completed refactor phase: green tests behind the cursor
    /// qualify as refactored.
    pub fn mark_refactored(&mut self) {
        let end = self.test_index.min(self.tests.len());
        for test in &mut self.tests[..end] {
            if test.status == TestStatus::Green {
                test.status = TestStatus::Refactored;
            }
        }
        self.refactor_count += 1;
    }
}

#[cfg(test)]
#[path = "tdd_tests.rs"]
mod tests;
