// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence contracts for jobs and coding sessions.
//!
//! The surrounding CRUD layer owns the actual database; the engine only
//! sees these traits. Abstractly the job side is a durable work queue
//! with visibility timeouts — any backend preserving at-least-once
//! delivery and idempotent completion may implement it. All mutations
//! are single-record, last-writer-wins; there is no optimistic
//! concurrency check by design.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use gl_core::{
    CodingSession, Job, JobEvent, JobEventKind, JobId, SessionId, SuiteKind, TestExecution,
    TestSuite,
};
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable job queue contract.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Insert a new (pending) job record.
    async fn insert(&self, job: Job) -> Result<(), StoreError>;

    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Pending jobs eligible for dispatch, oldest-created-first.
    ///
    /// Excludes jobs in `excluding` (the caller's in-flight set) and jobs
    /// whose owning session is paused — paused work is skipped, not
    /// deleted, so resuming restores eligibility without re-creation.
    async fn find_pending(
        &self,
        excluding: &HashSet<JobId>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Claim a pending job: status becomes running, `started_at_ms` is
    /// stamped. Claiming a job that is no longer pending is a no-op.
    async fn claim(&self, id: &JobId) -> Result<(), StoreError>;

    /// Mark completed with final output. No-op on an already-terminal job.
    async fn complete(&self, id: &JobId, output: &str) -> Result<(), StoreError>;

    /// Mark failed with an error. No-op on an already-terminal job.
    async fn fail(&self, id: &JobId, error: &str) -> Result<(), StoreError>;

    /// Append a write-once observability event to the job's stream.
    async fn append_event(
        &self,
        id: &JobId,
        kind: JobEventKind,
        payload: &str,
    ) -> Result<(), StoreError>;

    async fn events(&self, id: &JobId) -> Result<Vec<JobEvent>, StoreError>;

    /// Running jobs that look abandoned: started longer than
    /// `long_timeout` ago, or longer than `short_timeout` ago while not
    /// present in `tracked` (claimed by a process that no longer exists).
    async fn find_stuck(
        &self,
        long_timeout: Duration,
        short_timeout: Duration,
        tracked: &HashSet<JobId>,
    ) -> Result<Vec<Job>, StoreError>;
}

/// Coding session persistence contract.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn insert_session(&self, session: CodingSession) -> Result<(), StoreError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<CodingSession>, StoreError>;

    /// Whole-record replace, last-writer-wins.
    async fn update_session(&self, session: CodingSession) -> Result<(), StoreError>;

    /// Append a test run to the session's suite of the given kind,
    /// creating the suite on first use. Most-recent-first.
    async fn record_execution(
        &self,
        id: &SessionId,
        kind: SuiteKind,
        execution: TestExecution,
    ) -> Result<(), StoreError>;

    async fn suites(&self, id: &SessionId) -> Result<Vec<TestSuite>, StoreError>;
}
