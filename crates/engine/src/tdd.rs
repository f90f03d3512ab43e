// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch Green/Refactor TDD cycle engine.
//!
//! Each phase is one agent job. Phase advancement happens only inside
//! the completion handler of the phase's own job, so batches of a
//! session are strictly sequential — never two in flight at once. A
//! batch without a pass signal is retried up to the stuck ceiling and
//! then force-advanced: forward progress is prioritized over perfection,
//! and the skip is visible in logs and in the cycle state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gl_adapters::extract;
use gl_core::{
    args, Clock, CodingSession, Job, RefactorCheckpoint, SessionId, SessionStatus, SuiteKind,
    TddCycle, TddPhase, TestCase, TestExecution, DEFAULT_BATCH_SIZE,
};
use gl_store::{JobStore, SessionStore};

use crate::dispatcher::CompletionHook;
use crate::error::EngineError;

/// Assembles the opaque context bundle a session's phase prompts reuse.
///
/// Loading is expensive (repo maps, conventions, prior art), so the
/// engine calls it exactly once per cycle and caches the result.
#[async_trait]
pub trait ContextSource: Send + Sync + 'static {
    async fn load(&self, session: &CodingSession) -> Result<String, EngineError>;
}

/// Fixed context bundle, for embedders that precompute it and for tests.
pub struct StaticContext(pub String);

#[async_trait]
impl ContextSource for StaticContext {
    async fn load(&self, _session: &CodingSession) -> Result<String, EngineError> {
        Ok(self.0.clone())
    }
}

/// Textual pass markers accepted when no structured payload is found.
const PASS_MARKERS: &[&str] = &[
    "all tests pass",
    "all tests passed",
    "tests passed",
    "tests are passing",
    "test suite passed",
];

fn pass_marker(output: &str) -> bool {
    let haystack = output.to_lowercase();
    PASS_MARKERS.iter().any(|marker| haystack.contains(marker))
}

pub struct TddEngine<S, C> {
    store: Arc<S>,
    context: Arc<dyn ContextSource>,
    clock: C,
    provider: String,
    batch_size: usize,
}

impl<S, C> TddEngine<S, C>
where
    S: JobStore + SessionStore,
    C: Clock,
{
    pub fn new(
        store: Arc<S>,
        context: Arc<dyn ContextSource>,
        clock: C,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            store,
            context,
            clock,
            provider: provider.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Start a TDD cycle over a non-empty ordered test list.
    ///
    /// Caches the context bundle once and enqueues the first green batch.
    pub async fn initialize(
        &self,
        session_id: &SessionId,
        tests: Vec<TestCase>,
    ) -> Result<(), EngineError> {
        if tests.is_empty() {
            return Err(EngineError::EmptyTestList);
        }
        let mut session = self.require_session(session_id).await?;
        let bundle = self.context.load(&session).await?;
        let cycle = TddCycle::new(tests, self.batch_size).with_context(bundle);
        tracing::info!(
            session_id = %session.id,
            total_tests = cycle.total_tests,
            batch_size = cycle.batch_size,
            "initializing TDD cycle"
        );

        session.tdd = Some(cycle);
        session.status = SessionStatus::TddGreen;
        session.progress = 0;
        self.store.update_session(session.clone()).await?;
        self.enqueue_green(&session).await
    }

    async fn require_session(&self, id: &SessionId) -> Result<CodingSession, EngineError> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))
    }

    async fn handle_green(&self, job: &Job, output: &str) -> Result<(), EngineError> {
        let Some(session_id) = &job.session else {
            return Ok(());
        };
        let mut session = self.require_session(session_id).await?;
        if session.status.is_terminal() || session.is_paused() {
            // Cancelled or paused while the batch was in flight; the
            // result is recorded on the job, nothing to advance.
            return Ok(());
        }
        let Some(mut cycle) = session.tdd.take() else {
            session.fail("green phase result arrived without an initialized TDD cycle");
            self.store.update_session(session).await?;
            return Ok(());
        };

        // At-least-once delivery: drop results whose batch cursor no
        // longer matches (duplicate claim or replayed completion).
        let batch_start = job
            .args
            .get(args::BATCH)
            .and_then(|raw| raw.parse::<usize>().ok());
        if batch_start != Some(cycle.test_index) || cycle.phase != TddPhase::Green {
            tracing::debug!(job_id = %job.id, "ignoring stale green-phase result");
            return Ok(());
        }

        let counts = extract::extract_payload(output).and_then(|value| extract::test_counts(&value));
        if let Some(counts) = counts {
            let kind = cycle
                .batch()
                .first()
                .map(|test| SuiteKind::detect(&test.name, &test.code))
                .unwrap_or(SuiteKind::Unknown);
            let now = self.clock.epoch_ms();
            let execution = TestExecution::from_counts(
                counts.total,
                counts.passed,
                counts.failed,
                counts.skipped,
                job.started_at_ms.unwrap_or(now),
                now,
            );
            self.store.record_execution(session_id, kind, execution).await?;
        }

        let passed = counts.map(|c| c.all_passed()).unwrap_or_else(|| pass_marker(output));
        if passed {
            cycle.mark_batch_green();
            session.tdd = Some(cycle);
            return self.advance_to_next_batch(session).await;
        }

        let stuck = cycle.record_stuck();
        if cycle.batch_is_stuck() {
            // Bounded-retry fallback: skip the batch rather than wedge
            // the session. Flagged loudly; the skipped tests stay
            // pending in the cycle state.
            tracing::warn!(
                session_id = %session.id,
                batch_start = cycle.test_index,
                stuck,
                "no pass signal after repeated attempts, force-advancing past stuck batch"
            );
            session.tdd = Some(cycle);
            return self.advance_to_next_batch(session).await;
        }

        tracing::info!(
            session_id = %session.id,
            batch_start = cycle.test_index,
            stuck,
            "batch lacked a pass signal, retrying"
        );
        session.tdd = Some(cycle);
        self.store.update_session(session.clone()).await?;
        self.enqueue_green(&session).await
    }

    /// Move the cursor past the completed batch and decide what runs
    /// next: a refactor checkpoint, the next green batch, or (after the
    /// final refactor) session completion.
    async fn advance_to_next_batch(&self, mut session: CodingSession) -> Result<(), EngineError> {
        let Some(mut cycle) = session.tdd.take() else {
            session.fail("TDD cycle state lost during batch advancement");
            self.store.update_session(session).await?;
            return Ok(());
        };

        cycle.advance();
        session.progress = cycle.progress_percent();

        match cycle.refactor_checkpoint() {
            Some(checkpoint) => {
                cycle.phase = TddPhase::Refactor;
                session.status = SessionStatus::TddRefactor;
                session.tdd = Some(cycle);
                self.store.update_session(session.clone()).await?;
                self.enqueue_refactor(&session, checkpoint).await
            }
            None => {
                cycle.phase = TddPhase::Green;
                session.status = SessionStatus::TddGreen;
                session.tdd = Some(cycle);
                self.store.update_session(session.clone()).await?;
                self.enqueue_green(&session).await
            }
        }
    }

    async fn handle_refactor(&self, job: &Job) -> Result<(), EngineError> {
        let Some(session_id) = &job.session else {
            return Ok(());
        };
        let mut session = self.require_session(session_id).await?;
        if session.status.is_terminal() || session.is_paused() {
            return Ok(());
        }
        let Some(mut cycle) = session.tdd.take() else {
            session.fail("refactor phase result arrived without an initialized TDD cycle");
            self.store.update_session(session).await?;
            return Ok(());
        };
        if cycle.phase != TddPhase::Refactor {
            tracing::debug!(job_id = %job.id, "ignoring stale refactor-phase result");
            return Ok(());
        }

        cycle.mark_refactored();
        cycle.phase = TddPhase::Green;

        if cycle.is_complete() {
            session.tdd = Some(cycle);
            session.complete();
            self.store.update_session(session.clone()).await?;
            tracing::info!(session_id = %session.id, "TDD cycle completed");
            return Ok(());
        }

        session.status = SessionStatus::TddGreen;
        session.tdd = Some(cycle);
        self.store.update_session(session.clone()).await?;
        self.enqueue_green(&session).await
    }

    async fn enqueue_green(&self, session: &CodingSession) -> Result<(), EngineError> {
        let Some(cycle) = &session.tdd else {
            return Err(EngineError::CycleNotInitialized(session.id.clone()));
        };
        let job = self.phase_job(
            session,
            args::PHASE_GREEN,
            cycle.test_index,
            green_prompt(cycle),
        );
        tracing::info!(
            session_id = %session.id,
            job_id = %job.id,
            batch = ?cycle.batch_range(),
            "enqueued green batch job"
        );
        Ok(self.store.insert(job).await?)
    }

    async fn enqueue_refactor(
        &self,
        session: &CodingSession,
        checkpoint: RefactorCheckpoint,
    ) -> Result<(), EngineError> {
        let Some(cycle) = &session.tdd else {
            return Err(EngineError::CycleNotInitialized(session.id.clone()));
        };
        let job = self.phase_job(
            session,
            args::PHASE_REFACTOR,
            cycle.test_index,
            refactor_prompt(cycle),
        );
        tracing::info!(
            session_id = %session.id,
            job_id = %job.id,
            checkpoint = ?checkpoint,
            "enqueued refactor job"
        );
        Ok(self.store.insert(job).await?)
    }

    fn phase_job(
        &self,
        session: &CodingSession,
        phase: &str,
        batch_start: usize,
        prompt: String,
    ) -> Job {
        let mut jargs = HashMap::new();
        jargs.insert(args::MODE.to_string(), args::MODE_IMPLEMENT.to_string());
        jargs.insert(args::PHASE.to_string(), phase.to_string());
        jargs.insert(args::SESSION.to_string(), session.id.to_string());
        jargs.insert(args::BATCH.to_string(), batch_start.to_string());
        jargs.insert(args::PROMPT.to_string(), prompt);
        Job::new(session.story.clone(), self.provider.clone(), jargs, &self.clock)
            .for_session(session.id.clone())
    }
}

#[async_trait]
impl<S, C> CompletionHook for TddEngine<S, C>
where
    S: JobStore + SessionStore,
    C: Clock,
{
    async fn on_completed(&self, job: &Job, output: &str) -> Result<(), EngineError> {
        match job.phase() {
            Some(args::PHASE_GREEN) => self.handle_green(job, output).await,
            Some(args::PHASE_REFACTOR) => self.handle_refactor(job).await,
            _ => Ok(()),
        }
    }

    async fn on_failed(&self, job: &Job, error: &str) -> Result<(), EngineError> {
        let Some(session_id) = &job.session else {
            return Ok(());
        };
        let Some(phase) = job.phase() else {
            return Ok(());
        };
        // Retry ceiling exhausted or extraction failed: terminal for the
        // session, never silently retried.
        let Some(mut session) = self.store.get_session(session_id).await? else {
            return Ok(());
        };
        if session.fail(format!("{phase} job {} failed: {error}", job.id)) {
            self.store.update_session(session).await?;
        }
        Ok(())
    }
}

fn green_prompt(cycle: &TddCycle) -> String {
    let mut prompt = String::new();
    if let Some(bundle) = &cycle.context_bundle {
        prompt.push_str(bundle);
        prompt.push_str("\n\n");
    }
    prompt.push_str(
        "Implement the code needed to make every test below pass. \
         Previously passing tests must stay green. When done, report the \
         test results as a fenced JSON array of {name, status} objects.\n",
    );
    for test in cycle.batch() {
        prompt.push_str("\n## ");
        prompt.push_str(&test.name);
        prompt.push('\n');
        prompt.push_str(&test.code);
        prompt.push('\n');
    }
    prompt
}

fn refactor_prompt(cycle: &TddCycle) -> String {
    let mut prompt = String::new();
    if let Some(bundle) = &cycle.context_bundle {
        prompt.push_str(bundle);
        prompt.push_str("\n\n");
    }
    prompt.push_str(
        "Refactor the implementation for clarity and structure. This is a \
         cleanup pass: do not change behavior, and every previously \
         passing test must remain green.\n",
    );
    prompt
}

#[cfg(test)]
#[path = "tdd_tests.rs"]
mod tests;
