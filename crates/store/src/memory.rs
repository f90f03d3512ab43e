// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store: the reference implementation used by tests and
//! embedders that do not need durability.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gl_core::{
    Clock, CodingSession, Job, JobEvent, JobEventKind, JobId, SessionId, SuiteKind, TestExecution,
    TestSuite,
};
use parking_lot::Mutex;

use crate::{JobStore, SessionStore, StoreError};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    events: HashMap<JobId, Vec<JobEvent>>,
    sessions: HashMap<SessionId, CodingSession>,
    suites: HashMap<SessionId, Vec<TestSuite>>,
}

/// Mutex-guarded maps behind the store contracts.
#[derive(Clone)]
pub struct MemoryStore<C: Clock> {
    inner: Arc<Mutex<Inner>>,
    clock: C,
}

impl<C: Clock> MemoryStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    fn with_job<T>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> T,
    ) -> Result<T, StoreError> {
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::JobNotFound(id.clone()))?;
        Ok(f(job))
    }
}

#[async_trait]
impl<C: Clock> JobStore for MemoryStore<C> {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().jobs.get(id).cloned())
    }

    async fn find_pending(
        &self,
        excluding: &HashSet<JobId>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock();
        let mut pending: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| job.status == gl_core::JobStatus::Pending)
            .filter(|job| !excluding.contains(&job.id))
            .filter(|job| {
                job.session
                    .as_ref()
                    .and_then(|sid| inner.sessions.get(sid))
                    .map(|session| !session.is_paused())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn claim(&self, id: &JobId) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.with_job(id, |job| {
            if !job.claim(now) {
                tracing::debug!(job_id = %job.id, status = %job.status, "claim skipped");
            }
        })
    }

    async fn complete(&self, id: &JobId, output: &str) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.with_job(id, |job| {
            job.complete(output, now);
        })
    }

    async fn fail(&self, id: &JobId, error: &str) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.with_job(id, |job| {
            job.fail(error, now);
        })
    }

    async fn append_event(
        &self,
        id: &JobId,
        kind: JobEventKind,
        payload: &str,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            return Err(StoreError::JobNotFound(id.clone()));
        };
        // Streamed chunks also accumulate on the job record, so the raw
        // text survives for diagnosis even when the job never completes.
        if matches!(kind, JobEventKind::Progress | JobEventKind::Error) && !job.is_terminal() {
            if !job.output.as_deref().unwrap_or("").is_empty() {
                job.append_output("\n");
            }
            job.append_output(payload);
        }
        inner
            .events
            .entry(id.clone())
            .or_default()
            .push(JobEvent::new(id.clone(), kind, payload, now));
        Ok(())
    }

    async fn events(&self, id: &JobId) -> Result<Vec<JobEvent>, StoreError> {
        Ok(self.inner.lock().events.get(id).cloned().unwrap_or_default())
    }

    async fn find_stuck(
        &self,
        long_timeout: Duration,
        short_timeout: Duration,
        tracked: &HashSet<JobId>,
    ) -> Result<Vec<Job>, StoreError> {
        let now = self.clock.epoch_ms();
        let long_ms = long_timeout.as_millis() as u64;
        let short_ms = short_timeout.as_millis() as u64;
        let inner = self.inner.lock();
        Ok(inner
            .jobs
            .values()
            .filter(|job| job.status == gl_core::JobStatus::Running)
            .filter(|job| {
                let Some(started) = job.started_at_ms else {
                    return false;
                };
                let age = now.saturating_sub(started);
                age > long_ms || (age > short_ms && !tracked.contains(&job.id))
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl<C: Clock> SessionStore for MemoryStore<C> {
    async fn insert_session(&self, session: CodingSession) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<CodingSession>, StoreError> {
        Ok(self.inner.lock().sessions.get(id).cloned())
    }

    async fn update_session(&self, session: CodingSession) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(&session.id) {
            return Err(StoreError::SessionNotFound(session.id.clone()));
        }
        inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn record_execution(
        &self,
        id: &SessionId,
        kind: SuiteKind,
        execution: TestExecution,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(id) {
            return Err(StoreError::SessionNotFound(id.clone()));
        }
        let suites = inner.suites.entry(id.clone()).or_default();
        match suites.iter_mut().find(|suite| suite.kind == kind) {
            Some(suite) => suite.record(execution),
            None => {
                let mut suite = TestSuite::new(id.clone(), kind);
                suite.record(execution);
                suites.push(suite);
            }
        }
        Ok(())
    }

    async fn suites(&self, id: &SessionId) -> Result<Vec<TestSuite>, StoreError> {
        Ok(self.inner.lock().suites.get(id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
