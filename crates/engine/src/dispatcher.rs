// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Polling job dispatcher with bounded concurrency and stuck-job
//! reclamation.
//!
//! One dispatch loop per worker process. Claimed jobs run as tracked
//! fire-and-forget tasks; the loop itself never blocks on them and never
//! dies because one of them failed. Concurrency accounting belongs to a
//! semaphore — available slots are derived from its permits, never from
//! a hand-incremented counter.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gl_adapters::retry::{jitter_within, RetryPolicy};
use gl_adapters::subprocess::{AgentRunner, ExecRequest, RunnerEvent};
use gl_core::{Job, JobEventKind, JobId};
use gl_store::{JobStore, SessionStore};
use parking_lot::Mutex;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Global ceiling on concurrently-running agent jobs.
    ///
    /// Defaults to 1, serializing all agent calls: the upstream provider
    /// enforces per-account rate limits, so raising this is a
    /// capacity/risk tradeoff, not a correctness one.
    pub max_concurrency: usize,
    pub poll_interval: Duration,
    /// Pause between successive dispatches within one poll cycle
    pub dispatch_delay: Duration,
    /// Longer pause ahead of test-generation-class jobs
    pub test_gen_dispatch_delay: Duration,
    /// Random jitter cap added to every dispatch pause
    pub dispatch_jitter: Duration,
    /// Hard timeout for a single agent subprocess
    pub job_timeout: Duration,
    /// A running job older than this is always reclaimed
    pub long_stuck_timeout: Duration,
    /// A running job older than this is reclaimed when untracked
    /// (claimed by a process instance that crashed)
    pub short_stuck_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            poll_interval: Duration::from_secs(10),
            dispatch_delay: Duration::from_secs(2),
            test_gen_dispatch_delay: Duration::from_secs(10),
            dispatch_jitter: Duration::from_secs(1),
            job_timeout: Duration::from_secs(20 * 60),
            long_stuck_timeout: Duration::from_secs(30 * 60),
            short_stuck_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Callback invoked after a job reaches a terminal state.
///
/// The TDD cycle engine implements this to interpret phase results and
/// enqueue the next phase's job.
#[async_trait]
pub trait CompletionHook: Send + Sync + 'static {
    async fn on_completed(&self, job: &Job, output: &str) -> Result<(), EngineError>;
    async fn on_failed(&self, job: &Job, error: &str) -> Result<(), EngineError>;
}

/// Default hook: jobs with no owning workflow need no follow-up.
pub(crate) struct NoopHook;

#[async_trait]
impl CompletionHook for NoopHook {
    async fn on_completed(&self, _job: &Job, _output: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn on_failed(&self, _job: &Job, _error: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Removes the in-flight marker and releases the concurrency permit on
/// every exit path of a job task.
struct FlightGuard {
    id: JobId,
    in_flight: Arc<Mutex<HashSet<JobId>>>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.id);
    }
}

pub struct Dispatcher<S, R> {
    store: Arc<S>,
    runner: Arc<R>,
    retry: RetryPolicy,
    config: DispatcherConfig,
    slots: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<JobId>>>,
    hook: Arc<dyn CompletionHook>,
}

impl<S, R> Dispatcher<S, R>
where
    S: JobStore + SessionStore,
    R: AgentRunner,
{
    pub fn new(store: Arc<S>, runner: Arc<R>, config: DispatcherConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            store,
            runner,
            retry: RetryPolicy::default(),
            config,
            slots,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            hook: Arc::new(NoopHook),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Jobs currently claimed by this dispatcher instance.
    pub fn active_count(&self) -> usize {
        self.config.max_concurrency - self.slots.available_permits()
    }

    /// Dispatch loop: reclaim stuck jobs once at startup, then poll on a
    /// timer until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(error) = self.reclaim_stuck().await {
            tracing::error!(%error, "startup reclamation failed");
        }

        loop {
            if let Err(error) = self.poll().await {
                // One bad cycle must not stop the scheduler.
                tracing::error!(%error, "poll cycle failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            if let Err(error) = self.reclaim_stuck().await {
                tracing::error!(%error, "stuck-job reclamation failed");
            }
        }
        tracing::info!("dispatcher stopped");
    }

    /// One poll cycle: claim up to the available slots, oldest first.
    ///
    /// Returns the number of jobs dispatched.
    pub async fn poll(&self) -> Result<usize, EngineError> {
        let available = self.slots.available_permits();
        if available == 0 {
            return Ok(0);
        }

        let excluding = self.in_flight.lock().clone();
        let eligible = self.store.find_pending(&excluding, available).await?;
        if eligible.is_empty() {
            return Ok(0);
        }

        let mut dispatched = 0usize;
        for job in eligible {
            // Space out successive dispatches so a burst of eligible jobs
            // does not hammer the provider.
            if dispatched > 0 {
                tokio::time::sleep(self.dispatch_pause(&job)).await;
            }

            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                break;
            };

            self.store.claim(&job.id).await?;
            self.in_flight.lock().insert(job.id.clone());
            tracing::info!(job_id = %job.id, mode = %job.mode(), "claimed job");

            let guard = FlightGuard {
                id: job.id.clone(),
                in_flight: Arc::clone(&self.in_flight),
                _permit: permit,
            };
            let store = Arc::clone(&self.store);
            let runner = Arc::clone(&self.runner);
            let hook = Arc::clone(&self.hook);
            let retry = self.retry.clone();
            let timeout = self.config.job_timeout;
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(error) = run_job(store, runner, retry, hook, &job, timeout).await {
                    tracing::error!(job_id = %job.id, %error, "job pipeline error");
                }
            });
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Fail jobs stuck in `running` and cascade their sessions.
    ///
    /// This is the only mechanism that breaks a job out of `running`
    /// without an explicit completion signal — a safety net, not a
    /// normal path. Duplicate-claim races are tolerated: every
    /// downstream transition is idempotent.
    pub async fn reclaim_stuck(&self) -> Result<usize, EngineError> {
        let tracked = self.in_flight.lock().clone();
        let stuck = self
            .store
            .find_stuck(
                self.config.long_stuck_timeout,
                self.config.short_stuck_timeout,
                &tracked,
            )
            .await?;

        let mut reclaimed = 0usize;
        for job in stuck {
            let error = format!(
                "job stuck in running state for over {} minutes; reclaimed",
                self.config.short_stuck_timeout.as_secs() / 60
            );
            tracing::warn!(job_id = %job.id, started_at_ms = ?job.started_at_ms, "reclaiming stuck job");

            self.store.fail(&job.id, &error).await?;
            self.store
                .append_event(&job.id, JobEventKind::Failed, &error)
                .await?;

            if let Some(session_id) = &job.session {
                if let Some(mut session) = self.store.get_session(session_id).await? {
                    if session.fail(format!("job {} timed out without completing", job.id)) {
                        self.store.update_session(session).await?;
                    }
                }
            }
            reclaimed += 1;
        }

        Ok(reclaimed)
    }

    fn dispatch_pause(&self, job: &Job) -> Duration {
        let base = if job.is_test_generation() {
            self.config.test_gen_dispatch_delay
        } else {
            self.config.dispatch_delay
        };
        base + jitter_within(self.config.dispatch_jitter)
    }
}

/// Execution pipeline for one claimed job: retry-wrapped subprocess run,
/// event forwarding, terminal store update, completion hook.
async fn run_job<S, R>(
    store: Arc<S>,
    runner: Arc<R>,
    retry: RetryPolicy,
    hook: Arc<dyn CompletionHook>,
    job: &Job,
    timeout: Duration,
) -> Result<(), EngineError>
where
    S: JobStore + SessionStore,
    R: AgentRunner,
{
    let (tx, rx) = mpsc::channel::<RunnerEvent>(256);
    let forwarder = tokio::spawn(forward_events(Arc::clone(&store), job.id.clone(), rx));

    let request = ExecRequest {
        mode: job.mode().to_string(),
        prompt: job.prompt().to_string(),
        work_dir: job.work_dir(),
        timeout,
    };
    let result = retry
        .run(|attempt| {
            let runner = Arc::clone(&runner);
            let request = request.clone();
            let tx = tx.clone();
            async move {
                if attempt > 1 {
                    tracing::info!(attempt, "re-running agent after transient failure");
                }
                runner.execute(&request, tx).await
            }
        })
        .await;
    drop(tx);
    let _ = forwarder.await;

    match result {
        Ok(outcome) if outcome.success => {
            store.complete(&job.id, &outcome.output).await?;
            store
                .append_event(&job.id, JobEventKind::Completed, "job completed")
                .await?;
            tracing::info!(job_id = %job.id, "job completed");
            hook.on_completed(job, &outcome.output).await
        }
        Ok(outcome) => {
            let error = outcome
                .error
                .unwrap_or_else(|| "agent failed without detail".to_string());
            fail_job(&store, &hook, job, &error).await
        }
        Err(runner_error) => fail_job(&store, &hook, job, &runner_error.to_string()).await,
    }
}

async fn fail_job<S>(
    store: &Arc<S>,
    hook: &Arc<dyn CompletionHook>,
    job: &Job,
    error: &str,
) -> Result<(), EngineError>
where
    S: JobStore + SessionStore,
{
    tracing::warn!(job_id = %job.id, error, "job failed");
    store.fail(&job.id, error).await?;
    store.append_event(&job.id, JobEventKind::Failed, error).await?;
    hook.on_failed(job, error).await
}

/// Append streamed subprocess chunks to the job's event stream.
async fn forward_events<S: JobStore>(
    store: Arc<S>,
    job_id: JobId,
    mut rx: mpsc::Receiver<RunnerEvent>,
) {
    while let Some(event) = rx.recv().await {
        let (kind, chunk) = match event {
            RunnerEvent::Output(chunk) => (JobEventKind::Progress, chunk),
            RunnerEvent::ErrorOutput(chunk) => (JobEventKind::Error, chunk),
        };
        if let Err(error) = store.append_event(&job_id, kind, &chunk).await {
            tracing::warn!(%job_id, %error, "failed to append job event");
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
