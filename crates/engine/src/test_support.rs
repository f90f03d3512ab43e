// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted agent runner for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gl_adapters::subprocess::{
    AgentRunner, ExecOutcome, ExecRequest, RunnerError, RunnerEvent,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// An [`AgentRunner`] that replays scripted outcomes instead of spawning
/// processes. With an empty script every call succeeds with output
/// `"ok"`. Tracks call counts and the peak number of concurrent
/// executions for concurrency-ceiling assertions.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<ExecOutcome, RunnerError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    requests: Mutex<Vec<ExecRequest>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every execution hold its slot for `delay` before resolving.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn enqueue(&self, result: Result<ExecOutcome, RunnerError>) {
        self.script.lock().push_back(result);
    }

    pub fn enqueue_success(&self, output: impl Into<String>) {
        self.enqueue(Ok(ExecOutcome::success(output)));
    }

    pub fn enqueue_failure(&self, error: impl Into<String>) {
        self.enqueue(Ok(ExecOutcome::failure("", error)));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in execution order.
    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn execute(
        &self,
        req: &ExecRequest,
        events: mpsc::Sender<RunnerEvent>,
    ) -> Result<ExecOutcome, RunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req.clone());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let result = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecOutcome::success("ok")));
        if let Ok(outcome) = &result {
            let _ = events.try_send(RunnerEvent::Output(outcome.output.clone()));
        }
        result
    }
}
