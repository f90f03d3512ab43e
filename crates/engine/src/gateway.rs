// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session gateway: the thin façade the surrounding CRUD layer calls.

use std::sync::Arc;

use gl_core::{Clock, CodingSession, SessionId, SessionStatus, TddPhase, TestCase};
use gl_store::{JobStore, SessionStore};

use crate::error::EngineError;
use crate::tdd::TddEngine;

/// Read-only status projection for the external layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub status: SessionStatus,
    pub progress: u8,
    pub current_phase: Option<TddPhase>,
    pub tests_passed: usize,
    pub tests_total: usize,
}

pub struct SessionGateway<S, C> {
    store: Arc<S>,
    engine: Arc<TddEngine<S, C>>,
}

impl<S, C> SessionGateway<S, C>
where
    S: JobStore + SessionStore,
    C: Clock,
{
    pub fn new(store: Arc<S>, engine: Arc<TddEngine<S, C>>) -> Self {
        Self { store, engine }
    }

    pub async fn create_session(
        &self,
        story: impl Into<String>,
        programmer_type: impl Into<String>,
    ) -> Result<SessionId, EngineError> {
        let session = CodingSession::new(story, programmer_type);
        let id = session.id.clone();
        self.store.insert_session(session).await?;
        Ok(id)
    }

    /// Start implementation work: fails on an empty test list.
    pub async fn initialize_tdd_cycle(
        &self,
        id: &SessionId,
        tests: Vec<TestCase>,
    ) -> Result<(), EngineError> {
        self.engine.initialize(id, tests).await
    }

    /// Make the session's pending jobs ineligible for claiming.
    pub async fn pause(&self, id: &SessionId) -> Result<(), EngineError> {
        let mut session = self.require(id).await?;
        session.pause()?;
        self.store.update_session(session).await?;
        tracing::info!(session_id = %id, "session paused");
        Ok(())
    }

    /// Restore eligibility of the session's pending jobs.
    pub async fn resume(&self, id: &SessionId) -> Result<(), EngineError> {
        let mut session = self.require(id).await?;
        session.resume()?;
        self.store.update_session(session).await?;
        tracing::info!(session_id = %id, "session resumed");
        Ok(())
    }

    /// Cancel on user request. In-flight subprocesses are not
    /// interrupted; they run out through the normal timeout path.
    pub async fn cancel(&self, id: &SessionId) -> Result<(), EngineError> {
        let mut session = self.require(id).await?;
        session.cancel()?;
        self.store.update_session(session).await?;
        tracing::info!(session_id = %id, "session cancelled");
        Ok(())
    }

    pub async fn status(&self, id: &SessionId) -> Result<SessionView, EngineError> {
        let session = self.require(id).await?;
        let (current_phase, tests_passed, tests_total) = session
            .tdd
            .as_ref()
            .map(|cycle| (Some(cycle.phase), cycle.green_count(), cycle.total_tests))
            .unwrap_or((None, 0, 0));
        Ok(SessionView {
            status: session.status,
            progress: session.progress,
            current_phase,
            tests_passed,
            tests_total,
        })
    }

    async fn require(&self, id: &SessionId) -> Result<CodingSession, EngineError> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
