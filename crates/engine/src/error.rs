// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type

use gl_core::{JobId, SessionId, TransitionError};
use gl_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("cannot initialize a TDD cycle with an empty test list")]
    EmptyTestList,
    #[error("no TDD cycle initialized for session {0}")]
    CycleNotInitialized(SessionId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
