// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core domain types for the greenlight agent-job coordinator.
//!
//! Everything here is plain data plus invariant-preserving methods:
//! jobs and their append-only events, coding sessions, the embedded
//! TDD cycle value object, and test suite result records. No I/O.

pub mod clock;
pub mod event;
pub mod id;
pub mod job;
mod macros;
pub mod session;
pub mod suite;
pub mod tdd;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{JobEvent, JobEventKind};
pub use job::{args, Job, JobId, JobStatus};
pub use session::{CodingSession, SessionId, SessionStatus, TransitionError};
pub use suite::{ExecutionStatus, SuiteId, SuiteKind, TestExecution, TestSuite};
pub use tdd::{
    RefactorCheckpoint, TddCycle, TddPhase, TestCase, TestStatus, DEFAULT_BATCH_SIZE,
    STUCK_THRESHOLD,
};
