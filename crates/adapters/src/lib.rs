// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapters around the external agent process boundary.
//!
//! The agent is an opaque black box reached through a CLI: submit work,
//! get text back, maybe it fails transiently. These adapters cover the
//! three concerns that boundary forces on us — running the process
//! ([`subprocess`]), retrying transient provider failures ([`retry`]),
//! and recovering structured data from free-form output ([`extract`]).

pub mod extract;
pub mod retry;
pub mod subprocess;

pub use extract::{extract_payload, test_counts, TestCounts};
pub use retry::{is_transient, RetryPolicy};
pub use subprocess::{
    failure_signature, AgentCommand, AgentRunner, ExecOutcome, ExecRequest, ProcessRunner,
    RunnerError, RunnerEvent,
};
