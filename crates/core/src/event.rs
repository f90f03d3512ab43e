// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only job events.
//!
//! Events exist for observability and streaming — control flow never
//! reads them back. Entries are write-once: never mutated or deleted.

use crate::job::JobId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    /// Incremental agent output
    Progress,
    /// Incremental agent error output
    Error,
    Completed,
    Failed,
}

crate::simple_display! {
    JobEventKind {
        Progress => "progress",
        Error => "error",
        Completed => "completed",
        Failed => "failed",
    }
}

/// One append-only event in a job's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub kind: JobEventKind,
    pub payload: String,
    pub at_ms: u64,
}

impl JobEvent {
    pub fn new(job_id: JobId, kind: JobEventKind, payload: impl Into<String>, at_ms: u64) -> Self {
        Self {
            job_id,
            kind,
            payload: payload.into(),
            at_ms,
        }
    }
}
