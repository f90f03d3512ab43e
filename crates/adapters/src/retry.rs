// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry controller for transient provider failures.
//!
//! The upstream agent process communicates failures only via text, so
//! classification is heuristic signature matching, not a typed error
//! channel. Transient failures are retried with capped exponential
//! backoff plus bounded jitter; anything else short-circuits.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::subprocess::{ExecOutcome, RunnerError};

/// Error text that indicates the provider is temporarily overloaded or
/// rate limited, warranting a retry.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "429",
    "overloaded",
    "resource exhausted",
    "resource_exhausted",
    "quota",
    "connection reset",
    "connection refused",
    "connection closed",
    "econnreset",
    "etimedout",
    "socket hang up",
];

/// Whether the given failure text matches a known transient signature.
pub fn is_transient(error: &str) -> bool {
    let haystack = error.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| haystack.contains(sig))
}

static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Deterministically-seeded jitter in `[0, cap]`.
///
/// A mixed counter stands in for an RNG: good enough to de-synchronize
/// callers without another dependency.
pub fn jitter_within(cap: Duration) -> Duration {
    let cap_ms = cap.as_millis() as u64;
    if cap_ms == 0 {
        return Duration::ZERO;
    }
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .rotate_left(23)
        ^ 0xD1B5_4A32_D192_ED03;
    Duration::from_millis(mixed % (cap_ms + 1))
}

/// Exponential backoff with a retry ceiling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (ceiling of 5 by default)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt `attempt` (0-based).
    ///
    /// The deterministic part doubles from `base_delay` and caps at
    /// `max_delay`; jitter keeps the result in [50%, 100%] of it, which
    /// stays monotonically non-decreasing across attempts.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let cap_ms = self.max_delay.as_millis() as u64;
        let shift = attempt.min(16);
        let det_ms = base_ms.saturating_mul(1_u64 << shift).min(cap_ms);

        let low = det_ms / 2;
        let span = det_ms.saturating_sub(low);
        let extra = jitter_within(Duration::from_millis(span)).as_millis() as u64;
        Duration::from_millis(low.saturating_add(extra))
    }

    /// Run an agent invocation, retrying transient failures.
    ///
    /// `op` receives the 1-based attempt number. A fatal failure (or a
    /// [`RunnerError`] — spawn failures and timeouts are terminal)
    /// returns immediately; exhausting the ceiling returns the last
    /// transient failure as-is.
    pub async fn run<F, Fut>(&self, mut op: F) -> Result<ExecOutcome, RunnerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<ExecOutcome, RunnerError>>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            let outcome = op(attempt).await?;
            if outcome.success {
                return Ok(outcome);
            }

            let error = outcome.error.as_deref().unwrap_or("");
            if !is_transient(error) {
                return Ok(outcome);
            }
            if attempt == attempts {
                tracing::warn!(attempt, error, "retry ceiling exhausted");
                return Ok(outcome);
            }

            let delay = self.backoff_delay(attempt - 1);
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error,
                "transient agent failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
        unreachable!("loop returns on the final attempt")
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
