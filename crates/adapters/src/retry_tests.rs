// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::subprocess::ExecOutcome;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use yare::parameterized;

#[parameterized(
    rate_limit = { "Anthropic rate limit reached, try again later" },
    status_code = { "request failed with 429" },
    overloaded = { "upstream overloaded_error" },
    resource = { "RESOURCE_EXHAUSTED: out of tokens" },
    conn_reset = { "connection reset by peer" },
    hang_up = { "socket hang up" },
)]
fn transient_signatures_match(text: &str) {
    assert!(is_transient(text));
}

#[parameterized(
    auth = { "invalid api key" },
    parse = { "no structured payload found in agent output" },
    empty = { "" },
)]
fn fatal_errors_do_not_match(text: &str) {
    assert!(!is_transient(text));
}

#[test]
fn jitter_stays_within_cap() {
    for _ in 0..64 {
        let jitter = jitter_within(Duration::from_millis(500));
        assert!(jitter <= Duration::from_millis(500));
    }
    assert_eq!(jitter_within(Duration::ZERO), Duration::ZERO);
}

#[test]
fn backoff_doubles_and_caps_within_jitter_bounds() {
    let policy = RetryPolicy::default();
    // Deterministic part: 2s, 4s, 8s, ... capped at 60s; jitter keeps the
    // result in [50%, 100%] of it.
    for (attempt, det_ms) in [(0u32, 2_000u64), (1, 4_000), (2, 8_000), (10, 60_000)] {
        let delay = policy.backoff_delay(attempt).as_millis() as u64;
        assert!(delay >= det_ms / 2, "attempt {attempt}: {delay} < {}", det_ms / 2);
        assert!(delay <= det_ms, "attempt {attempt}: {delay} > {det_ms}");
    }
}

fn transient_failure() -> ExecOutcome {
    ExecOutcome::failure("partial output", "429 too many requests")
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_kth_attempt_after_transient_failures() {
    let policy = RetryPolicy::default();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let outcome = policy
        .run(move |attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Ok(transient_failure())
                } else {
                    Ok(ExecOutcome::success("done"))
                }
            }
        })
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn always_transient_exhausts_exactly_the_ceiling() {
    let policy = RetryPolicy::default();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let outcome = policy
        .run(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(transient_failure())
            }
        })
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(calls.load(Ordering::SeqCst), policy.max_attempts);
    // The last failure comes back as-is.
    assert_eq!(outcome.error.as_deref(), Some("429 too many requests"));
}

#[tokio::test(start_paused = true)]
async fn delays_between_attempts_never_decrease() {
    let policy = RetryPolicy::default();
    let timestamps: Arc<Mutex<Vec<tokio::time::Instant>>> = Arc::new(Mutex::new(Vec::new()));

    let recorder = Arc::clone(&timestamps);
    let _ = policy
        .run(move |_| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().push(tokio::time::Instant::now());
                Ok(transient_failure())
            }
        })
        .await
        .unwrap();

    let times = timestamps.lock().unwrap();
    assert_eq!(times.len(), 5);
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    for pair in gaps.windows(2) {
        assert!(pair[1] >= pair[0], "delays decreased: {:?}", gaps);
    }
}

#[tokio::test(start_paused = true)]
async fn fatal_failure_short_circuits_without_retry() {
    let policy = RetryPolicy::default();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let outcome = policy
        .run(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ExecOutcome::failure("", "invalid api key"))
            }
        })
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn runner_errors_are_terminal() {
    let policy = RetryPolicy::default();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result = policy
        .run(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RunnerError::Timeout(Duration::from_secs(1)))
            }
        })
        .await;

    assert!(matches!(result, Err(RunnerError::Timeout(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
