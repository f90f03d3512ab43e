// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn cases(n: usize) -> Vec<TestCase> {
    (0..n)
        .map(|i| TestCase::new(format!("test_{i}"), format!("assert!({i} >= 0);")))
        .collect()
}

#[test]
fn new_cycle_starts_at_green_batch_zero() {
    let cycle = TddCycle::new(cases(7), 3);
    assert_eq!(cycle.test_index, 0);
    assert_eq!(cycle.phase, TddPhase::Green);
    assert_eq!(cycle.total_tests, 7);
    assert_eq!(cycle.batch_range(), 0..3);
    assert_eq!(cycle.progress_percent(), 0);
    assert!(!cycle.is_complete());
}

#[test]
fn batch_size_is_clamped_to_at_least_one() {
    let cycle = TddCycle::new(cases(2), 0);
    assert_eq!(cycle.batch_size, 1);
}

#[test]
fn index_walks_batches_and_clamps_at_total() {
    // totalTests=7, batchSize=3: 0 -> 3 -> 6 -> 7 (complete)
    let mut cycle = TddCycle::new(cases(7), 3);

    cycle.advance();
    assert_eq!(cycle.test_index, 3);
    cycle.advance();
    assert_eq!(cycle.test_index, 6);
    assert_eq!(cycle.batch_range(), 6..7);
    cycle.advance();
    assert_eq!(cycle.test_index, 7);
    assert!(cycle.is_complete());

    // The cursor never moves backwards or past the end.
    cycle.advance();
    assert_eq!(cycle.test_index, 7);
}

#[test]
fn refactor_checkpoints_fire_once_midway_and_once_at_completion() {
    let mut cycle = TddCycle::new(cases(7), 3);

    cycle.mark_batch_green();
    cycle.advance(); // index 3, 42%
    assert_eq!(cycle.refactor_checkpoint(), None);

    cycle.mark_batch_green();
    cycle.advance(); // index 6, 85% — first crossing of the midpoint
    assert_eq!(cycle.refactor_checkpoint(), Some(RefactorCheckpoint::Midpoint));
    // Latched: consulting again does not re-fire.
    assert_eq!(cycle.refactor_checkpoint(), None);
    cycle.mark_refactored();

    cycle.mark_batch_green();
    cycle.advance(); // index 7, complete
    assert_eq!(cycle.refactor_checkpoint(), Some(RefactorCheckpoint::Completion));
    assert_eq!(cycle.refactor_count, 1);
}

#[test]
fn stuck_batches_trigger_a_stuck_checkpoint() {
    let mut cycle = TddCycle::new(cases(9), 3);
    assert_eq!(cycle.record_stuck(), 1);
    assert_eq!(cycle.record_stuck(), 2);
    assert!(!cycle.batch_is_stuck());
    assert_eq!(cycle.record_stuck(), 3);
    assert!(cycle.batch_is_stuck());

    // Force-advance past the stuck batch; cleanup checkpoint is due.
    cycle.advance();
    assert_eq!(cycle.refactor_checkpoint(), Some(RefactorCheckpoint::Stuck));
}

#[test]
fn mark_batch_green_advances_statuses_and_resets_stuck() {
    let mut cycle = TddCycle::new(cases(5), 2);
    cycle.record_stuck();
    assert_eq!(cycle.stuck_count, 1);

    cycle.mark_batch_green();
    assert_eq!(cycle.stuck_count, 0);
    assert_eq!(cycle.tests[0].status, TestStatus::Green);
    assert_eq!(cycle.tests[1].status, TestStatus::Green);
    assert_eq!(cycle.tests[2].status, TestStatus::Pending);
    // Two attempts recorded for the batch: the stuck one and the green one.
    assert_eq!(cycle.tests[0].attempts, 2);
}

#[test]
fn statuses_never_regress() {
    let mut cycle = TddCycle::new(cases(2), 2);
    cycle.mark_batch_green();
    cycle.advance();
    cycle.mark_refactored();
    assert_eq!(cycle.tests[0].status, TestStatus::Refactored);

    // Re-running the green/refactor markers does not demote anything.
    cycle.mark_batch_green();
    cycle.mark_refactored();
    assert_eq!(cycle.tests[0].status, TestStatus::Refactored);
    assert_eq!(cycle.tests[1].status, TestStatus::Refactored);
}

#[test]
fn mark_refactored_only_touches_green_tests_behind_the_cursor() {
    let mut cycle = TddCycle::new(cases(4), 2);
    cycle.mark_batch_green();
    cycle.advance(); // index 2

    cycle.mark_refactored();
    assert_eq!(cycle.tests[0].status, TestStatus::Refactored);
    assert_eq!(cycle.tests[1].status, TestStatus::Refactored);
    assert_eq!(cycle.tests[2].status, TestStatus::Pending);
    assert_eq!(cycle.refactor_count, 1);
}

#[parameterized(
    empty = { 0, 0, 100 },
    start = { 10, 0, 0 },
    third = { 9, 3, 33 },
    done = { 4, 4, 100 },
)]
fn progress_percent_tracks_the_cursor(total: usize, index: usize, expected: u8) {
    let mut cycle = TddCycle::new(cases(total), 3);
    while cycle.test_index < index {
        cycle.advance();
    }
    assert_eq!(cycle.progress_percent(), expected);
}

#[test]
fn context_bundle_is_carried_verbatim() {
    let cycle = TddCycle::new(cases(1), 3).with_context("repo map + conventions");
    assert_eq!(cycle.context_bundle.as_deref(), Some("repo map + conventions"));
}

#[test]
fn cycle_survives_whole_state_serde_replace() {
    let mut cycle = TddCycle::new(cases(7), 3);
    cycle.mark_batch_green();
    cycle.advance();
    cycle.record_stuck();

    let json = serde_json::to_string(&cycle).unwrap();
    let restored: TddCycle = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.test_index, 3);
    assert_eq!(restored.stuck_count, 1);
    assert_eq!(restored.tests[0].status, TestStatus::Green);
    assert_eq!(restored.tests[3].attempts, 1);
}
