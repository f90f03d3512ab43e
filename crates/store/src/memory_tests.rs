// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gl_core::{FakeClock, JobStatus, SessionStatus};
use std::time::Duration;

fn store() -> (MemoryStore<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (MemoryStore::new(clock.clone()), clock)
}

fn job_created_at(id: &str, at_ms: u64) -> Job {
    Job::builder().id(id).created_at_ms(at_ms).build()
}

#[tokio::test]
async fn find_pending_returns_oldest_first_up_to_limit() {
    let (store, _) = store();
    store.insert(job_created_at("job-b", 2_000)).await.unwrap();
    store.insert(job_created_at("job-a", 1_000)).await.unwrap();
    store.insert(job_created_at("job-c", 3_000)).await.unwrap();

    let found = store.find_pending(&HashSet::new(), 2).await.unwrap();
    let ids: Vec<&str> = found.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["job-a", "job-b"]);
}

#[tokio::test]
async fn find_pending_skips_excluded_and_non_pending() {
    let (store, _) = store();
    store.insert(job_created_at("job-1", 1_000)).await.unwrap();
    store.insert(job_created_at("job-2", 2_000)).await.unwrap();
    store.claim(&JobId::from_string("job-1")).await.unwrap();

    let mut excluding = HashSet::new();
    excluding.insert(JobId::from_string("job-2"));
    let found = store.find_pending(&excluding, 10).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn paused_session_jobs_disappear_until_resume() {
    let (store, _) = store();
    let mut session = CodingSession::builder().status(SessionStatus::Running).build();
    let session_id = session.id.clone();
    store.insert_session(session.clone()).await.unwrap();

    let job = Job::builder().id("job-1").build().for_session(session_id.clone());
    store.insert(job).await.unwrap();
    assert_eq!(store.find_pending(&HashSet::new(), 10).await.unwrap().len(), 1);

    session.pause().unwrap();
    store.update_session(session.clone()).await.unwrap();
    assert!(store.find_pending(&HashSet::new(), 10).await.unwrap().is_empty());

    // Resume: the same job reappears without re-creation.
    session.resume().unwrap();
    store.update_session(session).await.unwrap();
    let found = store.find_pending(&HashSet::new(), 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "job-1");
}

#[tokio::test]
async fn claim_stamps_started_at_from_the_clock() {
    let (store, clock) = store();
    clock.set_epoch_ms(77_000);
    store.insert(job_created_at("job-1", 1_000)).await.unwrap();

    store.claim(&JobId::from_string("job-1")).await.unwrap();
    let job = store.get(&JobId::from_string("job-1")).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.started_at_ms, Some(77_000));
}

#[tokio::test]
async fn complete_twice_has_no_second_effect() {
    let (store, clock) = store();
    store.insert(job_created_at("job-1", 1_000)).await.unwrap();
    let id = JobId::from_string("job-1");
    store.claim(&id).await.unwrap();

    clock.set_epoch_ms(2_000_000);
    store.complete(&id, "first output").await.unwrap();
    clock.set_epoch_ms(3_000_000);
    store.complete(&id, "replayed output").await.unwrap();

    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.output.as_deref(), Some("first output"));
    assert_eq!(job.finished_at_ms, Some(2_000_000));

    // Same at-least-once tolerance for a late fail signal.
    store.fail(&id, "late timeout").await.unwrap();
    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn missing_jobs_are_reported() {
    let (store, _) = store();
    let id = JobId::from_string("job-ghost");
    let err = store.claim(&id).await.unwrap_err();
    assert!(matches!(err, StoreError::JobNotFound(_)));
}

#[tokio::test]
async fn events_are_append_only_and_ordered() {
    let (store, clock) = store();
    store.insert(job_created_at("job-1", 1_000)).await.unwrap();
    let id = JobId::from_string("job-1");

    clock.set_epoch_ms(10);
    store.append_event(&id, JobEventKind::Progress, "chunk 1").await.unwrap();
    clock.set_epoch_ms(20);
    store.append_event(&id, JobEventKind::Completed, "done").await.unwrap();

    let events = store.events(&id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, JobEventKind::Progress);
    assert_eq!(events[0].at_ms, 10);
    assert_eq!(events[1].kind, JobEventKind::Completed);
}

#[tokio::test]
async fn progress_chunks_accumulate_on_the_job_record() {
    let (store, _) = store();
    store.insert(job_created_at("job-1", 1_000)).await.unwrap();
    let id = JobId::from_string("job-1");
    store.claim(&id).await.unwrap();

    store.append_event(&id, JobEventKind::Progress, "line 1").await.unwrap();
    store.append_event(&id, JobEventKind::Error, "warning: flaky").await.unwrap();
    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.output.as_deref(), Some("line 1\nwarning: flaky"));

    // Completion replaces the accumulated text with the definitive output.
    store.complete(&id, "line 1\nwarning: flaky\ndone").await.unwrap();
    store.append_event(&id, JobEventKind::Progress, "late chunk").await.unwrap();
    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.output.as_deref(), Some("line 1\nwarning: flaky\ndone"));
}

#[tokio::test]
async fn find_stuck_applies_long_and_short_timeouts() {
    let (store, clock) = store();
    clock.set_epoch_ms(0);
    for id in ["job-old", "job-old-tracked"] {
        store.insert(job_created_at(id, 0)).await.unwrap();
        store.claim(&JobId::from_string(id)).await.unwrap();
    }

    // 40 minutes later a fresh job is claimed; the clock then moves
    // another 6 minutes so the first two are 46 minutes old and the
    // fresh one is 6 minutes old.
    clock.set_epoch_ms(40 * 60 * 1_000);
    store.insert(job_created_at("job-young", 0)).await.unwrap();
    store.claim(&JobId::from_string("job-young")).await.unwrap();
    clock.advance(Duration::from_secs(6 * 60));

    let mut tracked = HashSet::new();
    tracked.insert(JobId::from_string("job-old-tracked"));
    tracked.insert(JobId::from_string("job-young"));
    let mut stuck: Vec<String> = store
        .find_stuck(Duration::from_secs(30 * 60), Duration::from_secs(5 * 60), &tracked)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id.to_string())
        .collect();
    stuck.sort();

    // The long timeout reclaims even tracked jobs; a young tracked job
    // past only the short timeout is left alone.
    assert_eq!(stuck, vec!["job-old", "job-old-tracked"]);
}

#[tokio::test]
async fn find_stuck_respects_short_timeout_tracking() {
    let (store, clock) = store();
    clock.set_epoch_ms(0);
    store.insert(job_created_at("job-mine", 0)).await.unwrap();
    store.claim(&JobId::from_string("job-mine")).await.unwrap();

    clock.advance(Duration::from_secs(10 * 60));
    let mut tracked = HashSet::new();
    tracked.insert(JobId::from_string("job-mine"));

    // 10 min old, tracked by this process: not stuck.
    let stuck = store
        .find_stuck(Duration::from_secs(30 * 60), Duration::from_secs(5 * 60), &tracked)
        .await
        .unwrap();
    assert!(stuck.is_empty());

    // Same age, but claimed by a process that went away: stuck.
    let stuck = store
        .find_stuck(Duration::from_secs(30 * 60), Duration::from_secs(5 * 60), &HashSet::new())
        .await
        .unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, "job-mine");
}

#[tokio::test]
async fn executions_group_by_suite_kind_most_recent_first() {
    let (store, _) = store();
    let session = CodingSession::builder().build();
    let id = session.id.clone();
    store.insert_session(session).await.unwrap();

    store
        .record_execution(&id, SuiteKind::Unit, TestExecution::from_counts(3, 3, 0, 0, 1, 2))
        .await
        .unwrap();
    store
        .record_execution(&id, SuiteKind::Unit, TestExecution::from_counts(3, 2, 1, 0, 3, 4))
        .await
        .unwrap();
    store
        .record_execution(&id, SuiteKind::Integration, TestExecution::from_counts(1, 1, 0, 0, 5, 6))
        .await
        .unwrap();

    let suites = store.suites(&id).await.unwrap();
    assert_eq!(suites.len(), 2);
    let unit = suites.iter().find(|s| s.kind == SuiteKind::Unit).unwrap();
    assert_eq!(unit.executions.len(), 2);
    assert_eq!(unit.latest().unwrap().started_at_ms, 3);
}

#[tokio::test]
async fn update_session_requires_existing_record() {
    let (store, _) = store();
    let session = CodingSession::builder().build();
    let err = store.update_session(session).await.unwrap_err();
    assert!(matches!(err, StoreError::SessionNotFound(_)));
}
