//! Suspension and resumption E2E tests.
//!
//! Interrupted runs (memory ceiling, cluster failure, cancellation) must
//! hand back a resume point that reproduces the uninterrupted end state.

use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use bulksync_engine::{
    BuilderRegistry, BulkIndexer, IndexerConfig, RunOutcome, RunRequest, ScanFactory,
    SuspendReason, WriteError,
};
use bulksync_types::{ContentType, ResumeState};
use e2e_tests::{FakeBuilder, MemorySource, RecordingClient, ScriptedMemoryGate, TestHarness, SCOPE};

fn stale_harness() -> TestHarness {
    let harness = TestHarness::new(
        MemorySource::new((0..6000).filter(|id| id % 7 != 0)),
        FakeBuilder::every_nth("post", 3),
    );
    harness
        .client
        .seed(harness.documents((0..6200).filter(|id| id % 2 == 0)));
    harness
}

/// Tripping the memory gate mid-batch suspends at the batch start, and the
/// resumed run reaches the same index state as an uninterrupted one.
#[test]
fn test_memory_suspend_and_resume() {
    let reference = stale_harness();
    reference.run(0);
    let expected = reference.client.snapshot();

    let harness = stale_harness();
    let outcome = harness.run_with_gate(0, Arc::new(ScriptedMemoryGate::trip_at(1000)));

    let resume = match outcome {
        RunOutcome::Suspended { resume, reason, .. } => {
            assert_eq!(reason, SuspendReason::MemoryCeiling);
            resume
        }
        other => panic!("expected suspension, got {:?}", other),
    };
    let next = resume.next_start_id;

    // Everything before the resume point was written, nothing at or after it.
    let written: Vec<u64> = harness.client.written_ids();
    assert!(written.iter().all(|id| *id < next));
    let admitted_before: Vec<u64> = harness
        .expected_ids()
        .into_iter()
        .filter(|id| *id < next)
        .collect();
    assert_eq!(written, admitted_before);
    assert!(written.len() < 1000, "the in-flight batch is discarded");

    let outcome = harness.run_with_gate(next, Arc::new(ScriptedMemoryGate::never()));
    assert!(outcome.is_completed());
    assert_eq!(harness.client.snapshot(), expected);
}

/// A gate that is already over the ceiling suspends before any call.
#[test]
fn test_memory_over_ceiling_at_start() {
    let harness = TestHarness::sequential(100);
    let outcome = harness.run_with_gate(40, Arc::new(ScriptedMemoryGate::trip_at(0)));

    assert_eq!(outcome.resume_state().unwrap().next_start_id, 40);
    assert!(harness.client.calls().is_empty());
}

/// Scenario D: the third bulk write hits a down cluster.
#[test]
fn test_scenario_d_cluster_down_on_third_write() {
    let harness = TestHarness::sequential(10_000);
    harness
        .client
        .fail_write_on(3, WriteError::ClusterUnreachable("connection refused".into()));

    let outcome = harness.run(0);
    let (resume, error) = match outcome {
        RunOutcome::RetryLater { resume, error, .. } => (resume, error),
        other => panic!("expected retry-later, got {:?}", other),
    };
    assert!(error.is_retryable());
    assert_eq!(resume.next_start_id, 300);
    assert_eq!(resume.content_types, vec![ContentType::new("post")]);

    // At-least-once: the first two batches stay indexed
    assert_eq!(
        harness.client.indexed_ids("post"),
        (0..300).collect::<BTreeSet<u64>>()
    );

    let outcome = harness
        .indexer()
        .run(&RunRequest::resume(&resume))
        .unwrap();
    assert!(outcome.is_completed());
    assert_eq!(harness.client.indexed_ids("post"), harness.expected_ids());
}

/// Non-infrastructure write failures are surfaced, not retried.
#[test]
fn test_bad_request_is_fatal() {
    let harness = TestHarness::sequential(1000);
    harness
        .client
        .fail_write_on(1, WriteError::MalformedRequest("unexpected token".into()));

    let err = harness.indexer().run(&harness.request(0)).unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("unexpected token"));
}

/// The resume state survives a byte round trip through caller storage.
#[test]
fn test_resume_state_persisted_by_caller() {
    let harness = TestHarness::sequential(5000);
    harness
        .client
        .fail_write_on(2, WriteError::ShardUnavailable("shard 2".into()));

    let outcome = harness.run(0);
    let bytes = outcome.resume_state().unwrap().to_bytes().unwrap();
    let restored = ResumeState::from_bytes(&bytes).unwrap();
    assert_eq!(restored.next_start_id, 150);
    assert_eq!(restored.scope, SCOPE);

    harness.indexer().run(&RunRequest::resume(&restored)).unwrap();
    assert_eq!(harness.client.indexed_ids("post").len(), 5000);
}

/// Multi-type runs resume with the remaining types, current one first.
#[test]
fn test_multi_type_resume() {
    let client = Arc::new(RecordingClient::new());
    let posts = Arc::new(MemorySource::sequential(500));
    let pages = Arc::new(MemorySource::sequential(400));
    let registry = BuilderRegistry::new()
        .with(
            Arc::new(FakeBuilder::all("post")),
            Arc::new(ScanFactory::new(posts)),
        )
        .with(
            Arc::new(FakeBuilder::all("page")),
            Arc::new(ScanFactory::new(pages)),
        );
    let indexer = BulkIndexer::new(Arc::new(registry), client.clone(), IndexerConfig::default());

    // 1 pre-run check + 500 post documents + 150 page documents
    let request = RunRequest::new(SCOPE, vec!["post".into(), "page".into()]);
    let outcome = indexer
        .with_memory_gate(Arc::new(ScriptedMemoryGate::trip_at(651)))
        .run(&request)
        .unwrap();

    let resume = outcome.resume_state().unwrap().clone();
    assert_eq!(resume.content_types, vec![ContentType::new("page")]);
    assert_eq!(resume.next_start_id, 150);
    assert_eq!(outcome.stats().content_types_completed, 1);
    assert_eq!(client.indexed_ids("post").len(), 500);
    assert_eq!(client.indexed_ids("page").len(), 150);
}

/// Cancellation is honored at the next batch boundary.
#[test]
fn test_cancellation_resumes_cleanly() {
    let harness = TestHarness::sequential(3000);
    let token = CancellationToken::new();
    token.cancel();

    let outcome = harness
        .indexer()
        .run(&harness.request(1200).with_cancellation(token))
        .unwrap();
    match &outcome {
        RunOutcome::Suspended { resume, reason, .. } => {
            assert_eq!(*reason, SuspendReason::Cancelled);
            assert_eq!(resume.next_start_id, 1200);
        }
        other => panic!("expected suspension, got {:?}", other),
    }

    let outcome = harness.run(1200);
    assert!(outcome.is_completed());
    assert_eq!(harness.client.indexed_ids("post"), (1200..3000).collect::<BTreeSet<u64>>());
}
