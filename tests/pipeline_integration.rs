//! End-to-end tests for batch generation against SQLite storage.
//!
//! The generator is mocked; storage is real.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lessonforge::content::{CandidateAnswer, CandidateContent, CandidateQuestion};
use lessonforge::error::{GenerationError, TransientKind};
use lessonforge::pipeline::{BatchConfig, FailureReason, RetryPolicy};
use lessonforge::{
    BatchOrchestrator, BatchStatus, ContentGenerator, ContentValidator, SqliteUnitStore, Unit,
    UnitStore,
};

fn passage(words: usize) -> String {
    let mut text = String::from("## Key idea\n\n");
    let body: Vec<&str> = std::iter::repeat("concept").take(words - 2).collect();
    text.push_str(&body.join(" "));
    text.push_str(" **done**");
    text
}

fn valid_candidate() -> CandidateContent {
    CandidateContent {
        passage_a: passage(330),
        passage_b: passage(360),
        quiz: vec![
            CandidateQuestion {
                kind: "multiple_choice".to_string(),
                question: "Which rule differentiates a product of functions?".to_string(),
                options: vec![
                    "Chain rule".to_string(),
                    "Product rule".to_string(),
                    "Quotient rule".to_string(),
                ],
                correct_answer: Some(CandidateAnswer::Text("Product rule".to_string())),
                explanation: "The product rule handles f(x)g(x) directly.".to_string(),
            },
            CandidateQuestion {
                kind: "true_false".to_string(),
                question: "The derivative of a constant is zero.".to_string(),
                options: Vec::new(),
                correct_answer: Some(CandidateAnswer::Bool(true)),
                explanation: "A constant does not change, so its slope is zero.".to_string(),
            },
        ],
    }
}

/// Generator that fails transiently for scripted sequence numbers.
#[derive(Default)]
struct MockGenerator {
    always_failing: HashSet<u32>,
    call_count: AtomicUsize,
    calls: Mutex<Vec<u32>>,
}

impl MockGenerator {
    fn failing(sequence_numbers: &[u32]) -> Self {
        Self {
            always_failing: sequence_numbers.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, unit: &Unit) -> Result<CandidateContent, GenerationError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .expect("lock not poisoned")
            .push(unit.sequence_number);

        if self.always_failing.contains(&unit.sequence_number) {
            return Err(GenerationError::transient(
                TransientKind::Upstream(503),
                "service unavailable",
            ));
        }
        Ok(valid_candidate())
    }
}

fn units(parent_id: &str, count: u32) -> Vec<Unit> {
    (1..=count)
        .map(|n| {
            Unit::new(parent_id, n, format!("Segment {n}"))
                .with_description("Derivatives and their rules")
                .with_reference_text("A derivative measures instantaneous change.")
        })
        .collect()
}

fn fast_config() -> BatchConfig {
    BatchConfig::immediate().with_retry(RetryPolicy::immediate().with_max_attempts(3))
}

fn orchestrator(
    generator: Arc<MockGenerator>,
    store: Arc<SqliteUnitStore>,
) -> BatchOrchestrator {
    BatchOrchestrator::new(generator, store, ContentValidator::default(), fast_config())
}

#[tokio::test]
async fn test_batch_generates_every_unit() {
    let store = Arc::new(SqliteUnitStore::in_memory().await.expect("store"));
    let generator = Arc::new(MockGenerator::default());

    let result = orchestrator(generator.clone(), store.clone())
        .generate_batch("lecture-7", units("lecture-7", 3))
        .await
        .expect("batch");

    assert_eq!(result.status, BatchStatus::Complete);
    assert_eq!(generator.calls(), 3);

    let stored = store.fetch_all("lecture-7").await.expect("fetch");
    let sequence: Vec<u32> = stored.iter().map(|s| s.sequence_number()).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
    assert!(stored.iter().all(|s| s.record.true_false.correct_answer));
    assert_eq!(stored[0].record.multiple_choice.correct_answer, "Product rule");
}

#[tokio::test]
async fn test_second_run_makes_no_generation_calls() {
    let store = Arc::new(SqliteUnitStore::in_memory().await.expect("store"));
    let first = Arc::new(MockGenerator::default());
    orchestrator(first.clone(), store.clone())
        .generate_batch("lecture-7", units("lecture-7", 3))
        .await
        .expect("first run");

    let before = store.fetch_all("lecture-7").await.expect("fetch");

    let second = Arc::new(MockGenerator::default());
    let result = orchestrator(second.clone(), store.clone())
        .generate_batch("lecture-7", units("lecture-7", 3))
        .await
        .expect("second run");

    assert_eq!(second.calls(), 0);
    assert_eq!(result.status, BatchStatus::Complete);
    assert_eq!(result.skipped, 3);

    let after = store.fetch_all("lecture-7").await.expect("fetch");
    let ids_before: Vec<_> = before.iter().map(|s| s.id).collect();
    let ids_after: Vec<_> = after.iter().map(|s| s.id).collect();
    assert_eq!(ids_before, ids_after);
}

#[tokio::test]
async fn test_one_failing_unit_yields_partial_result() {
    let store = Arc::new(SqliteUnitStore::in_memory().await.expect("store"));
    let generator = Arc::new(MockGenerator::failing(&[3]));

    let result = orchestrator(generator.clone(), store.clone())
        .generate_batch("lecture-7", units("lecture-7", 5))
        .await
        .expect("batch");

    assert_eq!(result.status, BatchStatus::Partial);
    assert_eq!(result.completed.len(), 4);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].unit.sequence_number, 3);
    assert!(matches!(
        result.failed[0].reason,
        FailureReason::Exhausted { attempts: 3, .. }
    ));
    // 4 successes plus 3 attempts at unit 3
    assert_eq!(generator.calls(), 7);
    assert_eq!(
        *generator.calls.lock().expect("lock not poisoned"),
        vec![1, 2, 3, 3, 3, 4, 5]
    );

    // a rerun only retries the missing unit
    let retry = Arc::new(MockGenerator::default());
    let rerun = orchestrator(retry.clone(), store.clone())
        .generate_batch("lecture-7", units("lecture-7", 5))
        .await
        .expect("rerun");
    assert_eq!(retry.calls(), 1);
    assert_eq!(rerun.status, BatchStatus::Complete);
    assert_eq!(store.fetch_all("lecture-7").await.expect("fetch").len(), 5);
}

#[tokio::test]
async fn test_restart_resumes_from_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("content.db").display());

    {
        let store = Arc::new(SqliteUnitStore::connect(&url).await.expect("connect"));
        store.run_migrations().await.expect("migrate");
        let generator = Arc::new(MockGenerator::failing(&[2, 3]));
        let result = orchestrator(generator, store.clone())
            .generate_batch("lecture-9", units("lecture-9", 3))
            .await
            .expect("first run");
        assert_eq!(result.status, BatchStatus::Partial);
        store.pool().close().await;
    }

    let store = Arc::new(SqliteUnitStore::connect(&url).await.expect("reconnect"));
    store.run_migrations().await.expect("migrations are idempotent");
    let generator = Arc::new(MockGenerator::default());
    let result = orchestrator(generator.clone(), store.clone())
        .generate_batch("lecture-9", units("lecture-9", 3))
        .await
        .expect("second run");

    assert_eq!(result.status, BatchStatus::Complete);
    assert_eq!(result.skipped, 1);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_runs_store_one_record_per_unit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
    let store = Arc::new(SqliteUnitStore::connect(&url).await.expect("connect"));
    store.run_migrations().await.expect("migrate");

    let a = orchestrator(Arc::new(MockGenerator::default()), store.clone());
    let b = orchestrator(Arc::new(MockGenerator::default()), store.clone());

    let (ra, rb) = tokio::join!(
        a.generate_batch("lecture-3", units("lecture-3", 4)),
        b.generate_batch("lecture-3", units("lecture-3", 4)),
    );

    assert_eq!(ra.expect("run a").status, BatchStatus::Complete);
    assert_eq!(rb.expect("run b").status, BatchStatus::Complete);

    let stored = store.fetch_all("lecture-3").await.expect("fetch");
    let sequence: Vec<u32> = stored.iter().map(|s| s.sequence_number()).collect();
    assert_eq!(sequence, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_regenerate_replaces_stored_content() {
    let store = Arc::new(SqliteUnitStore::in_memory().await.expect("store"));
    let generator = Arc::new(MockGenerator::default());
    let orch = orchestrator(generator.clone(), store.clone());

    orch.generate_batch("lecture-1", units("lecture-1", 2))
        .await
        .expect("batch");
    let before = store
        .fetch(&lessonforge::UnitKey::new("lecture-1", 2))
        .await
        .expect("fetch")
        .expect("stored");

    let unit = units("lecture-1", 2).remove(1);
    let regenerated = orch.regenerate_unit(unit).await.expect("regenerated");

    assert_eq!(generator.calls(), 3);
    assert_eq!(regenerated.id, before.id);
    assert!(regenerated.updated_at >= before.updated_at);
    assert_eq!(store.fetch_all("lecture-1").await.expect("fetch").len(), 2);
}

#[tokio::test]
async fn test_in_memory_store_with_concurrent_dispatch() {
    let store = Arc::new(lessonforge::InMemoryUnitStore::new());
    let generator = Arc::new(MockGenerator::failing(&[4]));
    let orch = BatchOrchestrator::new(
        generator.clone(),
        store.clone(),
        ContentValidator::default(),
        fast_config().with_max_in_flight(3),
    );

    let result = orch
        .generate_batch("lecture-5", units("lecture-5", 6))
        .await
        .expect("batch");

    assert_eq!(result.status, BatchStatus::Partial);
    assert_eq!(store.len().await, 5);
    assert_eq!(generator.calls(), 8);
    assert_eq!(
        result.failed[0].user_message(),
        "segment 4 could not be generated, retry later"
    );
    assert_eq!(
        result.summary(),
        "5 of 6 generated; failed units can be retried individually"
    );
}
