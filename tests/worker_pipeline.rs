// tests/worker_pipeline.rs
// End-to-end worker behavior against a scripted completion provider:
// success, malformed output, rate-limit requeue, and duplicate suppression.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use repo_sentinel::gate::RequestGate;
use repo_sentinel::notify::Notifier;
use repo_sentinel::pipeline::{Pipeline, SummaryRequestOutcome};
use repo_sentinel::queue::{InProcessQueue, WorkQueue};
use repo_sentinel::store::RecordStore;
use repo_sentinel::summarize::llm::{
    CompletionClient, CompletionError, DynCompletionClient, MockCompletion, Prompt,
};
use repo_sentinel::summarize::worker::{ProcessOutcome, SummaryWorker, WorkerConfig};
use repo_sentinel::types::{Axis, BroadcastKind, Category, EventRecord, FeedItem, ScoreResult};

const GOOD_REPLY: &str = r#"{"classification": "policy_violation", "confidence": 0.8,
    "summary": "force push rewrote main", "root_cause": ["force push to default branch"],
    "impact": ["history rewritten"], "next_steps": ["enable branch protection"]}"#;

/// Counts completion calls on top of an inner provider.
struct CountingCompletion {
    inner: MockCompletion,
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionClient for CountingCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.complete(prompt).await
    }
    fn provider_name(&self) -> &'static str {
        "counting-mock"
    }
}

struct Rig {
    pipeline: Arc<Pipeline>,
    queue: Arc<dyn WorkQueue>,
    worker: Arc<SummaryWorker>,
    llm: Arc<CountingCompletion>,
}

fn rig(replies: Vec<Result<String, CompletionError>>) -> Rig {
    let store = Arc::new(RecordStore::with_retention(100));
    let queue: Arc<dyn WorkQueue> = Arc::new(InProcessQueue::new(Duration::from_millis(10)));
    let gate = Arc::new(RequestGate::new(10));
    let notifier = Arc::new(Notifier::new());
    let llm = Arc::new(CountingCompletion {
        inner: MockCompletion::scripted(replies),
        calls: AtomicUsize::new(0),
    });
    let worker = Arc::new(SummaryWorker::new(
        queue.clone(),
        store.clone(),
        gate.clone(),
        notifier.clone(),
        llm.clone() as DynCompletionClient,
        WorkerConfig {
            payload_char_ceiling: 4000,
            rate_limit_cooldown: Duration::from_millis(1),
            inter_job_pause: Duration::from_millis(1),
        },
    ));
    let pipeline = Arc::new(Pipeline::new(store, queue.clone(), gate, notifier, true));
    Rig {
        pipeline,
        queue,
        worker,
        llm,
    }
}

fn seed(pipeline: &Pipeline, id: &str, category: Category) {
    pipeline.store.store_event(EventRecord {
        item: FeedItem {
            id: id.to_string(),
            event_type: "PushEvent".into(),
            repo: "octo/demo".into(),
            actor: "mona".into(),
            created_at: None,
            payload: serde_json::json!({ "forced": true }),
        },
        category,
        security: Some(ScoreResult {
            score: 0.9,
            flagged: true,
            signals: [("force_push_to_main".to_string(), 1.0)].into(),
        }),
        code_quality: None,
        context: None,
    });
}

#[tokio::test]
async fn successful_job_stores_summary_clears_pending_and_broadcasts() {
    let r = rig(vec![Ok(GOOD_REPLY.to_string())]);
    seed(&r.pipeline, "e1", Category::Security);
    let mut rx = r.pipeline.notifier.subscribe();

    assert!(matches!(
        r.pipeline.request_summary("e1").await,
        SummaryRequestOutcome::Generating
    ));
    let job = r.queue.pop().await.expect("job queued");
    assert_eq!(r.worker.process(job).await, ProcessOutcome::Completed);

    let summary = r.pipeline.store.get_summary("e1").expect("summary stored");
    assert_eq!(summary.headline, "force push rewrote main");
    assert!(!r.pipeline.gate.is_pending("e1"));
    let msg = rx.recv().await.expect("broadcast");
    assert_eq!(msg.kind, BroadcastKind::NewSummary);

    // Poll-for-result consumers now get the stored summary.
    assert!(matches!(
        r.pipeline.request_summary("e1").await,
        SummaryRequestOutcome::Stored(_)
    ));
    assert_eq!(r.llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_output_drops_job_and_a_fresh_request_reenqueues() {
    let r = rig(vec![Ok("the model refused to answer in JSON".to_string())]);
    seed(&r.pipeline, "e1", Category::Security);
    let mut rx = r.pipeline.notifier.subscribe();

    let _ = r.pipeline.request_summary("e1").await;
    let job = r.queue.pop().await.expect("job queued");
    assert_eq!(r.worker.process(job).await, ProcessOutcome::Failed);

    // Error event emitted, pending cleared, no summary exists.
    let msg = rx.recv().await.expect("error broadcast");
    assert_eq!(msg.kind, BroadcastKind::SummaryError);
    assert!(msg.data.contains("e1"));
    assert!(!r.pipeline.gate.is_pending("e1"));
    assert!(r.pipeline.store.get_summary("e1").is_none());

    // The requester may try again; a fresh job is enqueued.
    assert!(matches!(
        r.pipeline.request_summary("e1").await,
        SummaryRequestOutcome::Generating
    ));
    assert_eq!(r.queue.len().await, 1);
}

#[tokio::test]
async fn rate_limited_job_requeues_once_at_tail_without_new_budget_charge() {
    let r = rig(vec![
        Err(CompletionError::RateLimited),
        Ok(GOOD_REPLY.to_string()),
    ]);
    seed(&r.pipeline, "e1", Category::Security);

    let _ = r.pipeline.request_summary("e1").await;
    assert_eq!(r.pipeline.gate.counter(Axis::Security), 1);

    let job = r.queue.pop().await.expect("job queued");
    assert_eq!(r.worker.process(job).await, ProcessOutcome::Requeued);

    // Same job back at the tail exactly once; still pending; budget unchanged.
    assert_eq!(r.queue.len().await, 1);
    assert!(r.pipeline.gate.is_pending("e1"));
    assert_eq!(r.pipeline.gate.counter(Axis::Security), 1);

    let retried = r.queue.pop().await.expect("requeued job");
    assert_eq!(retried.event_id, "e1");
    assert_eq!(r.worker.process(retried).await, ProcessOutcome::Completed);
    assert!(r.pipeline.store.get_summary("e1").is_some());
    assert_eq!(r.pipeline.gate.counter(Axis::Security), 1);
}

#[tokio::test]
async fn job_for_already_summarized_event_is_skipped_without_a_call() {
    let r = rig(vec![Ok(GOOD_REPLY.to_string())]);
    seed(&r.pipeline, "e1", Category::Security);

    let _ = r.pipeline.request_summary("e1").await;
    let job = r.queue.pop().await.expect("job queued");
    assert_eq!(r.worker.process(job.clone()).await, ProcessOutcome::Completed);
    assert_eq!(r.llm.calls.load(Ordering::SeqCst), 1);

    // A stale requeue of the same job (e.g. after a crash) is dropped.
    assert_eq!(r.worker.process(job).await, ProcessOutcome::Skipped);
    assert_eq!(r.llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn two_quick_requests_make_exactly_one_completion_call() {
    let r = rig(vec![Ok(GOOD_REPLY.to_string())]);
    seed(&r.pipeline, "e1", Category::Security);

    assert!(matches!(
        r.pipeline.request_summary("e1").await,
        SummaryRequestOutcome::Generating
    ));
    assert!(matches!(
        r.pipeline.request_summary("e1").await,
        SummaryRequestOutcome::Generating
    ));
    assert_eq!(r.queue.len().await, 1);

    while let Some(job) = r.queue.pop().await {
        let _ = r.worker.process(job).await;
    }
    assert_eq!(r.llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn code_quality_classification_is_normalized_onto_security_vocabulary() {
    let reply = r#"{"classification": "poor_practice", "confidence": 0.7,
        "summary": "no tests in large change", "root_cause": [], "impact": [], "next_steps": []}"#;
    let r = rig(vec![Ok(reply.to_string())]);
    seed(&r.pipeline, "e1", Category::CodeQuality);

    let _ = r.pipeline.request_summary("e1").await;
    let job = r.queue.pop().await.expect("job queued");
    assert_eq!(r.worker.process(job).await, ProcessOutcome::Completed);

    let summary = r.pipeline.store.get_summary("e1").expect("stored");
    assert_eq!(
        summary.classification,
        repo_sentinel::types::Classification::PolicyViolation
    );
}
