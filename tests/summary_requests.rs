// tests/summary_requests.rs
// Request-path sequencing: duplicate suppression via the pending set, the
// per-axis budget ceiling, and the global reset.

use std::sync::Arc;
use std::time::Duration;

use repo_sentinel::gate::RequestGate;
use repo_sentinel::notify::Notifier;
use repo_sentinel::pipeline::{Pipeline, SummaryRequestOutcome};
use repo_sentinel::queue::{InProcessQueue, WorkQueue};
use repo_sentinel::store::RecordStore;
use repo_sentinel::types::{
    BroadcastKind, Category, EventRecord, FeedItem, ScoreResult, Summary,
};

fn record(id: &str, category: Category) -> EventRecord {
    EventRecord {
        item: FeedItem {
            id: id.to_string(),
            event_type: "PushEvent".into(),
            repo: "octo/demo".into(),
            actor: "mona".into(),
            created_at: None,
            payload: serde_json::json!({ "ref": "refs/heads/main" }),
        },
        category,
        security: Some(ScoreResult {
            score: 0.8,
            flagged: matches!(category, Category::Security | Category::Both),
            signals: Default::default(),
        }),
        code_quality: None,
        context: None,
    }
}

fn pipeline(budget: u32) -> (Arc<Pipeline>, Arc<dyn WorkQueue>) {
    let store = Arc::new(RecordStore::with_retention(100));
    let queue: Arc<dyn WorkQueue> = Arc::new(InProcessQueue::new(Duration::from_millis(10)));
    let gate = Arc::new(RequestGate::new(budget));
    let notifier = Arc::new(Notifier::new());
    (
        Arc::new(Pipeline::new(store, queue.clone(), gate, notifier, true)),
        queue,
    )
}

#[tokio::test]
async fn second_request_is_generating_and_queue_does_not_grow() {
    let (p, queue) = pipeline(10);
    p.store.store_event(record("e1", Category::Security));

    assert!(matches!(
        p.request_summary("e1").await,
        SummaryRequestOutcome::Generating
    ));
    assert_eq!(queue.len().await, 1);

    assert!(matches!(
        p.request_summary("e1").await,
        SummaryRequestOutcome::Generating
    ));
    assert_eq!(queue.len().await, 1);
}

#[tokio::test]
async fn eleventh_request_in_one_category_is_budget_exhausted() {
    let (p, queue) = pipeline(10);
    for i in 0..11 {
        p.store
            .store_event(record(&format!("e{i}"), Category::Security));
    }
    for i in 0..10 {
        assert!(matches!(
            p.request_summary(&format!("e{i}")).await,
            SummaryRequestOutcome::Generating
        ));
    }
    assert!(matches!(
        p.request_summary("e10").await,
        SummaryRequestOutcome::BudgetExhausted
    ));
    // No 11th job, no pending residue for the refused event.
    assert_eq!(queue.len().await, 10);
    assert!(!p.gate.is_pending("e10"));
}

#[tokio::test]
async fn both_category_charges_the_security_budget() {
    let (p, _queue) = pipeline(1);
    p.store.store_event(record("e1", Category::Both));
    p.store.store_event(record("e2", Category::Security));

    assert!(matches!(
        p.request_summary("e1").await,
        SummaryRequestOutcome::Generating
    ));
    assert!(matches!(
        p.request_summary("e2").await,
        SummaryRequestOutcome::BudgetExhausted
    ));
}

#[tokio::test]
async fn unknown_event_is_reported_not_enqueued() {
    let (p, queue) = pipeline(10);
    assert!(matches!(
        p.request_summary("nope").await,
        SummaryRequestOutcome::UnknownEvent
    ));
    assert_eq!(queue.len().await, 0);
}

#[tokio::test]
async fn stored_summary_short_circuits_and_repairs_pending() {
    let (p, queue) = pipeline(10);
    p.store.store_event(record("e1", Category::Security));
    assert!(matches!(
        p.request_summary("e1").await,
        SummaryRequestOutcome::Generating
    ));

    // Simulate the worker completing while the pending mark is set.
    p.store.store_summary(Summary {
        event_id: "e1".into(),
        category: Category::Security,
        classification: repo_sentinel::types::Classification::Benign,
        confidence: 0.9,
        headline: "routine push".into(),
        root_cause: vec![],
        impact: vec![],
        next_steps: vec![],
        raw: serde_json::json!({}),
        created_at: chrono::Utc::now(),
    });

    match p.request_summary("e1").await {
        SummaryRequestOutcome::Stored(summary) => assert_eq!(summary.headline, "routine push"),
        other => panic!("expected stored summary, got {other:?}"),
    }
    assert!(!p.gate.is_pending("e1"));
    assert_eq!(queue.len().await, 1); // the original job is still queued; the worker will skip it
}

#[tokio::test]
async fn disabled_pipeline_refuses_summary_requests() {
    let store = Arc::new(RecordStore::with_retention(10));
    store.store_event(record("e1", Category::Security));
    let queue: Arc<dyn WorkQueue> = Arc::new(InProcessQueue::new(Duration::from_millis(10)));
    let p = Pipeline::new(
        store,
        queue.clone(),
        Arc::new(RequestGate::new(10)),
        Arc::new(Notifier::new()),
        false,
    );
    assert!(matches!(
        p.request_summary("e1").await,
        SummaryRequestOutcome::Disabled
    ));
    assert_eq!(queue.len().await, 0);
}

#[tokio::test]
async fn reset_clears_store_queue_budget_pending_and_broadcasts() {
    let (p, queue) = pipeline(10);
    for i in 0..3 {
        p.store
            .store_event(record(&format!("e{i}"), Category::Security));
        let _ = p.request_summary(&format!("e{i}")).await;
    }
    let mut rx = p.notifier.subscribe();

    let drained = p.reset().await;

    assert_eq!(drained, 3);
    assert_eq!(p.store.counts(), (0, 0));
    assert_eq!(queue.len().await, 0);
    assert_eq!(p.gate.pending_len(), 0);
    assert_eq!(p.gate.counter(repo_sentinel::types::Axis::Security), 0);
    let msg = rx.recv().await.expect("reset broadcast");
    assert_eq!(msg.kind, BroadcastKind::Reset);
}
