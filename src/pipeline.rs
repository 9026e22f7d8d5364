// src/pipeline.rs
//! The pipeline coordinator: owns the store, queue, gate, and notifier, and
//! implements the request-path sequencing for on-demand summaries plus the
//! global reset. Constructed once at startup and handed by Arc to the
//! poller, the worker, and the HTTP layer; tests build isolated instances.

use std::sync::Arc;

use metrics::counter;

use crate::gate::{Admission, RequestGate};
use crate::notify::Notifier;
use crate::queue::WorkQueue;
use crate::store::RecordStore;
use crate::types::{Axis, BroadcastKind, SummarizationJob, Summary};

/// Reply to an enqueue-or-fetch summary request.
#[derive(Debug)]
pub enum SummaryRequestOutcome {
    Stored(Box<Summary>),
    /// Enqueued now or already in flight; poll again later.
    Generating,
    BudgetExhausted,
    /// No completion credential was configured at startup.
    Disabled,
    UnknownEvent,
    /// Enqueue failed; the charge was rolled back.
    Error(String),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStats {
    pub events: usize,
    pub summaries: usize,
    pub queue_len: usize,
    pub pending: usize,
    pub budget_security: u32,
    pub budget_code_quality: u32,
    pub subscribers: usize,
    pub queue_durable: bool,
}

pub struct Pipeline {
    pub store: Arc<RecordStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub gate: Arc<RequestGate>,
    pub notifier: Arc<Notifier>,
    summaries_enabled: bool,
}

impl Pipeline {
    pub fn new(
        store: Arc<RecordStore>,
        queue: Arc<dyn WorkQueue>,
        gate: Arc<RequestGate>,
        notifier: Arc<Notifier>,
        summaries_enabled: bool,
    ) -> Self {
        Self {
            store,
            queue,
            gate,
            notifier,
            summaries_enabled,
        }
    }

    pub fn summaries_enabled(&self) -> bool {
        self.summaries_enabled
    }

    /// Enqueue-or-fetch. The pending/budget decision is atomic per event id
    /// inside the gate; the worker's own store check covers the residual
    /// race where a summary lands between our lookup and the admit.
    pub async fn request_summary(&self, event_id: &str) -> SummaryRequestOutcome {
        if !self.summaries_enabled {
            return SummaryRequestOutcome::Disabled;
        }
        let Some(record) = self.store.get_event(event_id) else {
            return SummaryRequestOutcome::UnknownEvent;
        };
        let axis = record.category.axis();

        if let Some(summary) = self.store.get_summary(event_id) {
            // Also repairs any stale pending mark.
            let _ = self.gate.admit(event_id, axis, true);
            return SummaryRequestOutcome::Stored(Box::new(summary));
        }

        match self.gate.admit(event_id, axis, false) {
            Admission::AlreadyStored => {
                // Unreachable with has_summary = false; treat as generating.
                SummaryRequestOutcome::Generating
            }
            Admission::Generating => SummaryRequestOutcome::Generating,
            Admission::BudgetExhausted => {
                counter!("summary_requests_rejected_total", "reason" => "budget").increment(1);
                SummaryRequestOutcome::BudgetExhausted
            }
            Admission::Enqueue => {
                let job = SummarizationJob {
                    event_id: event_id.to_string(),
                    item: record.item.clone(),
                    score: record.axis_score().cloned(),
                    context: record.context.clone(),
                    category: record.category,
                };
                match self.queue.push(job).await {
                    Ok(()) => {
                        counter!("summary_requests_enqueued_total").increment(1);
                        SummaryRequestOutcome::Generating
                    }
                    Err(e) => {
                        self.gate.rollback(event_id, axis);
                        tracing::error!(target: "pipeline", event_id, error = ?e, "enqueue failed");
                        SummaryRequestOutcome::Error(e.to_string())
                    }
                }
            }
        }
    }

    /// Clear the record store, drain the queue, zero the budget counters,
    /// empty the pending set, then tell every live viewer.
    pub async fn reset(&self) -> usize {
        self.store.clear();
        let drained = self.queue.clear().await;
        self.gate.reset();
        self.notifier.broadcast(
            BroadcastKind::Reset,
            &serde_json::json!({ "queue_drained": drained }),
        );
        tracing::info!(target: "pipeline", drained, "global reset");
        drained
    }

    pub async fn stats(&self) -> PipelineStats {
        let (events, summaries) = self.store.counts();
        PipelineStats {
            events,
            summaries,
            queue_len: self.queue.len().await,
            pending: self.gate.pending_len(),
            budget_security: self.gate.counter(Axis::Security),
            budget_code_quality: self.gate.counter(Axis::CodeQuality),
            subscribers: self.notifier.subscriber_count(),
            queue_durable: self.queue.durable(),
        }
    }
}
