// src/summarize/worker.rs
//! Single-consumer drain loop over the work queue.
//!
//! Per job: skip if another copy of the same event is mid-flight or already
//! summarized, render the role prompt, call the completion API, parse and
//! normalize, persist first-writer-wins, then clear the pending mark and
//! broadcast. A rate-limited completion requeues the identical job at the
//! tail and pauses the loop for a cool-down; every other failure is terminal
//! for the job and surfaced as an error event.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics::counter;

use crate::gate::RequestGate;
use crate::notify::Notifier;
use crate::queue::WorkQueue;
use crate::store::RecordStore;
use crate::types::{BroadcastKind, SummarizationJob, Summary};

use super::llm::{CompletionError, DynCompletionClient};
use super::{parse, prompt};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub payload_char_ceiling: usize,
    pub rate_limit_cooldown: Duration,
    pub inter_job_pause: Duration,
}

/// What happened to one popped job. Public so integration tests can drive
/// `process` directly without the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    /// Duplicate in-flight id or summary already stored.
    Skipped,
    /// Rate-limited; the same job went back to the queue tail.
    Requeued,
    /// Terminal failure; job dropped, error broadcast.
    Failed,
}

pub struct SummaryWorker {
    queue: Arc<dyn WorkQueue>,
    store: Arc<RecordStore>,
    gate: Arc<RequestGate>,
    notifier: Arc<Notifier>,
    llm: DynCompletionClient,
    cfg: WorkerConfig,
    /// Event ids currently mid-processing in this process. Guards the race
    /// between a requeued retry and a fresh duplicate enqueue.
    processing: Mutex<HashSet<String>>,
}

impl SummaryWorker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        store: Arc<RecordStore>,
        gate: Arc<RequestGate>,
        notifier: Arc<Notifier>,
        llm: DynCompletionClient,
        cfg: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            gate,
            notifier,
            llm,
            cfg,
            processing: Mutex::new(HashSet::new()),
        }
    }

    /// Drain the queue for the process lifetime.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            target: "worker",
            provider = self.llm.provider_name(),
            "summarization worker started"
        );
        loop {
            let Some(job) = self.queue.pop().await else {
                continue;
            };
            let outcome = self.process(job).await;
            if outcome == ProcessOutcome::Requeued {
                // Long enough for the upstream rate window to clear.
                tokio::time::sleep(self.cfg.rate_limit_cooldown).await;
            }
            // Smooth external API load between any two jobs.
            tokio::time::sleep(self.cfg.inter_job_pause).await;
        }
    }

    pub async fn process(&self, job: SummarizationJob) -> ProcessOutcome {
        let event_id = job.event_id.clone();

        {
            let mut processing = self.processing.lock().expect("processing mutex poisoned");
            if !processing.insert(event_id.clone()) {
                tracing::debug!(target: "worker", %event_id, "already mid-processing; dropping");
                return ProcessOutcome::Skipped;
            }
        }

        let outcome = self.process_inner(&job).await;

        // Always cleared, success or failure.
        self.processing
            .lock()
            .expect("processing mutex poisoned")
            .remove(&event_id);

        outcome
    }

    async fn process_inner(&self, job: &SummarizationJob) -> ProcessOutcome {
        let event_id = job.event_id.as_str();

        if self.store.get_summary(event_id).is_some() {
            // A crash/restart can requeue work that already finished.
            self.gate.clear_pending(event_id);
            tracing::debug!(target: "worker", event_id, "summary already stored; dropping job");
            return ProcessOutcome::Skipped;
        }

        let prompt = prompt::render(job, self.cfg.payload_char_ceiling);
        let response = match self.llm.complete(&prompt).await {
            Ok(text) => text,
            Err(CompletionError::RateLimited) => {
                counter!("summary_requeues_total").increment(1);
                tracing::warn!(target: "worker", event_id, "completion rate limited; requeueing");
                if let Err(e) = self.queue.push(job.clone()).await {
                    // Requeue failed: treat as terminal so the event does not
                    // stay pending forever.
                    tracing::error!(target: "worker", event_id, error = ?e, "requeue failed");
                    return self.fail(event_id, job, "rate limited and requeue failed");
                }
                return ProcessOutcome::Requeued;
            }
            Err(CompletionError::Failed(reason)) => {
                return self.fail(event_id, job, &reason);
            }
        };

        let (output, raw) = match parse::parse_model_output(&response) {
            Ok(parsed) => parsed,
            Err(e) => {
                return self.fail(event_id, job, &format!("unparseable model output: {e}"));
            }
        };

        let summary = Summary {
            event_id: event_id.to_string(),
            category: job.category,
            classification: parse::normalize_classification(&output.classification),
            confidence: output.confidence.clamp(0.0, 1.0),
            headline: output.summary,
            root_cause: output.root_cause,
            impact: output.impact,
            next_steps: output.next_steps,
            raw,
            created_at: Utc::now(),
        };

        let payload = serde_json::to_value(&summary).unwrap_or_default();
        if self.store.store_summary(summary) {
            counter!("summaries_completed_total").increment(1);
            self.notifier.broadcast(BroadcastKind::NewSummary, &payload);
            tracing::info!(target: "worker", event_id, "summary stored");
        } else {
            // First writer won elsewhere; this attempt silently no-ops.
            tracing::debug!(target: "worker", event_id, "duplicate summary discarded");
        }
        self.gate.clear_pending(event_id);
        ProcessOutcome::Completed
    }

    fn fail(&self, event_id: &str, job: &SummarizationJob, reason: &str) -> ProcessOutcome {
        counter!("summary_failures_total").increment(1);
        tracing::error!(target: "worker", event_id, reason, "summarization failed");
        self.gate.clear_pending(event_id);
        self.notifier.broadcast(
            BroadcastKind::SummaryError,
            &serde_json::json!({
                "event_id": event_id,
                "category": job.category.as_str(),
                "error": reason,
            }),
        );
        ProcessOutcome::Failed
    }
}
