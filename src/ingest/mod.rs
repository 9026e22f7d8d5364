// src/ingest/mod.rs
//! The deduplicating poller: one conditional feed fetch per cycle, seen-id
//! suppression, then per-item enrichment + two-axis scoring fanned out
//! concurrently. Rate limits and transient errors back off and retry
//! forever; nothing on this path terminates the process.

pub mod backoff;
pub mod feed;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::enrich::ContextEnricher;
use crate::notify::Notifier;
use crate::score::DynScoreClient;
use crate::store::RecordStore;
use crate::types::{BroadcastKind, Category, EventRecord, FeedItem};

use backoff::Backoff;
use feed::{FeedClient, FeedFetch};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Poll cycles attempted.");
        describe_counter!("ingest_events_total", "Events received from the feed.");
        describe_counter!("ingest_kept_total", "Events kept after seen-set dedup.");
        describe_counter!("ingest_rate_limited_total", "Polls answered with a rate limit.");
        describe_counter!("ingest_errors_total", "Poll cycles that failed outright.");
        describe_counter!("scorer_errors_total", "Scorer calls that failed.");
        describe_gauge!("ingest_pipeline_last_run_ts", "Unix ts of the last poll cycle.");
        describe_gauge!("ingest_backoff_secs", "Current backoff counter in seconds.");
    });
}

// ------------------------------------------------------------
// Seen-set
// ------------------------------------------------------------

/// Bounded set of recently observed feed ids. Intra-process duplicate
/// suppression only; the record store deduplicates by primary key after a
/// restart loses this.
#[derive(Debug)]
pub struct SeenSet {
    set: HashSet<String>,
    order: VecDeque<String>,
    ceiling: usize,
    trim_to: usize,
}

impl SeenSet {
    pub fn new(ceiling: usize, trim_to: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            ceiling: ceiling.max(1),
            trim_to: trim_to.max(1).min(ceiling.max(1)),
        }
    }

    /// Returns true when the id was not seen before. Trims to the most
    /// recent `trim_to` ids once the ceiling is exceeded.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.set.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > self.ceiling {
            while self.order.len() > self.trim_to {
                if let Some(old) = self.order.pop_front() {
                    self.set.remove(&old);
                }
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ------------------------------------------------------------
// Poller
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: std::time::Duration,
    pub backoff_floor: std::time::Duration,
    pub backoff_ceiling: std::time::Duration,
    pub seen_ceiling: usize,
    pub seen_trim_to: usize,
    pub sweep_every_cycles: u64,
}

pub struct Poller {
    feed: FeedClient,
    enricher: Arc<ContextEnricher>,
    scorer: DynScoreClient,
    store: Arc<RecordStore>,
    notifier: Arc<Notifier>,
    cfg: PollerConfig,
}

impl Poller {
    pub fn new(
        feed: FeedClient,
        enricher: Arc<ContextEnricher>,
        scorer: DynScoreClient,
        store: Arc<RecordStore>,
        notifier: Arc<Notifier>,
        cfg: PollerConfig,
    ) -> Self {
        Self {
            feed,
            enricher,
            scorer,
            store,
            notifier,
            cfg,
        }
    }

    /// Poll forever: polling → {idle-wait, backoff-wait} → polling.
    pub async fn run(self) {
        ensure_metrics_described();
        let mut seen = SeenSet::new(self.cfg.seen_ceiling, self.cfg.seen_trim_to);
        let mut backoff = Backoff::new(self.cfg.backoff_floor, self.cfg.backoff_ceiling);
        let mut cycles: u64 = 0;
        tracing::info!(target: "ingest", interval = ?self.cfg.interval, "poller started");

        loop {
            counter!("ingest_runs_total").increment(1);
            let wait = match self.feed.fetch_latest().await {
                Ok(FeedFetch::NotModified) => {
                    backoff.reset();
                    self.cfg.interval
                }
                Ok(FeedFetch::Items(items)) => {
                    backoff.reset();
                    counter!("ingest_events_total").increment(items.len() as u64);
                    let fresh: Vec<FeedItem> = items
                        .into_iter()
                        .filter(|item| seen.insert(&item.id))
                        .collect();
                    counter!("ingest_kept_total").increment(fresh.len() as u64);
                    if !fresh.is_empty() {
                        tracing::info!(target: "ingest", kept = fresh.len(), "poll cycle");
                        self.process_batch(fresh).await;
                    }
                    self.cfg.interval
                }
                Ok(FeedFetch::RateLimited { hint }) => {
                    counter!("ingest_rate_limited_total").increment(1);
                    let wait = match hint {
                        Some(h) => backoff.hinted_wait(h),
                        None => backoff.next_wait(),
                    };
                    tracing::warn!(target: "ingest", wait = ?wait, "feed rate limited");
                    wait
                }
                Err(e) => {
                    counter!("ingest_errors_total").increment(1);
                    let wait = backoff.next_wait();
                    tracing::warn!(target: "ingest", error = ?e, wait = ?wait, "poll failed");
                    wait
                }
            };

            gauge!("ingest_pipeline_last_run_ts")
                .set(chrono::Utc::now().timestamp().max(0) as f64);
            gauge!("ingest_backoff_secs").set(backoff.current().as_secs_f64());

            cycles += 1;
            if self.cfg.sweep_every_cycles > 0 && cycles % self.cfg.sweep_every_cycles == 0 {
                self.enricher.sweep();
            }

            tokio::time::sleep(wait).await;
        }
    }

    /// Enrich and score distinct items concurrently; no ordering between them.
    async fn process_batch(&self, items: Vec<FeedItem>) {
        let mut tasks = tokio::task::JoinSet::new();
        for item in items {
            let enricher = self.enricher.clone();
            let scorer = self.scorer.clone();
            let store = self.store.clone();
            let notifier = self.notifier.clone();
            tasks.spawn(async move {
                process_item(enricher, scorer, store, notifier, item).await;
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(target: "ingest", error = ?e, "item task panicked");
            }
        }
    }
}

/// One item through enrichment, both scorer axes, categorization, the record
/// store, and the live feed. A failed scorer degrades to an unflagged axis,
/// missing enrichment degrades to no context; neither stops the item.
pub async fn process_item(
    enricher: Arc<ContextEnricher>,
    scorer: DynScoreClient,
    store: Arc<RecordStore>,
    notifier: Arc<Notifier>,
    item: FeedItem,
) {
    let context = enricher.fetch(&item.repo).await;

    let (sec, cq) = tokio::join!(
        scorer.score_security(&item, context.as_ref()),
        scorer.score_code_quality(&item)
    );
    let security = match sec {
        Ok(s) => Some(s),
        Err(e) => {
            counter!("scorer_errors_total").increment(1);
            tracing::warn!(target: "ingest", event_id = %item.id, error = ?e, "security scorer failed");
            None
        }
    };
    let code_quality = match cq {
        Ok(s) => Some(s),
        Err(e) => {
            counter!("scorer_errors_total").increment(1);
            tracing::warn!(target: "ingest", event_id = %item.id, error = ?e, "code-quality scorer failed");
            None
        }
    };

    let category = Category::from_verdicts(
        security.as_ref().map(|s| s.flagged).unwrap_or(false),
        code_quality.as_ref().map(|s| s.flagged).unwrap_or(false),
    );
    counter!("events_categorized_total", "category" => category.as_str()).increment(1);

    let record = EventRecord {
        item,
        category,
        security,
        code_quality,
        context,
    };
    let payload = serde_json::to_value(&record).unwrap_or_default();
    if store.store_event(record) {
        notifier.broadcast(BroadcastKind::NewEvent, &payload);
    }
}
