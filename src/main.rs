//! repo-sentinel binary entrypoint.
//! Boots the Axum HTTP server and spawns the two pipeline loops: the feed
//! poller and the summarization worker.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repo_sentinel::config::Config;
use repo_sentinel::enrich::ContextEnricher;
use repo_sentinel::gate::RequestGate;
use repo_sentinel::ingest::feed::FeedClient;
use repo_sentinel::ingest::{Poller, PollerConfig};
use repo_sentinel::notify::Notifier;
use repo_sentinel::pipeline::Pipeline;
use repo_sentinel::score::{DynScoreClient, MlScorer};
use repo_sentinel::store::RecordStore;
use repo_sentinel::summarize::{build_completion_client, SummaryWorker, WorkerConfig};
use repo_sentinel::{api, metrics, queue};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("repo_sentinel=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::from_env();
    let metrics_router = metrics::install();

    let store = Arc::new(RecordStore::with_retention(cfg.event_retention));
    let notifier = Arc::new(Notifier::new());
    let gate = Arc::new(RequestGate::new(cfg.summary_budget_per_axis));
    let work_queue = queue::connect(&cfg).await;

    let enricher = Arc::new(ContextEnricher::new(
        cfg.graphql_url.clone(),
        cfg.github_token.clone(),
        cfg.context_ttl,
        cfg.point_floor,
    ));
    let scorer: DynScoreClient = Arc::new(MlScorer::new(cfg.scorer_url.clone()));

    // --- Poller loop ---
    let feed = FeedClient::new(cfg.feed_url.clone(), cfg.github_token.clone());
    let poller = Poller::new(
        feed,
        enricher,
        scorer,
        store.clone(),
        notifier.clone(),
        PollerConfig {
            interval: cfg.poll_interval,
            backoff_floor: cfg.backoff_floor,
            backoff_ceiling: cfg.backoff_ceiling,
            seen_ceiling: cfg.seen_ceiling,
            seen_trim_to: cfg.seen_trim_to,
            sweep_every_cycles: cfg.sweep_every_cycles,
        },
    );
    tokio::spawn(poller.run());

    // --- Summarization worker (disabled without a credential) ---
    let llm = build_completion_client(&cfg);
    let summaries_enabled = llm.is_some();
    if let Some(llm) = llm {
        let worker = Arc::new(SummaryWorker::new(
            work_queue.clone(),
            store.clone(),
            gate.clone(),
            notifier.clone(),
            llm,
            WorkerConfig {
                payload_char_ceiling: cfg.payload_char_ceiling,
                rate_limit_cooldown: cfg.rate_limit_cooldown,
                inter_job_pause: cfg.inter_job_pause,
            },
        ));
        tokio::spawn(worker.run());
    } else {
        tracing::warn!("OPENAI_API_KEY not set; summarization disabled, ingestion continues");
    }

    let pipeline = Arc::new(Pipeline::new(
        store,
        work_queue,
        gate,
        notifier,
        summaries_enabled,
    ));
    let router = api::create_router(pipeline).merge(metrics_router);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, router).await.context("server")?;
    Ok(())
}
