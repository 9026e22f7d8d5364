// src/queue.rs
//! FIFO work queue for summarization jobs with two interchangeable backends:
//! a shared Redis-compatible REST backend (durable across restarts, shareable
//! between pipeline processes) and an in-process fallback.
//!
//! Backend selection happens once at startup. If the REST backend is not
//! configured, or its probe fails for the whole retry budget, the process
//! falls back to the in-process queue for its remaining lifetime; there is no
//! flapping back. Jobs in the in-process queue do not survive a crash, which
//! is why the fallback is logged and exported as `work_queue_durable = 0`.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::gauge;
use tokio::sync::Notify;

use crate::config::Config;
use crate::types::SummarizationJob;

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a job at the tail. Requeues use the same entry point.
    async fn push(&self, job: SummarizationJob) -> Result<()>;
    /// Pop the head, waiting up to a bounded interval when empty.
    async fn pop(&self) -> Option<SummarizationJob>;
    async fn len(&self) -> usize;
    /// Drop everything queued; returns how many jobs were removed.
    async fn clear(&self) -> usize;
    fn durable(&self) -> bool;
}

/// Probe the configured REST backend and fall back in-process on failure.
pub async fn connect(cfg: &Config) -> std::sync::Arc<dyn WorkQueue> {
    if let (Some(url), Some(token)) = (&cfg.queue_rest_url, &cfg.queue_rest_token) {
        let rest = RestQueue::new(url.clone(), token.clone(), cfg.queue_key.clone(), cfg.pop_wait);
        for attempt in 1..=cfg.queue_probe_attempts {
            match rest.ping().await {
                Ok(()) => {
                    tracing::info!(target: "queue", durable = true, "using REST work queue");
                    gauge!("work_queue_durable").set(1.0);
                    return std::sync::Arc::new(rest);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "queue",
                        error = ?e,
                        attempt,
                        "work queue probe failed"
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        tracing::warn!(
            target: "queue",
            durable = false,
            "probe budget exhausted; falling back to in-process queue for process lifetime"
        );
    } else {
        tracing::info!(target: "queue", durable = false, "no REST queue configured; using in-process queue");
    }
    gauge!("work_queue_durable").set(0.0);
    std::sync::Arc::new(InProcessQueue::new(cfg.pop_wait))
}

// ------------------------------------------------------------
// In-process backend
// ------------------------------------------------------------

pub struct InProcessQueue {
    inner: Mutex<VecDeque<SummarizationJob>>,
    notify: Notify,
    pop_wait: Duration,
}

impl InProcessQueue {
    pub fn new(pop_wait: Duration) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            pop_wait,
        }
    }

    fn try_pop(&self) -> Option<SummarizationJob> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }
}

#[async_trait]
impl WorkQueue for InProcessQueue {
    async fn push(&self, job: SummarizationJob) -> Result<()> {
        {
            let mut g = self.inner.lock().expect("queue mutex poisoned");
            g.push_back(job);
        }
        tracing::debug!(target: "queue", durable = false, "job enqueued");
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Option<SummarizationJob> {
        if let Some(job) = self.try_pop() {
            return Some(job);
        }
        // Park for at most pop_wait so the caller's loop stays responsive.
        let _ = tokio::time::timeout(self.pop_wait, self.notify.notified()).await;
        self.try_pop()
    }

    async fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }

    async fn clear(&self) -> usize {
        let mut g = self.inner.lock().expect("queue mutex poisoned");
        let n = g.len();
        g.clear();
        n
    }

    fn durable(&self) -> bool {
        false
    }
}

// ------------------------------------------------------------
// Redis-compatible REST backend (Upstash-style command endpoint)
// ------------------------------------------------------------

pub struct RestQueue {
    http: reqwest::Client,
    base_url: String,
    token: String,
    key: String,
    pop_wait: Duration,
}

#[derive(serde::Deserialize)]
struct CommandReply {
    result: serde_json::Value,
}

impl RestQueue {
    pub fn new(base_url: String, token: String, key: String, pop_wait: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("repo-sentinel/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            key,
            pop_wait,
        }
    }

    async fn command(&self, cmd: &[&str]) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&cmd)
            .send()
            .await
            .context("queue REST request failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("queue REST status {}", resp.status()));
        }
        let reply: CommandReply = resp.json().await.context("queue REST body")?;
        Ok(reply.result)
    }

    pub async fn ping(&self) -> Result<()> {
        let result = self.command(&["PING"]).await?;
        match result.as_str() {
            Some("PONG") => Ok(()),
            _ => Err(anyhow!("unexpected PING reply: {result}")),
        }
    }
}

#[async_trait]
impl WorkQueue for RestQueue {
    async fn push(&self, job: SummarizationJob) -> Result<()> {
        let payload = serde_json::to_string(&job).context("serialize job")?;
        self.command(&["LPUSH", &self.key, &payload]).await?;
        Ok(())
    }

    async fn pop(&self) -> Option<SummarizationJob> {
        // LPUSH at the head + RPOP at the tail keeps FIFO order.
        let result = match self.command(&["RPOP", &self.key]).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "queue", error = ?e, "pop failed");
                tokio::time::sleep(self.pop_wait).await;
                return None;
            }
        };
        match result.as_str() {
            Some(raw) => match serde_json::from_str::<SummarizationJob>(raw) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::warn!(target: "queue", error = ?e, "dropping undecodable job");
                    None
                }
            },
            None => {
                tokio::time::sleep(self.pop_wait).await;
                let retry = self.command(&["RPOP", &self.key]).await.ok()?;
                retry.as_str().and_then(|raw| serde_json::from_str(raw).ok())
            }
        }
    }

    async fn len(&self) -> usize {
        match self.command(&["LLEN", &self.key]).await {
            Ok(v) => v.as_u64().unwrap_or(0) as usize,
            Err(e) => {
                tracing::warn!(target: "queue", error = ?e, "len failed");
                0
            }
        }
    }

    async fn clear(&self) -> usize {
        let n = self.len().await;
        if let Err(e) = self.command(&["DEL", &self.key]).await {
            tracing::warn!(target: "queue", error = ?e, "clear failed");
            return 0;
        }
        n
    }

    fn durable(&self) -> bool {
        true
    }
}
