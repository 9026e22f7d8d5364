// src/score.rs
//! Client for the external ML scoring service. Two axes, one endpoint each:
//! `/score` (security anomaly) and `/score/code-quality` (practice quality).
//! The service replies with a score in [0,1], a verdict, and the named
//! feature map that produced it.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::types::{FeedItem, RepoContext, ScoreResult};

#[async_trait]
pub trait ScoreClient: Send + Sync {
    async fn score_security(
        &self,
        item: &FeedItem,
        context: Option<&RepoContext>,
    ) -> Result<ScoreResult>;
    async fn score_code_quality(&self, item: &FeedItem) -> Result<ScoreResult>;
}

pub type DynScoreClient = std::sync::Arc<dyn ScoreClient>;

pub struct MlScorer {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SecurityReply {
    score: f64,
    is_anomalous: bool,
    #[serde(default)]
    features: std::collections::HashMap<String, f64>,
}

#[derive(Deserialize)]
struct CodeQualityReply {
    score: f64,
    is_good_practice: bool,
    #[serde(default)]
    features: std::collections::HashMap<String, f64>,
}

impl MlScorer {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("repo-sentinel/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self { http, base_url }
    }

    fn event_doc(item: &FeedItem) -> serde_json::Value {
        serde_json::json!({
            "id": item.id,
            "type": item.event_type,
            "repo": { "name": item.repo },
            "actor": { "login": item.actor },
            "created_at": item.created_at,
            "payload": item.payload,
        })
    }
}

#[async_trait]
impl ScoreClient for MlScorer {
    async fn score_security(
        &self,
        item: &FeedItem,
        context: Option<&RepoContext>,
    ) -> Result<ScoreResult> {
        let body = serde_json::json!({
            "event": Self::event_doc(item),
            "repo_context": context.map(|c| c.to_scorer_doc()),
        });
        let resp = self
            .http
            .post(format!("{}/score", self.base_url))
            .json(&body)
            .send()
            .await
            .context("security scorer request")?;
        if !resp.status().is_success() {
            return Err(anyhow!("security scorer status {}", resp.status()));
        }
        let reply: SecurityReply = resp.json().await.context("security scorer body")?;
        Ok(ScoreResult {
            score: reply.score,
            flagged: reply.is_anomalous,
            signals: reply.features,
        })
    }

    async fn score_code_quality(&self, item: &FeedItem) -> Result<ScoreResult> {
        let body = serde_json::json!({ "event": Self::event_doc(item) });
        let resp = self
            .http
            .post(format!("{}/score/code-quality", self.base_url))
            .json(&body)
            .send()
            .await
            .context("code-quality scorer request")?;
        if !resp.status().is_success() {
            return Err(anyhow!("code-quality scorer status {}", resp.status()));
        }
        let reply: CodeQualityReply = resp.json().await.context("code-quality scorer body")?;
        // The quality model flags when practice is NOT good.
        Ok(ScoreResult {
            score: reply.score,
            flagged: !reply.is_good_practice,
            signals: reply.features,
        })
    }
}
