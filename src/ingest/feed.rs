// src/ingest/feed.rs
//! Conditional fetch against the public events feed. Carries the previous
//! response's ETag so an unchanged feed short-circuits as 304, and surfaces
//! rate-limit responses with the server's retry hint instead of treating
//! them as errors.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::FeedItem;

/// One poll attempt's outcome.
#[derive(Debug)]
pub enum FeedFetch {
    /// Feed unchanged since the stored validator.
    NotModified,
    Items(Vec<FeedItem>),
    /// 429/403 with the server's suggested wait, when it sent one.
    RateLimited { hint: Option<Duration> },
}

pub struct FeedClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    etag: Mutex<Option<String>>,
}

impl FeedClient {
    pub fn new(url: String, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("repo-sentinel/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            http,
            url,
            token,
            etag: Mutex::new(None),
        }
    }

    pub async fn fetch_latest(&self) -> Result<FeedFetch> {
        let mut req = self
            .http
            .get(&self.url)
            .header("Accept", "application/vnd.github+json")
            .query(&[("per_page", "100")]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let etag = self.etag.lock().expect("etag mutex poisoned").clone();
        if let Some(etag) = etag {
            req = req.header("If-None-Match", etag);
        }

        let resp = req.send().await.context("feed request failed")?;
        let status = resp.status();

        if status.as_u16() == 304 {
            return Ok(FeedFetch::NotModified);
        }
        if status.as_u16() == 429 || status.as_u16() == 403 {
            let hint = rate_limit_hint(
                header_str(&resp, "retry-after").as_deref(),
                header_str(&resp, "x-ratelimit-reset").as_deref(),
                Utc::now().timestamp().max(0) as u64,
            );
            return Ok(FeedFetch::RateLimited { hint });
        }
        if !status.is_success() {
            return Err(anyhow!("feed status {status}"));
        }

        if let Some(etag) = header_str(&resp, "etag") {
            let mut g = self.etag.lock().expect("etag mutex poisoned");
            *g = Some(etag);
        }

        let raw: Vec<RawEvent> = resp.json().await.context("feed body")?;
        Ok(FeedFetch::Items(raw.into_iter().map(FeedItem::from).collect()))
    }
}

fn header_str(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Prefer an explicit `retry-after` seconds value; otherwise derive the wait
/// from the rate-window reset epoch.
fn rate_limit_hint(
    retry_after: Option<&str>,
    reset_epoch: Option<&str>,
    now_epoch: u64,
) -> Option<Duration> {
    if let Some(secs) = retry_after.and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    reset_epoch
        .and_then(|v| v.parse::<u64>().ok())
        .map(|reset| Duration::from_secs(reset.saturating_sub(now_epoch)))
}

// ------------------------------------------------------------
// Wire shape
// ------------------------------------------------------------

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    actor: RawActor,
    repo: RawRepo,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct RawActor {
    login: String,
}

#[derive(Deserialize)]
struct RawRepo {
    name: String,
}

impl From<RawEvent> for FeedItem {
    fn from(raw: RawEvent) -> Self {
        FeedItem {
            id: raw.id,
            event_type: raw.event_type,
            repo: raw.repo.name,
            actor: raw.actor.login,
            created_at: raw.created_at,
            payload: raw.payload,
        }
    }
}
