// src/enrich.rs
//! Best-effort repository context. A TTL cache sits in front of one GraphQL
//! query per repo; a separate point budget (read back from the rate-limit
//! headers) gates the network call so enrichment can never starve the
//! primary feed quota. Every miss path returns `None` and the pipeline
//! continues without context.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;

use crate::types::RepoContext;

const REPO_CONTEXT_QUERY: &str = r#"
query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    stargazerCount
    createdAt
    isArchived
    hasVulnerabilityAlertsEnabled
    branchProtectionRules(first: 1) { totalCount }
    defaultBranchRef {
      target {
        ... on Commit {
          history(first: 50) {
            totalCount
            nodes { author { user { login } } }
          }
          checkSuites(first: 20) {
            nodes { conclusion }
          }
        }
      }
    }
  }
}
"#;

pub struct ContextEnricher {
    http: reqwest::Client,
    graphql_url: String,
    token: Option<String>,
    ttl: Duration,
    point_floor: i64,
    cache: Mutex<HashMap<String, CachedContext>>,
    /// Remaining GraphQL points as last reported; pessimistic until observed.
    points_remaining: Mutex<Option<i64>>,
}

struct CachedContext {
    fetched_at: Instant,
    context: RepoContext,
}

impl ContextEnricher {
    pub fn new(graphql_url: String, token: Option<String>, ttl: Duration, point_floor: i64) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("repo-sentinel/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            http,
            graphql_url,
            token,
            ttl,
            point_floor,
            cache: Mutex::new(HashMap::new()),
            points_remaining: Mutex::new(None),
        }
    }

    /// Fetch context for `owner/name`, serving from cache within the TTL.
    /// Returns `None` when unconfigured, over budget, or on any fetch error.
    pub async fn fetch(&self, repo: &str) -> Option<RepoContext> {
        {
            let cache = self.cache.lock().expect("enrich cache mutex poisoned");
            if let Some(hit) = cache.get(repo) {
                if hit.fetched_at.elapsed() < self.ttl {
                    counter!("enrich_cache_hits_total").increment(1);
                    return Some(hit.context.clone());
                }
            }
        }

        let token = self.token.as_ref()?;

        {
            let points = self.points_remaining.lock().expect("points mutex poisoned");
            if let Some(remaining) = *points {
                if remaining < self.point_floor {
                    counter!("enrich_budget_skips_total").increment(1);
                    tracing::debug!(target: "enrich", repo, remaining, "point budget below floor; skipping");
                    return None;
                }
            }
        }

        match self.fetch_remote(repo, token).await {
            Ok(context) => {
                let mut cache = self.cache.lock().expect("enrich cache mutex poisoned");
                cache.insert(
                    repo.to_string(),
                    CachedContext {
                        fetched_at: Instant::now(),
                        context: context.clone(),
                    },
                );
                counter!("enrich_fetches_total").increment(1);
                Some(context)
            }
            Err(e) => {
                counter!("enrich_errors_total").increment(1);
                tracing::warn!(target: "enrich", repo, error = ?e, "context fetch failed");
                None
            }
        }
    }

    /// Evict entries older than the TTL. Driven by the poller's cycle count.
    pub fn sweep(&self) {
        let mut cache = self.cache.lock().expect("enrich cache mutex poisoned");
        let before = cache.len();
        cache.retain(|_, v| v.fetched_at.elapsed() < self.ttl);
        let evicted = before - cache.len();
        if evicted > 0 {
            tracing::debug!(target: "enrich", evicted, "cache sweep");
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().expect("enrich cache mutex poisoned").len()
    }

    async fn fetch_remote(&self, repo: &str, token: &str) -> Result<RepoContext> {
        let (owner, name) = repo
            .split_once('/')
            .ok_or_else(|| anyhow!("repo name without owner: {repo}"))?;
        let body = serde_json::json!({
            "query": REPO_CONTEXT_QUERY,
            "variables": { "owner": owner, "name": name },
        });
        let resp = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("graphql request")?;

        if let Some(remaining) = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
        {
            let mut points = self.points_remaining.lock().expect("points mutex poisoned");
            *points = Some(remaining);
        }

        if !resp.status().is_success() {
            return Err(anyhow!("graphql status {}", resp.status()));
        }
        let reply: GraphQlReply = resp.json().await.context("graphql body")?;
        let repo_node = reply
            .data
            .and_then(|d| d.repository)
            .ok_or_else(|| anyhow!("repository not found"))?;
        Ok(build_context(repo_node, Utc::now()))
    }
}

// ------------------------------------------------------------
// GraphQL reply shape
// ------------------------------------------------------------

#[derive(Deserialize)]
struct GraphQlReply {
    data: Option<GraphQlData>,
}

#[derive(Deserialize)]
struct GraphQlData {
    repository: Option<RepoNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoNode {
    stargazer_count: u64,
    created_at: DateTime<Utc>,
    is_archived: bool,
    has_vulnerability_alerts_enabled: bool,
    branch_protection_rules: CountNode,
    default_branch_ref: Option<BranchRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountNode {
    total_count: u64,
}

#[derive(Deserialize)]
struct BranchRef {
    target: Option<CommitTarget>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitTarget {
    history: Option<History>,
    check_suites: Option<CheckSuites>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct History {
    total_count: u64,
    #[serde(default)]
    nodes: Vec<HistoryNode>,
}

#[derive(Deserialize)]
struct HistoryNode {
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    user: Option<UserNode>,
}

#[derive(Deserialize)]
struct UserNode {
    login: String,
}

#[derive(Deserialize)]
struct CheckSuites {
    #[serde(default)]
    nodes: Vec<CheckSuiteNode>,
}

#[derive(Deserialize)]
struct CheckSuiteNode {
    conclusion: Option<String>,
}

fn build_context(node: RepoNode, now: DateTime<Utc>) -> RepoContext {
    let age_days = (now - node.created_at).num_seconds().max(0) as f64 / 86_400.0;

    let mut unique = std::collections::HashSet::new();
    let mut recent = 0u64;
    let mut check_total = 0u64;
    let mut check_failed = 0u64;
    if let Some(target) = node.default_branch_ref.and_then(|b| b.target) {
        if let Some(history) = target.history {
            recent = history.total_count;
            for n in history.nodes {
                if let Some(login) = n.author.and_then(|a| a.user).map(|u| u.login) {
                    unique.insert(login);
                }
            }
        }
        if let Some(suites) = target.check_suites {
            for s in suites.nodes {
                if let Some(conclusion) = s.conclusion {
                    check_total += 1;
                    if conclusion.eq_ignore_ascii_case("FAILURE") {
                        check_failed += 1;
                    }
                }
            }
        }
    }
    let check_failure_rate = if check_total > 0 {
        Some(check_failed as f64 / check_total as f64)
    } else {
        None
    };

    let mut ctx = RepoContext {
        stars: node.stargazer_count,
        age_days,
        archived: node.is_archived,
        has_branch_protection: node.branch_protection_rules.total_count > 0,
        vulnerability_alerts_enabled: node.has_vulnerability_alerts_enabled,
        unique_contributors: unique.len() as u64,
        recent_commit_count: recent,
        check_failure_rate,
        contextual_risk: 0.0,
    };
    ctx.contextual_risk = contextual_risk(&ctx);
    ctx
}

/// Weighted risk from repo posture, clamped to [0,1]. Young, unpopular,
/// unprotected, archived-but-active repos with failing checks and a single
/// dominant contributor score highest.
pub fn contextual_risk(ctx: &RepoContext) -> f64 {
    let young = if ctx.age_days < 30.0 { 1.0 } else { 0.0 };
    let unpopular = if ctx.stars < 10 { 1.0 } else { 0.0 };
    let no_protection = if ctx.has_branch_protection { 0.0 } else { 1.0 };
    let archived = if ctx.archived { 1.0 } else { 0.0 };
    let failing_checks = match ctx.check_failure_rate {
        Some(rate) if rate > 0.5 => 1.0,
        _ => 0.0,
    };
    let concentrated = if ctx.unique_contributors < 3 { 1.0 } else { 0.0 };

    let risk: f64 = 0.25 * young
        + 0.20 * no_protection
        + 0.15 * unpopular
        + 0.15 * archived
        + 0.15 * failing_checks
        + 0.10 * concentrated;
    risk.clamp(0.0, 1.0)
}
