// src/types.rs
// Core data model shared by the poller, worker, and request path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One activity record from the public events feed. Immutable once observed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    /// External identifier, unique and opaque.
    pub id: String,
    /// Event kind, e.g. "PushEvent".
    pub event_type: String,
    /// Origin repository, "owner/name".
    pub repo: String,
    /// Acting identity (login).
    pub actor: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Raw payload as delivered by the feed.
    pub payload: serde_json::Value,
}

/// Output of one scorer axis: a score in [0,1], a verdict, and named signals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    pub score: f64,
    pub flagged: bool,
    #[serde(default)]
    pub signals: HashMap<String, f64>,
}

/// Derived tag computed from the two scorer verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Security,
    CodeQuality,
    Both,
    Normal,
}

impl Category {
    pub fn from_verdicts(security: bool, code_quality: bool) -> Self {
        match (security, code_quality) {
            (true, true) => Category::Both,
            (true, false) => Category::Security,
            (false, true) => Category::CodeQuality,
            (false, false) => Category::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::CodeQuality => "code_quality",
            Category::Both => "both",
            Category::Normal => "normal",
        }
    }

    /// Which budget counter and prompt template this category charges.
    /// Security wins when both verdicts fired; unflagged events fall back to
    /// the reviewer axis.
    pub fn axis(&self) -> Axis {
        match self {
            Category::Security | Category::Both => Axis::Security,
            Category::CodeQuality | Category::Normal => Axis::CodeQuality,
        }
    }
}

/// The two scoring/summarization axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Security,
    CodeQuality,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Security => "security",
            Axis::CodeQuality => "code_quality",
        }
    }
}

/// Unified three-value classification vocabulary. Code-quality model output is
/// normalized onto these values before persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    MaliciousActivity,
    PolicyViolation,
    Benign,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::MaliciousActivity => "malicious_activity",
            Classification::PolicyViolation => "policy_violation",
            Classification::Benign => "benign",
        }
    }
}

/// Point-in-time snapshot of a repository, cached per name with a TTL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoContext {
    pub stars: u64,
    pub age_days: f64,
    pub archived: bool,
    pub has_branch_protection: bool,
    pub vulnerability_alerts_enabled: bool,
    pub unique_contributors: u64,
    pub recent_commit_count: u64,
    pub check_failure_rate: Option<f64>,
    /// Weighted combination of the fields above, clamped to [0,1].
    pub contextual_risk: f64,
}

impl RepoContext {
    /// Nested document shape the scoring service consumes alongside an event.
    pub fn to_scorer_doc(&self) -> serde_json::Value {
        serde_json::json!({
            "metadata": {
                "stars": self.stars,
                "age_days": self.age_days,
                "isArchived": self.archived,
            },
            "security": {
                "hasBranchProtection": self.has_branch_protection,
                "vulnerabilityAlertsEnabled": self.vulnerability_alerts_enabled,
            },
            "activity": {
                "uniqueContributors": self.unique_contributors,
                "recentCommitCount": self.recent_commit_count,
            },
            "checks": self.check_failure_rate
                .map(|r| serde_json::json!({ "failureRate": r }))
                .unwrap_or(serde_json::Value::Null),
        })
    }
}

/// One unit of summarization work. Enqueued at most once per event id while
/// outstanding; requeued as-is after a rate-limited completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationJob {
    pub event_id: String,
    pub item: FeedItem,
    pub score: Option<ScoreResult>,
    pub context: Option<RepoContext>,
    pub category: Category,
}

/// Finished incident summary. Immutable; first writer wins per event id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub event_id: String,
    pub category: Category,
    pub classification: Classification,
    pub confidence: f64,
    pub headline: String,
    pub root_cause: Vec<String>,
    pub impact: Vec<String>,
    pub next_steps: Vec<String>,
    /// Raw structured model output, kept for audit.
    pub raw: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An ingested event together with everything the pipeline derived for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub item: FeedItem,
    pub category: Category,
    pub security: Option<ScoreResult>,
    pub code_quality: Option<ScoreResult>,
    pub context: Option<RepoContext>,
}

impl EventRecord {
    /// Score for the axis a summary of this event would be charged to.
    pub fn axis_score(&self) -> Option<&ScoreResult> {
        match self.category.axis() {
            Axis::Security => self.security.as_ref(),
            Axis::CodeQuality => self.code_quality.as_ref(),
        }
    }
}

/// Kinds of events pushed to live subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    NewEvent,
    NewSummary,
    SummaryError,
    Reset,
}

impl BroadcastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastKind::NewEvent => "new_event",
            BroadcastKind::NewSummary => "new_summary",
            BroadcastKind::SummaryError => "summary_error",
            BroadcastKind::Reset => "reset",
        }
    }
}
