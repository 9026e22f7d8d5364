// src/summarize/prompt.rs
//! Role-specific prompt rendering. Security-led categories get the analyst
//! template, the rest get the reviewer template; both demand one JSON object
//! on a fixed schema. The raw payload is size-capped with an explicit marker
//! so a giant push payload cannot blow the context window.

use crate::types::{Axis, RepoContext, ScoreResult, SummarizationJob};

use super::llm::Prompt;

pub const TRUNCATION_MARKER: &str = "…[payload truncated]";

const SECURITY_SYSTEM: &str = "You are a security analyst triaging suspicious activity on a public \
code-hosting platform. Analyze the event and respond with exactly one JSON object, no prose, \
matching: {\"classification\": \"malicious_activity\" | \"policy_violation\" | \"benign\", \
\"confidence\": number between 0 and 1, \"summary\": one sentence, \
\"root_cause\": [strings], \"impact\": [strings], \"next_steps\": [strings]}.";

const CODE_QUALITY_SYSTEM: &str = "You are a senior code-quality reviewer assessing engineering \
practices on a public code-hosting platform. Analyze the event and respond with exactly one JSON \
object, no prose, matching: {\"classification\": \"critical\" | \"poor_practice\" | \
\"minor_concern\", \"confidence\": number between 0 and 1, \"summary\": one sentence, \
\"root_cause\": [strings], \"impact\": [strings], \"next_steps\": [strings]}.";

pub fn render(job: &SummarizationJob, payload_char_ceiling: usize) -> Prompt {
    let system = match job.category.axis() {
        Axis::Security => SECURITY_SYSTEM,
        Axis::CodeQuality => CODE_QUALITY_SYSTEM,
    };

    let mut user = String::with_capacity(1024);
    user.push_str(&format!(
        "Event: {} on {} by {}\n",
        job.item.event_type, job.item.repo, job.item.actor
    ));
    if let Some(ts) = job.item.created_at {
        user.push_str(&format!("At: {}\n", ts.to_rfc3339()));
    }
    user.push_str(&format!("Category: {}\n", job.category.as_str()));

    if let Some(score) = &job.score {
        user.push_str(&render_score(score));
    }
    if let Some(ctx) = &job.context {
        user.push_str(&render_context(ctx));
    }

    user.push_str("\nRaw payload:\n");
    user.push_str(&render_payload(&job.item.payload, payload_char_ceiling));

    Prompt {
        system: system.to_string(),
        user,
    }
}

fn render_score(score: &ScoreResult) -> String {
    let mut out = format!("Risk score: {:.3} (flagged: {})\n", score.score, score.flagged);
    if !score.signals.is_empty() {
        // Deterministic ordering keeps prompts cache-friendly and testable.
        let mut signals: Vec<_> = score.signals.iter().collect();
        signals.sort_by(|a, b| a.0.cmp(b.0));
        out.push_str("Signals:\n");
        for (name, value) in signals {
            if *value != 0.0 {
                out.push_str(&format!("  {name}: {value:.3}\n"));
            }
        }
    }
    out
}

fn render_context(ctx: &RepoContext) -> String {
    let mut out = String::from("Repository context:\n");
    out.push_str(&format!(
        "  stars: {}, age_days: {:.0}, archived: {}\n",
        ctx.stars, ctx.age_days, ctx.archived
    ));
    out.push_str(&format!(
        "  branch_protection: {}, vulnerability_alerts: {}\n",
        ctx.has_branch_protection, ctx.vulnerability_alerts_enabled
    ));
    out.push_str(&format!(
        "  contributors: {}, recent_commits: {}\n",
        ctx.unique_contributors, ctx.recent_commit_count
    ));
    if let Some(rate) = ctx.check_failure_rate {
        out.push_str(&format!("  check_failure_rate: {rate:.2}\n"));
    }
    out.push_str(&format!("  contextual_risk: {:.2}\n", ctx.contextual_risk));
    out
}

fn render_payload(payload: &serde_json::Value, ceiling: usize) -> String {
    let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| "{}".to_string());
    if pretty.chars().count() <= ceiling {
        return pretty;
    }
    let mut out: String = pretty.chars().take(ceiling).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, FeedItem};

    fn job(category: Category, payload: serde_json::Value) -> SummarizationJob {
        SummarizationJob {
            event_id: "e1".into(),
            item: FeedItem {
                id: "e1".into(),
                event_type: "PushEvent".into(),
                repo: "octo/demo".into(),
                actor: "mona".into(),
                created_at: None,
                payload,
            },
            score: None,
            context: None,
            category,
        }
    }

    #[test]
    fn security_and_both_use_the_analyst_template() {
        let sec = render(&job(Category::Security, serde_json::json!({})), 4000);
        let both = render(&job(Category::Both, serde_json::json!({})), 4000);
        assert!(sec.system.contains("security analyst"));
        assert_eq!(sec.system, both.system);
    }

    #[test]
    fn code_quality_uses_the_reviewer_template() {
        let p = render(&job(Category::CodeQuality, serde_json::json!({})), 4000);
        assert!(p.system.contains("code-quality reviewer"));
        assert!(p.system.contains("poor_practice"));
    }

    #[test]
    fn oversized_payload_is_truncated_with_marker() {
        let big = serde_json::json!({ "commits": vec!["x".repeat(100); 100] });
        let p = render(&job(Category::Security, big), 500);
        assert!(p.user.contains(TRUNCATION_MARKER));
        let payload_part = p.user.split("Raw payload:\n").nth(1).unwrap();
        assert!(payload_part.chars().count() <= 500 + TRUNCATION_MARKER.chars().count() + 1);
    }

    #[test]
    fn small_payload_is_not_truncated() {
        let p = render(&job(Category::Security, serde_json::json!({"ok": 1})), 4000);
        assert!(!p.user.contains(TRUNCATION_MARKER));
    }
}
