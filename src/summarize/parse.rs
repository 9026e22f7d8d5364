// src/summarize/parse.rs
//! Model output handling: pull the JSON object out of a possibly fenced
//! response, parse it against the role schema, and normalize the
//! code-quality vocabulary onto the unified classification values.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::types::Classification;

/// Structured fields both role schemas share.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelOutput {
    pub classification: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub root_cause: Vec<String>,
    #[serde(default)]
    pub impact: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

fn default_confidence() -> f64 {
    0.5
}

/// Locate the JSON object in a response, tolerating ```json fences and
/// surrounding prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse the response into the shared schema plus the raw JSON value.
pub fn parse_model_output(text: &str) -> Result<(ModelOutput, serde_json::Value)> {
    let object = extract_json_object(text).ok_or_else(|| anyhow!("no JSON object in response"))?;
    let raw: serde_json::Value =
        serde_json::from_str(object).context("model output is not valid JSON")?;
    let parsed: ModelOutput =
        serde_json::from_value(raw.clone()).context("model output missing schema fields")?;
    Ok((parsed, raw))
}

/// Map any classification string onto the unified vocabulary. Code-quality
/// values fold onto their security equivalents; anything unrecognized lands
/// on the ambiguous middle value instead of failing the job.
pub fn normalize_classification(raw: &str) -> Classification {
    match raw.trim().to_ascii_lowercase().as_str() {
        "malicious_activity" | "active_attack" => Classification::MaliciousActivity,
        "policy_violation" => Classification::PolicyViolation,
        "benign" => Classification::Benign,
        // code-quality vocabulary
        "critical" => Classification::MaliciousActivity,
        "poor_practice" => Classification::PolicyViolation,
        "minor_concern" => Classification::Benign,
        _ => Classification::PolicyViolation,
    }
}
