// src/config.rs
// Environment-backed settings. Every field has a default so the pipeline can
// boot in a dev shell with nothing but `cargo run`; secrets stay optional and
// disable their subsystem when absent.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,

    // Feed source
    pub feed_url: String,
    pub github_token: Option<String>,
    pub poll_interval: Duration,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    pub seen_ceiling: usize,
    pub seen_trim_to: usize,

    // Context enrichment
    pub graphql_url: String,
    pub context_ttl: Duration,
    pub sweep_every_cycles: u64,
    pub point_floor: i64,

    // Scoring service
    pub scorer_url: String,

    // Work queue
    pub queue_rest_url: Option<String>,
    pub queue_rest_token: Option<String>,
    pub queue_key: String,
    pub queue_probe_attempts: u32,
    pub pop_wait: Duration,

    // Summarization
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub summary_budget_per_axis: u32,
    pub payload_char_ceiling: usize,
    pub completion_timeout: Duration,
    pub rate_limit_cooldown: Duration,
    pub inter_job_pause: Duration,

    // Record store
    pub event_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            feed_url: "https://api.github.com/events".to_string(),
            github_token: None,
            poll_interval: Duration::from_secs(10),
            backoff_floor: Duration::from_secs(5),
            backoff_ceiling: Duration::from_secs(900),
            seen_ceiling: 2048,
            seen_trim_to: 1024,
            graphql_url: "https://api.github.com/graphql".to_string(),
            context_ttl: Duration::from_secs(600),
            sweep_every_cycles: 30,
            point_floor: 100,
            scorer_url: "http://localhost:5001".to_string(),
            queue_rest_url: None,
            queue_rest_token: None,
            queue_key: "sentinel:summary-jobs".to_string(),
            queue_probe_attempts: 3,
            pop_wait: Duration::from_secs(1),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            summary_budget_per_axis: 50,
            payload_char_ceiling: 4000,
            completion_timeout: Duration::from_secs(30),
            rate_limit_cooldown: Duration::from_secs(60),
            inter_job_pause: Duration::from_millis(500),
            event_retention: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Self {
            bind_addr: env_str("BIND_ADDR", &d.bind_addr),
            feed_url: env_str("FEED_URL", &d.feed_url),
            github_token: env_opt("GITHUB_TOKEN"),
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS", 10)),
            backoff_floor: Duration::from_secs(env_u64("BACKOFF_FLOOR_SECS", 5)),
            backoff_ceiling: Duration::from_secs(env_u64("BACKOFF_CEILING_SECS", 900)),
            seen_ceiling: env_u64("SEEN_CEILING", 2048) as usize,
            seen_trim_to: env_u64("SEEN_TRIM_TO", 1024) as usize,
            graphql_url: env_str("GRAPHQL_URL", &d.graphql_url),
            context_ttl: Duration::from_secs(env_u64("CONTEXT_TTL_SECS", 600)),
            sweep_every_cycles: env_u64("CONTEXT_SWEEP_CYCLES", 30),
            point_floor: env_u64("GRAPHQL_POINT_FLOOR", 100) as i64,
            scorer_url: env_str("SCORER_URL", &d.scorer_url),
            queue_rest_url: env_opt("QUEUE_REST_URL"),
            queue_rest_token: env_opt("QUEUE_REST_TOKEN"),
            queue_key: env_str("QUEUE_KEY", &d.queue_key),
            queue_probe_attempts: env_u64("QUEUE_PROBE_ATTEMPTS", 3) as u32,
            pop_wait: Duration::from_secs(env_u64("QUEUE_POP_WAIT_SECS", 1)),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_str("OPENAI_MODEL", &d.openai_model),
            summary_budget_per_axis: env_u64("SUMMARY_BUDGET", 50) as u32,
            payload_char_ceiling: env_u64("PAYLOAD_CHAR_CEILING", 4000) as usize,
            completion_timeout: Duration::from_secs(env_u64("COMPLETION_TIMEOUT_SECS", 30)),
            rate_limit_cooldown: Duration::from_secs(env_u64("RATE_LIMIT_COOLDOWN_SECS", 60)),
            inter_job_pause: Duration::from_millis(env_u64("INTER_JOB_PAUSE_MS", 500)),
            event_retention: env_u64("EVENT_RETENTION", 500) as usize,
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
