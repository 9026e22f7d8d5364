// src/summarize/llm.rs
//! Completion provider abstraction. The real provider talks to the OpenAI
//! Chat Completions API with a low-temperature, JSON-biased configuration;
//! the mock replays a scripted sequence for tests. Requires `OPENAI_API_KEY`;
//! without it the whole summarization subsystem stays disabled and ingestion
//! runs on its own.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Rendered prompt pair for one summarization job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Upstream rate limit; the job is retriable as-is.
    #[error("completion rate limited")]
    RateLimited,
    /// Anything else is terminal for the job.
    #[error("completion failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError>;
    fn provider_name(&self) -> &'static str;
}

pub type DynCompletionClient = Arc<dyn CompletionClient>;

/// Build the provider from config; `None` when no credential is present.
pub fn build_completion_client(cfg: &crate::config::Config) -> Option<DynCompletionClient> {
    cfg.openai_api_key.as_ref().map(|key| {
        Arc::new(OpenAiClient::new(
            key.clone(),
            cfg.openai_model.clone(),
            cfg.completion_timeout,
        )) as DynCompletionClient
    })
}

// ------------------------------------------------------------
// OpenAI provider
// ------------------------------------------------------------

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("repo-sentinel/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let req = ChatReq {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &prompt.system,
                },
                Msg {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.1,
            max_tokens: 700,
            response_format: serde_json::json!({ "type": "json_object" }),
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| CompletionError::Failed(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(CompletionError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(CompletionError::Failed(format!(
                "status {}",
                resp.status()
            )));
        }
        let body: ChatResp = resp
            .json()
            .await
            .map_err(|e| CompletionError::Failed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CompletionError::Failed("empty choices".to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Scripted mock for tests and local runs
// ------------------------------------------------------------

/// Replays queued replies in order; repeats the last one once exhausted.
pub struct MockCompletion {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    last: Mutex<Option<String>>,
}

impl MockCompletion {
    pub fn fixed(reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Some(reply.to_string())),
        }
    }

    pub fn scripted(replies: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, _prompt: &Prompt) -> Result<String, CompletionError> {
        let next = self.script.lock().expect("mock mutex poisoned").pop_front();
        match next {
            Some(Ok(reply)) => {
                *self.last.lock().expect("mock mutex poisoned") = Some(reply.clone());
                Ok(reply)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .expect("mock mutex poisoned")
                .clone()
                .ok_or_else(|| CompletionError::Failed("script exhausted".to_string())),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
