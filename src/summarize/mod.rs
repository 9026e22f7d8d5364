// src/summarize/mod.rs
pub mod llm;
pub mod parse;
pub mod prompt;
pub mod worker;

pub use llm::{build_completion_client, CompletionClient, CompletionError, DynCompletionClient};
pub use worker::{ProcessOutcome, SummaryWorker, WorkerConfig};
