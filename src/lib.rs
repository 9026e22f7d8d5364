// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod enrich;
pub mod gate;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod score;
pub mod store;
pub mod summarize;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::config::Config;
pub use crate::gate::{Admission, RequestGate};
pub use crate::notify::Notifier;
pub use crate::pipeline::{Pipeline, SummaryRequestOutcome};
pub use crate::queue::{InProcessQueue, WorkQueue};
pub use crate::store::RecordStore;
pub use crate::summarize::{SummaryWorker, WorkerConfig};
pub use crate::types::{Category, Classification, FeedItem, Summary};
