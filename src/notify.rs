// src/notify.rs
//! Fan-out to live viewers. Delivery is best-effort: a subscriber whose
//! channel is gone is dropped on the next broadcast, the rest still receive.

use std::sync::Mutex;

use metrics::gauge;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::types::BroadcastKind;

/// One serialized message as delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub kind: BroadcastKind,
    /// JSON payload, serialized once per broadcast.
    pub data: String,
}

#[derive(Debug, Default)]
pub struct Notifier {
    subs: Mutex<Vec<UnboundedSender<BroadcastMessage>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<BroadcastMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.subs.lock().expect("notifier mutex poisoned");
        subs.push(tx);
        gauge!("live_subscribers").set(subs.len() as f64);
        rx
    }

    pub fn broadcast(&self, kind: BroadcastKind, payload: &serde_json::Value) {
        let data = payload.to_string();
        let mut subs = self.subs.lock().expect("notifier mutex poisoned");
        subs.retain(|tx| {
            tx.send(BroadcastMessage {
                kind,
                data: data.clone(),
            })
            .is_ok()
        });
        gauge!("live_subscribers").set(subs.len() as f64);
        tracing::debug!(
            target: "notify",
            kind = kind.as_str(),
            subscribers = subs.len(),
            "broadcast"
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.lock().expect("notifier mutex poisoned").len()
    }
}
