// src/store.rs
//! In-process record store: bounded event ring plus the summary table.
//!
//! Events are idempotent by id (the feed can re-emit after a restart loses the
//! poller's seen-set). Summaries carry unique-constraint semantics: the first
//! successful write per event id wins and later attempts no-op.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::types::{EventRecord, Summary};

#[derive(Debug)]
pub struct RecordStore {
    inner: Mutex<Inner>,
    retention: usize,
}

#[derive(Debug, Default)]
struct Inner {
    events: HashMap<String, EventRecord>,
    /// Insertion order for retention trimming.
    order: VecDeque<String>,
    summaries: HashMap<String, Summary>,
}

impl RecordStore {
    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            retention: retention.max(1),
        }
    }

    /// Insert an event record. Returns false (and keeps the original) when the
    /// id was already stored.
    pub fn store_event(&self, record: EventRecord) -> bool {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        let id = record.item.id.clone();
        if g.events.contains_key(&id) {
            return false;
        }
        g.events.insert(id.clone(), record);
        g.order.push_back(id);
        while g.order.len() > self.retention {
            if let Some(old) = g.order.pop_front() {
                g.events.remove(&old);
            }
        }
        true
    }

    pub fn get_event(&self, event_id: &str) -> Option<EventRecord> {
        let g = self.inner.lock().expect("store mutex poisoned");
        g.events.get(event_id).cloned()
    }

    /// Most recent `n` events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<EventRecord> {
        let g = self.inner.lock().expect("store mutex poisoned");
        g.order
            .iter()
            .rev()
            .take(n)
            .filter_map(|id| g.events.get(id).cloned())
            .collect()
    }

    /// First-writer-wins insert. Returns true iff this call created the row.
    pub fn store_summary(&self, summary: Summary) -> bool {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        if g.summaries.contains_key(&summary.event_id) {
            return false;
        }
        g.summaries.insert(summary.event_id.clone(), summary);
        true
    }

    pub fn get_summary(&self, event_id: &str) -> Option<Summary> {
        let g = self.inner.lock().expect("store mutex poisoned");
        g.summaries.get(event_id).cloned()
    }

    /// (event count, summary count)
    pub fn counts(&self) -> (usize, usize) {
        let g = self.inner.lock().expect("store mutex poisoned");
        (g.events.len(), g.summaries.len())
    }

    pub fn clear(&self) {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        g.events.clear();
        g.order.clear();
        g.summaries.clear();
    }
}
