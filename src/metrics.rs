use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayMetricsSnapshot {
    pub ticks: u64,
    pub snapshots_published: u64,
    pub publish_failures: u64,
    pub obstacles_dropped: u64,
    pub queued_discarded: u64,
    pub peak_queue_depth: usize,
}

// Counters shared between the relay tick task and its delivery worker
#[derive(Debug, Clone, Default)]
pub struct RelayMetrics {
    inner: Arc<RwLock<RelayMetricsSnapshot>>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) {
        self.inner.write().ticks += 1;
    }

    pub fn published(&self) {
        self.inner.write().snapshots_published += 1;
    }

    pub fn publish_failed(&self) {
        self.inner.write().publish_failures += 1;
    }

    pub fn obstacles_dropped(&self, n: usize) {
        self.inner.write().obstacles_dropped += n as u64;
    }

    pub fn discarded(&self, n: usize) {
        self.inner.write().queued_discarded += n as u64;
    }

    pub fn record_queue_depth(&self, depth: usize) {
        let mut inner = self.inner.write();
        inner.peak_queue_depth = inner.peak_queue_depth.max(depth);
    }

    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        self.inner.read().clone()
    }
}
