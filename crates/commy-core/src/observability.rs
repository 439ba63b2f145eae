use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub received: u64,
    pub delivered: u64,
    pub no_subscribers: u64,
    pub dropped_frame: u64,
    pub dropped_unknown_tag: u64,
    pub dropped_malformed: u64,
    pub handler_failures: u64,
}

impl DispatchCounts {
    pub fn dropped(&self) -> u64 {
        self.dropped_frame + self.dropped_unknown_tag + self.dropped_malformed
    }
}

#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    received: AtomicU64,
    delivered: AtomicU64,
    no_subscribers: AtomicU64,
    dropped_frame: AtomicU64,
    dropped_unknown_tag: AtomicU64,
    dropped_malformed: AtomicU64,
    handler_failures: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, failures: usize) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.handler_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_no_subscribers(&self) {
        self.no_subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_frame(&self) {
        self.dropped_frame.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown_tag(&self) {
        self.dropped_unknown_tag.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            no_subscribers: self.no_subscribers.load(Ordering::Relaxed),
            dropped_frame: self.dropped_frame.load(Ordering::Relaxed),
            dropped_unknown_tag: self.dropped_unknown_tag.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}
