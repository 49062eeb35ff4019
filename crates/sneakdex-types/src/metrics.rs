//! Atomic counters backing [`crate::MetricsSnapshot`] (§3, §4.7).
//!
//! Shared via `Arc<Metrics>` across the Fetcher, Publisher, Queue
//! Manager and the Monitor's HTTP server, mirroring the teacher's
//! `WorkerMetrics` (one struct of `AtomicU64` fields plus a start time
//! for uptime, cheap to update from any task without locking).

use crate::types::MetricsSnapshot;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug)]
pub struct Metrics {
    pub pages_processed: AtomicU64,
    pub pages_successful: AtomicU64,
    pub pages_failed: AtomicU64,
    pub pages_nonhtml_skipped: AtomicU64,
    pub pages_aborted: AtomicU64,
    pub kafka_successful: AtomicU64,
    pub kafka_failed: AtomicU64,
    pub kafka_errored: AtomicU64,
    pub redis_successful: AtomicU64,
    pub redis_failed: AtomicU64,
    pub redis_errored: AtomicU64,
    pub inflight_pages: AtomicI64,
    started_at: DateTime<Utc>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            pages_processed: AtomicU64::new(0),
            pages_successful: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            pages_nonhtml_skipped: AtomicU64::new(0),
            pages_aborted: AtomicU64::new(0),
            kafka_successful: AtomicU64::new(0),
            kafka_failed: AtomicU64::new(0),
            kafka_errored: AtomicU64::new(0),
            redis_successful: AtomicU64::new(0),
            redis_failed: AtomicU64::new(0),
            redis_errored: AtomicU64::new(0),
            inflight_pages: AtomicI64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn incr_inflight(&self) {
        self.inflight_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr_inflight(&self) {
        self.inflight_pages.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inflight(&self) -> i64 {
        self.inflight_pages.load(Ordering::Relaxed)
    }

    pub fn pages_processed(&self) -> u64 {
        self.pages_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_processed: self.pages_processed.load(Ordering::Relaxed),
            pages_successful: self.pages_successful.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            pages_nonhtml_skipped: self.pages_nonhtml_skipped.load(Ordering::Relaxed),
            pages_aborted: self.pages_aborted.load(Ordering::Relaxed),
            kafka_successful: self.kafka_successful.load(Ordering::Relaxed),
            kafka_failed: self.kafka_failed.load(Ordering::Relaxed),
            kafka_errored: self.kafka_errored.load(Ordering::Relaxed),
            redis_successful: self.redis_successful.load(Ordering::Relaxed),
            redis_failed: self.redis_failed.load(Ordering::Relaxed),
            redis_errored: self.redis_errored.load(Ordering::Relaxed),
            inflight_pages: self.inflight_pages.load(Ordering::Relaxed),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflight_tracks_increments_and_decrements() {
        let m = Metrics::new();
        m.incr_inflight();
        m.incr_inflight();
        m.decr_inflight();
        assert_eq!(m.inflight(), 1);
    }

    #[test]
    fn snapshot_reflects_counters() {
        let m = Metrics::new();
        m.pages_processed.fetch_add(5, Ordering::Relaxed);
        m.pages_successful.fetch_add(3, Ordering::Relaxed);
        let snap = m.snapshot();
        assert_eq!(snap.pages_processed, 5);
        assert_eq!(snap.pages_successful, 3);
    }
}
