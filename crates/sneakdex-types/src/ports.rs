//! Backend-agnostic trait seams (ports) between crawler components.
//!
//! These traits exist so the orchestrator can construct concrete
//! adapters (Redis, rdkafka) while the components that use them stay
//! testable against in-memory fakes.

use crate::error::Result;
use crate::types::{ProducerRecord, QueueItem};
use async_trait::async_trait;
use std::time::Duration;

/// Minimal KV store surface the Queue Manager needs (§4.3).
///
/// Mirrors the shape of the teacher's `CacheStorage` port but adds the
/// list/set primitives the depth-bucketed pending queue depends on.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn list_push_back(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn list_len(&self, key: &str) -> Result<u64>;
    async fn list_delete_if_empty(&self, key: &str) -> Result<()>;

    /// Returns `true` if the value was newly added (not already present).
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool>;
    async fn set_sample(&self, key: &str, count: usize) -> Result<Vec<String>>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Short-timeout liveness probe used by `/health` (§4.7).
    async fn ping(&self) -> Result<()>;
}

/// Outcome of a single `Publish` call (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Accepted onto the input channel.
    Accepted,
    /// Input channel was full after the bounded wait; caller should
    /// apply the requeue policy (§4.5).
    Backpressure,
}

/// Message bus producer surface the Fetcher calls into (§4.4).
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Reject synchronously on oversize payloads, otherwise offer the
    /// record to the producer's input channel with a bounded wait.
    async fn publish(&self, record: ProducerRecord) -> Result<PublishOutcome>;

    /// Non-blocking probe of the input channel used by `/health`.
    fn input_channel_has_capacity(&self) -> bool;

    /// Flush in-flight records and close the producer (§4.4 Shutdown).
    async fn close(&self) -> Result<()>;
}

/// Seen a URL's origin for the requeue policy without needing a second
/// lookup against the KV store (shared by Fetcher and Publisher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueDecision {
    /// URL had not been requeued yet; re-enqueue it and mark requeued.
    Requeue,
    /// URL was already requeued once; this is the second strike, mark visited.
    GiveUp,
}

/// Abstraction over "what happens after a retriable error for this URL"
/// so both the Fetcher's inline requeue and the Publisher's error-stream
/// handler can share one implementation (§4.4, §4.5).
#[async_trait]
pub trait RequeuePolicy: Send + Sync {
    async fn decide(&self, url: &str) -> Result<RequeueDecision>;
    async fn apply(&self, decision: RequeueDecision, item: QueueItem) -> Result<()>;
}
