//! Core domain entities shared across crawler components (§3).

use serde::{Deserialize, Serialize};

/// A unit of crawl work: a canonical URL at a given depth.
///
/// Produced by link extraction or seed loading, consumed by the Queue
/// Feeder, and serialized as JSON when stored in the pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Canonical (normalized) URL
    pub url: String,
    /// Depth relative to the seeds, `depth(child) = depth(parent) + 1`
    pub depth: u32,
}

impl QueueItem {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }

    pub fn seed(url: impl Into<String>) -> Self {
        Self::new(url, 0)
    }

    pub fn child(&self) -> QueueItem {
        QueueItem::new(self.url.clone(), self.depth + 1)
    }
}

/// Classification of why a fetch attempt ended, driving state
/// transitions in the Queue Manager (§3).
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// HTML retrieved successfully; carries the raw bytes.
    Success { url: String, bytes: bytes::Bytes },
    /// Response was not HTML (e.g. a redirect target serving a PDF).
    NonHtml { url: String },
    /// Request failed; carries the error classification.
    Failure { url: String, kind: FailureKind },
}

/// Kind of fetch failure, distinguishing retriable transport errors from
/// everything else (§4.5, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Permanent,
}

/// A record destined for the message bus (§3: Producer Record).
#[derive(Debug, Clone)]
pub struct ProducerRecord {
    pub topic: String,
    /// Key = canonical URL, ensures same-URL ordering via partitioning.
    pub key: String,
    pub value: bytes::Bytes,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub user_metadata: QueueItem,
}

/// Point-in-time counters snapshot (§3: Metrics Snapshot).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub pages_processed: u64,
    pub pages_successful: u64,
    pub pages_failed: u64,
    pub pages_nonhtml_skipped: u64,
    pub pages_aborted: u64,
    pub kafka_successful: u64,
    pub kafka_failed: u64,
    pub kafka_errored: u64,
    pub redis_successful: u64,
    pub redis_failed: u64,
    pub redis_errored: u64,
    pub inflight_pages: i64,
    pub uptime_seconds: u64,
}

/// Health status reported by `GET /health` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub kv: bool,
    pub bus: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub dependencies: DependencyHealth,
}

impl HealthReport {
    pub fn from_dependencies(kv: bool, bus: bool) -> Self {
        let status = match (kv, bus) {
            (true, true) => HealthStatus::Ok,
            (false, false) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            dependencies: DependencyHealth { kv, bus },
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.status {
            HealthStatus::Ok => 200,
            HealthStatus::Degraded | HealthStatus::Unhealthy => 503,
        }
    }
}
