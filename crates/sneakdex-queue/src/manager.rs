//! Queue Manager (§4.3): a persistent priority queue with deduplication
//! and three auxiliary sets, layered over a [`KvStore`].
//!
//! KV key layout is exactly §3:
//! - `crawler:pending_urls:depth_<d>` — FIFO list of serialized `QueueItem`s
//! - `crawler:pending_urls_set` — set mirror for O(1) dedup
//! - `crawler:visited:<url>` — per-URL TTL key
//! - `crawler:requeued_urls` — set of once-requeued URLs

use dashmap::DashSet;
use sneakdex_types::ports::KvStore;
use sneakdex_types::{QueueItem, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const VISITED_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_PRELOAD_VISITED: usize = 10_000;
const DEFAULT_PRELOAD_PENDING: usize = 5_000;

fn pending_key(depth: u32) -> String {
    format!("crawler:pending_urls:depth_{depth}")
}
const PENDING_SET_KEY: &str = "crawler:pending_urls_set";
const REQUEUED_SET_KEY: &str = "crawler:requeued_urls";

fn visited_key(url: &str) -> String {
    format!("crawler:visited:{url}")
}

/// Per-depth counters returned by [`QueueManager::queue_stats`] (§4.3
/// `GetQueueStats`).
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub depth_lengths: Vec<(u32, u64)>,
}

/// Local best-effort accelerator caches (§3 consistency model: "stale
/// in the negative direction only").
struct LocalCaches {
    pending: DashSet<String>,
    seen: DashSet<String>,
    requeued: DashSet<String>,
}

pub struct QueueManager<K: KvStore> {
    kv: Arc<K>,
    max_depth: u32,
    local: LocalCaches,
}

impl<K: KvStore> QueueManager<K> {
    pub fn new(kv: Arc<K>, max_depth: u32) -> Self {
        Self {
            kv,
            max_depth,
            local: LocalCaches {
                pending: DashSet::new(),
                seen: DashSet::new(),
                requeued: DashSet::new(),
            },
        }
    }

    /// `AddToPending(item)` (§4.3). Rejects items deeper than `CrawlDepth`
    /// per invariant 5, dropping them silently (the caller, link
    /// extraction, already filters these, this is defense in depth).
    pub async fn add_to_pending(&self, item: QueueItem) -> Result<()> {
        if item.depth > self.max_depth {
            debug!(url = %item.url, depth = item.depth, "dropping item beyond crawl depth");
            return Ok(());
        }

        if self.local.pending.contains(&item.url) || self.local.seen.contains(&item.url) {
            return Ok(());
        }

        let added = self.kv.set_add(PENDING_SET_KEY, &item.url).await?;
        if !added {
            // Already pending somewhere; nothing further to do.
            self.local.pending.insert(item.url.clone());
            return Ok(());
        }

        let payload = serde_json::to_vec(&item)?;
        let enqueue_result = self
            .kv
            .list_push_back(&pending_key(item.depth), &payload)
            .await;

        if let Err(e) = enqueue_result {
            // Invariant 2: revert the set entry on enqueue failure.
            warn!(url = %item.url, error = %e, "failed to enqueue, reverting pending set");
            let _ = self.kv.set_remove(PENDING_SET_KEY, &item.url).await;
            self.local.pending.remove(&item.url);
            return Err(e);
        }

        self.local.pending.insert(item.url);
        Ok(())
    }

    /// `RemoveFromPending() -> QueueItem | empty` (§4.3). Scans depth
    /// buckets ascending so breadth-first ordering holds: a deeper item
    /// is only returned once every shallower bucket is empty.
    pub async fn remove_from_pending(&self) -> Result<Option<QueueItem>> {
        for depth in 0..=self.max_depth {
            let key = pending_key(depth);
            let popped = self.kv.list_pop_front(&key).await?;
            let Some(bytes) = popped else {
                continue;
            };
            let item: QueueItem = serde_json::from_slice(&bytes)?;
            self.kv.set_remove(PENDING_SET_KEY, &item.url).await.ok();
            self.local.pending.remove(&item.url);
            return Ok(Some(item));
        }
        Ok(None)
    }

    /// `IsURLSeen(url) -> bool` (§4.3): local cache first, then a single
    /// pipelined-equivalent read against `visited` and `pending_urls_set`.
    pub async fn is_url_seen(&self, url: &str) -> Result<bool> {
        if self.local.seen.contains(url) {
            return Ok(true);
        }

        let visited = self.kv.exists(&visited_key(url)).await?;
        let pending = if visited {
            false
        } else {
            self.kv.set_contains(PENDING_SET_KEY, url).await?
        };
        let seen = visited || pending;

        // Always record the outcome, including negative, to bound future KV traffic.
        if seen {
            self.local.seen.insert(url.to_string());
        }
        Ok(seen)
    }

    /// `MarkVisited(url)` (§4.3): terminal operation for any outcome.
    pub async fn mark_visited(&self, url: &str) -> Result<()> {
        self.kv
            .set_with_ttl(&visited_key(url), "1", VISITED_TTL)
            .await?;
        self.local.seen.insert(url.to_string());
        self.local.pending.remove(url);
        Ok(())
    }

    /// `AddToRequeued` (§4.3).
    pub async fn add_to_requeued(&self, url: &str) -> Result<()> {
        self.kv.set_add(REQUEUED_SET_KEY, url).await?;
        self.local.requeued.insert(url.to_string());
        Ok(())
    }

    /// `RemoveFromRequeued` (§4.3).
    pub async fn remove_from_requeued(&self, url: &str) -> Result<()> {
        self.kv.set_remove(REQUEUED_SET_KEY, url).await?;
        self.local.requeued.remove(url);
        Ok(())
    }

    /// `IsRequeued` (§4.3).
    pub async fn is_requeued(&self, url: &str) -> Result<bool> {
        if self.local.requeued.contains(url) {
            return Ok(true);
        }
        let requeued = self.kv.set_contains(REQUEUED_SET_KEY, url).await?;
        if requeued {
            self.local.requeued.insert(url.to_string());
        }
        Ok(requeued)
    }

    /// `PreloadLocalCaches()` (§4.3): sample a bounded slice of `visited`
    /// is not possible against a per-key TTL store directly, so instead
    /// this samples `pending_urls_set` and loads the full `requeued_urls`
    /// set, matching the bound each was given in the spec.
    pub async fn preload_local_caches(&self) -> Result<()> {
        let pending_sample = self
            .kv
            .set_sample(PENDING_SET_KEY, DEFAULT_PRELOAD_PENDING)
            .await?;
        for url in pending_sample {
            self.local.pending.insert(url);
        }

        let requeued = self.kv.set_members(REQUEUED_SET_KEY).await?;
        for url in requeued {
            self.local.requeued.insert(url);
        }

        debug!(
            preloaded_pending = self.local.pending.len(),
            preloaded_requeued = self.local.requeued.len(),
            cap = DEFAULT_PRELOAD_VISITED,
            "preloaded local caches"
        );
        Ok(())
    }

    /// `GetQueueStats()` (§4.3).
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let mut depth_lengths = Vec::with_capacity(self.max_depth as usize + 1);
        for depth in 0..=self.max_depth {
            let len = self.kv.list_len(&pending_key(depth)).await?;
            depth_lengths.push((depth, len));
        }
        Ok(QueueStats { depth_lengths })
    }

    /// `CleanupEmptyQueues()` (§4.3): maintenance sweep, run periodically
    /// by the orchestrator rather than only on demand (SPEC_FULL.md
    /// supplement).
    pub async fn cleanup_empty_queues(&self) -> Result<()> {
        for depth in 0..=self.max_depth {
            self.kv.list_delete_if_empty(&pending_key(depth)).await?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeKv;
    use super::*;

    fn manager() -> QueueManager<FakeKv> {
        QueueManager::new(Arc::new(FakeKv::default()), 3)
    }

    #[tokio::test]
    async fn add_then_remove_round_trips() {
        let qm = manager();
        qm.add_to_pending(QueueItem::seed("https://a.test")).await.unwrap();
        let popped = qm.remove_from_pending().await.unwrap();
        assert_eq!(popped, Some(QueueItem::seed("https://a.test")));
        assert_eq!(qm.remove_from_pending().await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_add_is_deduplicated() {
        let qm = manager();
        qm.add_to_pending(QueueItem::seed("https://a.test")).await.unwrap();
        qm.add_to_pending(QueueItem::seed("https://a.test")).await.unwrap();
        let stats = qm.queue_stats().await.unwrap();
        assert_eq!(stats.depth_lengths[0].1, 1);
    }

    #[tokio::test]
    async fn breadth_first_ordering_across_depths() {
        let qm = manager();
        qm.add_to_pending(QueueItem::new("https://b.test", 1)).await.unwrap();
        qm.add_to_pending(QueueItem::new("https://a.test", 0)).await.unwrap();
        let first = qm.remove_from_pending().await.unwrap().unwrap();
        assert_eq!(first.depth, 0);
        let second = qm.remove_from_pending().await.unwrap().unwrap();
        assert_eq!(second.depth, 1);
    }

    #[tokio::test]
    async fn items_beyond_max_depth_are_dropped() {
        let qm = manager();
        qm.add_to_pending(QueueItem::new("https://deep.test", 99)).await.unwrap();
        assert_eq!(qm.remove_from_pending().await.unwrap(), None);
    }

    #[tokio::test]
    async fn mark_visited_prevents_resurrection() {
        let qm = manager();
        qm.add_to_pending(QueueItem::seed("https://a.test")).await.unwrap();
        let item = qm.remove_from_pending().await.unwrap().unwrap();
        qm.mark_visited(&item.url).await.unwrap();
        assert!(qm.is_url_seen(&item.url).await.unwrap());
    }

    #[tokio::test]
    async fn requeue_membership_tracks_single_retry() {
        let qm = manager();
        assert!(!qm.is_requeued("https://a.test").await.unwrap());
        qm.add_to_requeued("https://a.test").await.unwrap();
        assert!(qm.is_requeued("https://a.test").await.unwrap());
        qm.remove_from_requeued("https://a.test").await.unwrap();
        assert!(!qm.is_requeued("https://a.test").await.unwrap());
    }

    #[tokio::test]
    async fn is_url_seen_checks_pending_set_too() {
        let qm = manager();
        qm.add_to_pending(QueueItem::seed("https://a.test")).await.unwrap();
        // Not popped yet, but it is "seen" in the sense of already enqueued.
        assert!(qm.is_url_seen("https://a.test").await.unwrap());
    }
}
