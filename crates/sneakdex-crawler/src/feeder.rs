//! Queue Feeder (§4.6): the single long-running task that drains the
//! pending queue and dispatches items into the Fetcher.
//!
//! Grounded on `riptide-workers`'s worker-loop shape (tick timer +
//! termination check before the next pop), generalized to the
//! breadth-first pending queue and the five-consecutive-empty-tick
//! exit rule.

use sneakdex_fetch::Fetcher;
use sneakdex_queue::QueueManager;
use sneakdex_types::ports::KvStore;
use sneakdex_types::{Metrics, ShutdownSignal};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const TICK_INTERVAL: Duration = Duration::from_millis(200);
const DRAIN_INTERVAL: Duration = Duration::from_secs(2 * 60);
const DRAIN_POLL: Duration = Duration::from_millis(100);
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);
const EMPTY_TICK_THRESHOLD: u32 = 5;

pub struct QueueFeeder<K: KvStore> {
    queue: Arc<QueueManager<K>>,
    fetcher: Arc<Fetcher<K>>,
    metrics: Arc<Metrics>,
    max_pages: u64,
    shutdown: ShutdownSignal,
}

impl<K: KvStore + 'static> QueueFeeder<K> {
    pub fn new(
        queue: Arc<QueueManager<K>>,
        fetcher: Arc<Fetcher<K>>,
        metrics: Arc<Metrics>,
        max_pages: u64,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            queue,
            fetcher,
            metrics,
            max_pages,
            shutdown,
        }
    }

    /// Runs until cancelled or the termination condition (§4.6) holds;
    /// resolves naturally when the queue has drained with nothing in
    /// flight, which the Orchestrator treats the same as a signal.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        let mut drain_tick = tokio::time::interval(DRAIN_INTERVAL);
        let mut empty_ticks: u32 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.should_exit(empty_ticks) {
                        break;
                    }

                    match self.queue.remove_from_pending().await {
                        Ok(Some(item)) => {
                            empty_ticks = 0;
                            self.fetcher.visit(item);
                        }
                        Ok(None) => {
                            empty_ticks += 1;
                            if should_exit_on_empty(
                                empty_ticks,
                                self.metrics.pages_processed(),
                                self.max_pages,
                                self.shutdown.is_cancelled(),
                                self.metrics.inflight(),
                            ) {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "queue pop failed, will retry next tick");
                        }
                    }
                }
                _ = drain_tick.tick() => {
                    self.drain().await;
                }
                _ = self.shutdown.cancelled() => {
                    self.drain().await;
                    break;
                }
            }
        }
        info!("queue feeder exited");
    }

    fn should_exit(&self, empty_ticks: u32) -> bool {
        self.shutdown.is_cancelled()
            || self.metrics.pages_processed() >= self.max_pages
            || should_exit_on_empty(
                empty_ticks,
                self.metrics.pages_processed(),
                self.max_pages,
                self.shutdown.is_cancelled(),
                self.metrics.inflight(),
            )
    }

    /// Synchronous wait for in-flight fetches to settle (§4.6: "prevent
    /// memory growth under slow-start scenarios"), bounded so a stuck
    /// fetch can't wedge the feeder forever.
    async fn drain(&self) {
        if self.metrics.inflight() == 0 {
            return;
        }
        debug!(inflight = self.metrics.inflight(), "feeder draining in-flight fetches");
        let deadline = tokio::time::Instant::now() + DRAIN_DEADLINE;
        while self.metrics.inflight() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

/// §4.6 step 2's termination predicate, pulled out so it can be checked
/// without spinning up a full Fetcher: empty for `EMPTY_TICK_THRESHOLD`
/// consecutive ticks AND (max pages reached OR cancelled OR nothing in
/// flight).
fn should_exit_on_empty(
    empty_ticks: u32,
    pages_processed: u64,
    max_pages: u64,
    cancelled: bool,
    inflight: i64,
) -> bool {
    empty_ticks >= EMPTY_TICK_THRESHOLD
        && (pages_processed >= max_pages || cancelled || inflight == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_alive_below_empty_tick_threshold() {
        assert!(!should_exit_on_empty(4, 0, 100, false, 5));
    }

    #[test]
    fn exits_when_empty_and_nothing_inflight() {
        assert!(should_exit_on_empty(5, 0, 100, false, 0));
    }

    #[test]
    fn exits_when_empty_and_max_pages_reached() {
        assert!(should_exit_on_empty(5, 100, 100, false, 3));
    }

    #[test]
    fn exits_when_empty_and_cancelled() {
        assert!(should_exit_on_empty(5, 0, 100, true, 3));
    }

    #[test]
    fn keeps_ticking_when_empty_but_work_still_inflight() {
        assert!(!should_exit_on_empty(5, 0, 100, false, 3));
    }
}
