//! Per-domain rate limiting using the `governor` crate (§4.5
//! `RequestDelay`).
//!
//! The fetcher keeps one limiter per host so a slow domain never starves
//! concurrency budget meant for others.

use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type HostLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// One rate limiter per host, created lazily on first sight of a domain.
pub struct PerDomainRateLimiter {
    delay: Duration,
    limiters: DashMap<String, HostLimiter>,
}

impl PerDomainRateLimiter {
    /// `delay` is the minimum spacing between two requests to the same
    /// host (§6 `REQUEST_DELAY`, default 100ms).
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            limiters: DashMap::new(),
        }
    }

    /// Waits until the per-domain delay permits the next request to
    /// `host`. Cancellation-aware callers should race this against the
    /// shutdown signal (§5 suspension points).
    pub async fn wait(&self, host: &str) {
        if self.delay.is_zero() {
            return;
        }
        let limiter = self.limiter_for(host);
        limiter.until_ready().await;
        debug!(host, "per-domain rate limit permit acquired");
    }

    fn limiter_for(&self, host: &str) -> HostLimiter {
        if let Some(existing) = self.limiters.get(host) {
            return existing.clone();
        }
        // One request per `delay` interval == rate = 1 / delay.
        let per_second = (1000.0 / self.delay.as_millis().max(1) as f64).ceil() as u32;
        let quota = Quota::with_period(self.delay)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(per_second.max(1)).unwrap()));
        let limiter: HostLimiter = Arc::new(RateLimiter::direct(quota));
        self.limiters
            .entry(host.to_string())
            .or_insert(limiter)
            .clone()
    }

    pub fn known_hosts(&self) -> usize {
        self.limiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_request_to_a_host_does_not_wait_long() {
        let limiter = PerDomainRateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.wait("a.test").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn zero_delay_never_waits() {
        let limiter = PerDomainRateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        limiter.wait("a.test").await;
        limiter.wait("a.test").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn separate_hosts_get_separate_limiters() {
        let limiter = PerDomainRateLimiter::new(Duration::from_millis(20));
        limiter.wait("a.test").await;
        limiter.wait("b.test").await;
        assert_eq!(limiter.known_hosts(), 2);
    }
}
