//! Fetcher (§4.5): bounded-concurrency HTTP scraper driving the hook
//! state machine `Requested -> (Aborted | ResponseReceived) ->
//! (NonHtml | HtmlBodyExtracted) -> (PublishEnqueued | PublishRejected)
//! -> MarkedVisited`.
//!
//! Grounded on `riptide-fetch::fetch::ReliableHttpClient` for the
//! reqwest client construction and retry/circuit shape, generalized
//! here to the crawler's own per-domain rate limiting and breaker map
//! instead of a single global breaker.

use crate::links::extract_hrefs;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue};
use sneakdex_queue::QueueManager;
use sneakdex_types::ports::{KvStore, MessageBus, PublishOutcome, RequeueDecision, RequeuePolicy};
use sneakdex_types::{Metrics, ProducerRecord, QueueItem, ShutdownSignal};
use sneakdex_url::UrlValidator;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use sneakdex_utils::{CircuitBreaker, PerDomainRateLimiter, RealClock};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

const BLOCKED_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".css", ".js", ".ico", ".svg", ".woff", ".ttf",
    ".mp4", ".mp3", ".zip", ".exe",
];

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub max_concurrency: usize,
    pub request_delay: Duration,
    pub request_timeout: Duration,
    pub max_pages: u64,
    pub crawl_depth: u32,
    pub kafka_topic: String,
    pub enable_debug: bool,
}

fn is_blocked_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    BLOCKED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("SneakDex/1.0")),
    );
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br"),
    );
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert(reqwest::header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("Keep-Alive", HeaderValue::from_static("timeout=5, max=1000"));
    headers.insert(
        "Upgrade-Insecure-Requests",
        HeaderValue::from_static("1"),
    );
    headers
}

/// Owns the bounded HTTP worker pool and the hook state machine for one
/// page visit at a time, generic over the backing KV store so it can
/// run against the real Redis adapter or an in-memory fake in tests.
pub struct Fetcher<K: KvStore> {
    client: reqwest::Client,
    config: FetcherConfig,
    semaphore: Arc<Semaphore>,
    rate_limiter: PerDomainRateLimiter,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    validator: Arc<UrlValidator>,
    queue: Arc<QueueManager<K>>,
    bus: Arc<dyn MessageBus>,
    requeue: Arc<dyn RequeuePolicy>,
    metrics: Arc<Metrics>,
    shutdown: ShutdownSignal,
}

impl<K: KvStore + 'static> Fetcher<K> {
    pub fn new(
        config: FetcherConfig,
        validator: Arc<UrlValidator>,
        queue: Arc<QueueManager<K>>,
        bus: Arc<dyn MessageBus>,
        requeue: Arc<dyn RequeuePolicy>,
        metrics: Arc<Metrics>,
        shutdown: ShutdownSignal,
    ) -> sneakdex_types::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(browser_headers(&config.user_agent))
            .build()
            .map_err(|e| sneakdex_types::SneakdexError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            rate_limiter: PerDomainRateLimiter::new(config.request_delay),
            breakers: DashMap::new(),
            validator,
            queue,
            bus,
            requeue,
            metrics,
            config,
            shutdown,
        })
    }

    fn breaker_for(&self, host: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(host.to_string())
            .or_insert_with(|| CircuitBreaker::new(Default::default(), Arc::new(RealClock)))
            .clone()
    }

    /// Acquires a concurrency permit and spawns the visit so the caller
    /// (the Queue Feeder) is never blocked on one page's full lifecycle.
    pub fn visit(self: &Arc<Self>, item: QueueItem) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let permit = match this.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            this.run_visit(item).await;
            drop(permit);
        });
    }

    async fn run_visit(&self, item: QueueItem) {
        // On Request.
        if self.shutdown.is_cancelled() {
            return;
        }
        if self.metrics.pages_processed() >= self.config.max_pages {
            return;
        }
        if is_blocked_extension(&item.url) {
            self.metrics.pages_aborted.fetch_add(1, Ordering::Relaxed);
            let _ = self.queue.mark_visited(&item.url).await;
            return;
        }

        let Ok(parsed) = Url::parse(&item.url) else {
            self.metrics.pages_aborted.fetch_add(1, Ordering::Relaxed);
            let _ = self.queue.mark_visited(&item.url).await;
            return;
        };
        let host = parsed.host_str().unwrap_or_default().to_string();

        self.rate_limiter.wait(&host).await;
        if self.shutdown.is_cancelled() {
            return;
        }

        let breaker = self.breaker_for(&host);
        if breaker.try_acquire().is_err() {
            debug!(url = %item.url, "circuit open for host, skipping");
            self.metrics.pages_aborted.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.metrics.incr_inflight();
        let result = self.client.get(item.url.clone()).send().await;

        // On Response (header stage).
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                breaker.on_failure();
                self.handle_transport_error(&item, &e.to_string()).await;
                return;
            }
        };
        breaker.on_success();

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.contains("text/html") {
            self.metrics
                .pages_nonhtml_skipped
                .fetch_add(1, Ordering::Relaxed);
            let _ = self.queue.mark_visited(&item.url).await;
            self.metrics.decr_inflight();
            return;
        }

        // On HTML body (post-Response).
        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(_) => {
                self.metrics.pages_failed.fetch_add(1, Ordering::Relaxed);
                let _ = self.queue.mark_visited(&item.url).await;
                self.metrics.decr_inflight();
                return;
            }
        };

        if !status.is_success() {
            self.metrics.pages_failed.fetch_add(1, Ordering::Relaxed);
            let _ = self.queue.mark_visited(&item.url).await;
            self.metrics.decr_inflight();
            return;
        }

        self.metrics.pages_processed.fetch_add(1, Ordering::Relaxed);

        self.extract_and_enqueue_links(&parsed, &bytes, item.depth)
            .await;

        self.publish_and_resolve(&item, bytes).await;
        self.metrics.decr_inflight();
    }

    async fn publish_and_resolve(&self, item: &QueueItem, body: Bytes) {
        let record = ProducerRecord {
            topic: self.config.kafka_topic.clone(),
            key: item.url.clone(),
            value: body,
            timestamp: Utc::now(),
            user_metadata: item.clone(),
        };

        match self.bus.publish(record).await {
            Ok(PublishOutcome::Accepted) => {
                self.metrics.pages_successful.fetch_add(1, Ordering::Relaxed);
                let _ = self.queue.mark_visited(&item.url).await;
            }
            Ok(PublishOutcome::Backpressure) | Err(_) => {
                self.apply_inline_requeue(item).await;
            }
        }
    }

    async fn apply_inline_requeue(&self, item: &QueueItem) {
        let decision = match self.requeue.decide(&item.url).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(url = %item.url, error = %e, "requeue decision failed");
                RequeueDecision::GiveUp
            }
        };
        if let Err(e) = self.requeue.apply(decision, item.clone()).await {
            warn!(url = %item.url, error = %e, "failed to apply inline requeue");
        }
    }

    async fn handle_transport_error(&self, item: &QueueItem, error: &str) {
        let network_like = sneakdex_types::error::classify_retriable(error);
        if network_like || self.config.enable_debug {
            debug!(url = %item.url, error, "transport error");
        } else {
            warn!(url = %item.url, error, "fetch error");
        }
        self.metrics.pages_failed.fetch_add(1, Ordering::Relaxed);
        let _ = self.queue.mark_visited(&item.url).await;
        self.metrics.decr_inflight();
    }

    async fn extract_and_enqueue_links(&self, base: &Url, body: &Bytes, parent_depth: u32) {
        if parent_depth + 1 > self.config.crawl_depth {
            return;
        }
        let Ok(text) = std::str::from_utf8(body) else {
            return;
        };

        for href in extract_hrefs(text) {
            let Ok(resolved) = base.join(&href) else {
                continue;
            };
            let resolved = resolved.to_string();

            let resolver = sneakdex_url::system_resolve;
            let (normalized, ok) = self.validator.validate(&resolved, resolver).await;
            if !ok {
                continue;
            }
            let Some(normalized) = normalized else {
                continue;
            };

            match self.queue.is_url_seen(&normalized).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(url = %normalized, error = %e, "seen-check failed, skipping link");
                    continue;
                }
            }

            let child = QueueItem::new(normalized, parent_depth + 1);
            if let Err(e) = self.queue.add_to_pending(child).await {
                warn!(error = %e, "failed to enqueue extracted link");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashSet;
    use sneakdex_types::shutdown_channel;
    use sneakdex_url::ValidatorConfig;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn blocks_known_binary_extensions() {
        assert!(is_blocked_extension("https://a.test/file.pdf"));
        assert!(is_blocked_extension("https://a.test/IMAGE.JPG"));
        assert!(is_blocked_extension("https://a.test/app.js?v=2"));
        assert!(!is_blocked_extension("https://a.test/page"));
    }

    #[test]
    fn browser_headers_include_required_fields() {
        let headers = browser_headers("SneakDex/1.0");
        assert!(headers.contains_key(reqwest::header::ACCEPT));
        assert!(headers.contains_key(reqwest::header::ACCEPT_LANGUAGE));
        assert!(headers.contains_key(reqwest::header::ACCEPT_ENCODING));
        assert!(headers.contains_key("DNT"));
        assert!(headers.contains_key(reqwest::header::CONNECTION));
        assert!(headers.contains_key("Upgrade-Insecure-Requests"));
    }

    #[derive(Default)]
    struct FakeKv {
        lists: DashMap<String, StdMutex<VecDeque<Vec<u8>>>>,
        sets: DashMap<String, DashSet<String>>,
        strings: DashMap<String, String>,
    }

    #[async_trait]
    impl KvStore for FakeKv {
        async fn list_push_back(&self, key: &str, value: &[u8]) -> sneakdex_types::Result<()> {
            self.lists
                .entry(key.to_string())
                .or_default()
                .lock()
                .unwrap()
                .push_back(value.to_vec());
            Ok(())
        }
        async fn list_pop_front(&self, key: &str) -> sneakdex_types::Result<Option<Vec<u8>>> {
            Ok(self.lists.get(key).and_then(|l| l.lock().unwrap().pop_front()))
        }
        async fn list_len(&self, key: &str) -> sneakdex_types::Result<u64> {
            Ok(self.lists.get(key).map(|l| l.lock().unwrap().len() as u64).unwrap_or(0))
        }
        async fn list_delete_if_empty(&self, key: &str) -> sneakdex_types::Result<()> {
            let empty = self.lists.get(key).map(|l| l.lock().unwrap().is_empty()).unwrap_or(false);
            if empty {
                self.lists.remove(key);
            }
            Ok(())
        }
        async fn set_add(&self, key: &str, member: &str) -> sneakdex_types::Result<bool> {
            Ok(self.sets.entry(key.to_string()).or_default().insert(member.to_string()))
        }
        async fn set_remove(&self, key: &str, member: &str) -> sneakdex_types::Result<()> {
            if let Some(set) = self.sets.get(key) {
                set.remove(member);
            }
            Ok(())
        }
        async fn set_contains(&self, key: &str, member: &str) -> sneakdex_types::Result<bool> {
            Ok(self.sets.get(key).map(|s| s.contains(member)).unwrap_or(false))
        }
        async fn set_sample(&self, key: &str, count: usize) -> sneakdex_types::Result<Vec<String>> {
            Ok(self.sets.get(key).map(|s| s.iter().take(count).map(|v| v.clone()).collect()).unwrap_or_default())
        }
        async fn set_members(&self, key: &str) -> sneakdex_types::Result<Vec<String>> {
            Ok(self.sets.get(key).map(|s| s.iter().map(|v| v.clone()).collect()).unwrap_or_default())
        }
        async fn set_with_ttl(&self, key: &str, value: &str, _ttl: Duration) -> sneakdex_types::Result<()> {
            self.strings.insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn exists(&self, key: &str) -> sneakdex_types::Result<bool> {
            Ok(self.strings.contains_key(key))
        }
        async fn ping(&self) -> sneakdex_types::Result<()> {
            Ok(())
        }
    }

    struct AcceptingBus {
        published: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl MessageBus for AcceptingBus {
        async fn publish(&self, record: ProducerRecord) -> sneakdex_types::Result<PublishOutcome> {
            self.published.lock().unwrap().push(record.key);
            Ok(PublishOutcome::Accepted)
        }
        fn input_channel_has_capacity(&self) -> bool {
            true
        }
        async fn close(&self) -> sneakdex_types::Result<()> {
            Ok(())
        }
    }

    struct NeverRequeue;

    #[async_trait]
    impl RequeuePolicy for NeverRequeue {
        async fn decide(&self, _url: &str) -> sneakdex_types::Result<RequeueDecision> {
            Ok(RequeueDecision::GiveUp)
        }
        async fn apply(&self, _decision: RequeueDecision, _item: QueueItem) -> sneakdex_types::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn visit_publishes_html_and_enqueues_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(r#"<a href="/child">child</a>"#),
            )
            .mount(&server)
            .await;

        let queue = Arc::new(QueueManager::new(Arc::new(FakeKv::default()), 3));
        let validator = Arc::new(UrlValidator::new(ValidatorConfig {
            skip_dns: true,
            ..Default::default()
        }));
        let published = Arc::new(StdMutex::new(Vec::new()));
        let bus: Arc<dyn MessageBus> = Arc::new(AcceptingBus {
            published: published.clone(),
        });
        let requeue: Arc<dyn RequeuePolicy> = Arc::new(NeverRequeue);
        let metrics = Arc::new(Metrics::new());
        let (_handle, signal) = shutdown_channel();

        let config = FetcherConfig {
            user_agent: "SneakDex-Test/1.0".into(),
            max_concurrency: 4,
            request_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            max_pages: 1000,
            crawl_depth: 3,
            kafka_topic: "html".into(),
            enable_debug: false,
        };

        let fetcher = Arc::new(
            Fetcher::new(config, validator, queue.clone(), bus, requeue, metrics.clone(), signal)
                .unwrap(),
        );

        let root = server.uri();
        fetcher.run_visit(QueueItem::seed(root.clone())).await;

        assert_eq!(published.lock().unwrap().len(), 1);
        assert_eq!(metrics.snapshot().pages_successful, 1);
        assert!(queue.is_url_seen(&root).await.unwrap());
    }

    #[tokio::test]
    async fn visit_skips_blocked_extension_without_request() {
        let queue = Arc::new(QueueManager::new(Arc::new(FakeKv::default()), 3));
        let validator = Arc::new(UrlValidator::new(ValidatorConfig::default()));
        let bus: Arc<dyn MessageBus> = Arc::new(AcceptingBus {
            published: Arc::new(StdMutex::new(Vec::new())),
        });
        let requeue: Arc<dyn RequeuePolicy> = Arc::new(NeverRequeue);
        let metrics = Arc::new(Metrics::new());
        let (_handle, signal) = shutdown_channel();

        let config = FetcherConfig {
            user_agent: "SneakDex-Test/1.0".into(),
            max_concurrency: 4,
            request_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            max_pages: 1000,
            crawl_depth: 3,
            kafka_topic: "html".into(),
            enable_debug: false,
        };
        let fetcher = Arc::new(
            Fetcher::new(config, validator, queue.clone(), bus, requeue, metrics, signal).unwrap(),
        );

        let url = "https://a.test/image.png".to_string();
        fetcher.run_visit(QueueItem::seed(url.clone())).await;
        assert!(queue.is_url_seen(&url).await.unwrap());
    }
}
