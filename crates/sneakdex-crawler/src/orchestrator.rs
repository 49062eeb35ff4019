//! Orchestrator (§4.8): wires every subsystem together and owns the
//! single shutdown sequence.
//!
//! Grounded on `riptide-workers::WorkerService`'s `new`/`start`/`stop`
//! shape (construct once, start background tasks, wait, stop exactly
//! once with a bounded timeout).

use crate::feeder::QueueFeeder;
use sneakdex_config::CrawlerConfig;
use sneakdex_fetch::{Fetcher, FetcherConfig};
use sneakdex_monitor::Monitor;
use sneakdex_publisher::{KafkaPublisher, PublisherConfig};
use sneakdex_queue::{QueueManager, QueueRequeuePolicy, RedisKvStore};
use sneakdex_types::ports::{KvStore, MessageBus, RequeuePolicy};
use sneakdex_types::{shutdown_channel, Metrics, QueueItem, ShutdownHandle, ShutdownSignal};
use sneakdex_url::{system_resolve, UrlValidator, ValidatorConfig};
use sneakdex_utils::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct Orchestrator {
    config: CrawlerConfig,
    shutdown_handle: ShutdownHandle,
    shutdown_signal: ShutdownSignal,
    metrics: Arc<Metrics>,
    queue: Arc<QueueManager<RedisKvStore>>,
    bus: Arc<KafkaPublisher>,
    monitor: Arc<Monitor>,
    feeder_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Orchestrator {
    /// Step 1-4 of §4.8: load config (already done by the caller),
    /// construct the KV client, validator, publisher and queue, preload
    /// local caches, and seed the queue with the configured start URLs.
    pub async fn build(config: CrawlerConfig) -> sneakdex_types::Result<Arc<Self>> {
        let (shutdown_handle, shutdown_signal) = shutdown_channel();
        let metrics = Arc::new(Metrics::new());

        let retry = RetryPolicy::new(config.redis_retry_max as usize, 100, 10_000, 2.0);
        let kv = Arc::new(
            RedisKvStore::connect(
                &config.redis_url(),
                config.redis_timeout,
                retry,
                metrics.clone(),
            )
            .await?,
        );
        let queue = Arc::new(QueueManager::new(kv.clone(), config.crawl_depth));
        queue.preload_local_caches().await?;

        let requeue: Arc<dyn RequeuePolicy> = Arc::new(QueueRequeuePolicy::new(queue.clone()));

        let mut publisher_config =
            PublisherConfig::new(config.kafka_brokers.join(","), config.kafka_topic_html.clone());
        publisher_config.retry_max = config.kafka_retry_max;
        publisher_config.max_content_size = config.max_content_size;
        let bus = Arc::new(KafkaPublisher::new(
            publisher_config,
            metrics.clone(),
            requeue.clone(),
        )?);

        let validator = Arc::new(UrlValidator::new(ValidatorConfig {
            whitelist: config.url_whitelist.clone(),
            blacklist: config.url_blacklist.clone(),
            ..Default::default()
        }));

        let fetcher_config = FetcherConfig {
            user_agent: config.user_agent.clone(),
            max_concurrency: config.max_concurrency,
            request_delay: config.request_delay,
            request_timeout: config.request_timeout,
            max_pages: config.max_pages,
            crawl_depth: config.crawl_depth,
            kafka_topic: config.kafka_topic_html.clone(),
            enable_debug: config.enable_debug,
        };
        let fetcher = Arc::new(Fetcher::new(
            fetcher_config,
            validator,
            queue.clone(),
            bus.clone() as Arc<dyn MessageBus>,
            requeue,
            metrics.clone(),
            shutdown_signal.clone(),
        )?);

        let monitor = Monitor::new(
            metrics.clone(),
            kv as Arc<dyn KvStore>,
            bus.clone() as Arc<dyn MessageBus>,
            queue.clone(),
        )?;

        for raw in &config.start_urls {
            match validator.validate(raw, system_resolve).await {
                (Some(normalized), true) => {
                    if let Err(e) = queue.add_to_pending(QueueItem::seed(normalized)).await {
                        warn!(url = raw, error = %e, "failed to seed start URL");
                    }
                }
                _ => warn!(url = raw, "start URL failed validation, skipping"),
            }
        }

        let this = Arc::new(Self {
            config,
            shutdown_handle,
            shutdown_signal: shutdown_signal.clone(),
            metrics,
            queue,
            bus,
            monitor,
            feeder_task: tokio::sync::Mutex::new(None),
        });

        let feeder = QueueFeeder::new(
            this.queue.clone(),
            fetcher,
            this.metrics.clone(),
            this.config.max_pages,
            shutdown_signal,
        );
        *this.feeder_task.lock().await = Some(tokio::spawn(feeder.run()));

        Ok(this)
    }

    /// Step 5-6 of §4.8: start the monitor server and metrics logger,
    /// then wait for either an OS signal or the feeder to exit.
    pub async fn run(self: Arc<Self>) {
        self.monitor.spawn_sync_task(self.shutdown_signal.clone());
        self.monitor.spawn_logger_task(self.shutdown_signal.clone());
        self.spawn_cleanup_task(self.shutdown_signal.clone());
        let monitor_addr = ([0, 0, 0, 0], self.config.monitor_port).into();
        let monitor_handle = tokio::spawn(
            self.monitor
                .clone()
                .serve(monitor_addr, self.shutdown_signal.clone()),
        );

        let feeder_handle = self.feeder_task.lock().await.take();

        tokio::select! {
            _ = wait_for_os_signal() => {
                info!("received shutdown signal");
            }
            _ = async {
                if let Some(handle) = feeder_handle {
                    let _ = handle.await;
                }
            } => {
                info!("queue feeder exited naturally");
            }
        }

        self.shutdown(monitor_handle).await;
    }

    /// `CleanupEmptyQueues()` maintenance sweep (§4.3), run on a slow
    /// tick rather than only on demand.
    fn spawn_cleanup_task(self: &Arc<Self>, mut shutdown: ShutdownSignal) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = this.queue.cleanup_empty_queues().await {
                            warn!(error = %e, "failed to clean up empty queues");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    /// Step 7 of §4.8: a single shutdown sequence bounded by a 10 s
    /// deadline, run exactly once regardless of which wait branch fired.
    async fn shutdown(&self, monitor_handle: tokio::task::JoinHandle<()>) {
        self.shutdown_handle.shutdown();

        let wait = async {
            let _ = monitor_handle.await;
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait).await.is_err() {
            warn!("shutdown timed out waiting for tasks, proceeding anyway");
        }

        if let Err(e) = self.bus.close().await {
            error!(error = %e, "failed to close publisher cleanly");
        }
        info!("orchestrator shutdown complete");
    }
}

async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
