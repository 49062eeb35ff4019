//! Metrics & Monitor (§4.7): atomic counters already live on
//! [`sneakdex_types::Metrics`]; this crate adds the Prometheus gauge
//! mirror, the periodic structured logger, and the `/health` +
//! `/metrics` HTTP server.
//!
//! Grounded on `riptide-api`'s `Registry`/`Counter`/`GaugeVec` usage
//! (`riptide-api::metrics`) for the Prometheus wiring, and on
//! `riptide-workers::metrics::WorkerMetrics` for the atomics-plus-
//! periodic-logger shape.

mod gauges;
mod routes;

use gauges::Gauges;
use sneakdex_queue::QueueStatsSource;
use sneakdex_types::ports::{KvStore, MessageBus};
use sneakdex_types::{Metrics, ShutdownSignal};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const SYNC_INTERVAL: Duration = Duration::from_secs(5);
const LOG_INTERVAL: Duration = Duration::from_secs(10);
const HEALTH_PING_TIMEOUT: Duration = Duration::from_millis(500);

pub struct Monitor {
    metrics: Arc<Metrics>,
    kv: Arc<dyn KvStore>,
    bus: Arc<dyn MessageBus>,
    queue_stats: Arc<dyn QueueStatsSource>,
    gauges: Gauges,
}

impl Monitor {
    pub fn new(
        metrics: Arc<Metrics>,
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        queue_stats: Arc<dyn QueueStatsSource>,
    ) -> sneakdex_types::Result<Arc<Self>> {
        let gauges = Gauges::new().map_err(|e| {
            sneakdex_types::SneakdexError::custom(format!("failed to build registry: {e}"))
        })?;
        Ok(Arc::new(Self {
            metrics,
            kv,
            bus,
            queue_stats,
            gauges,
        }))
    }

    /// Copies atomics into Prometheus gauges (§4.7 "sync" step). Called
    /// synchronously before every `/metrics` response and on a 5 s
    /// background tick.
    async fn sync(&self) {
        let snapshot = self.metrics.snapshot();
        self.gauges.update_counters(&snapshot);

        match self.queue_stats.queue_stats().await {
            Ok(stats) => self.gauges.update_queue_depths(&stats),
            Err(e) => error!(error = %e, "failed to read queue stats for /metrics"),
        }
    }

    async fn health_report(&self) -> sneakdex_types::HealthReport {
        let kv_ok = tokio::time::timeout(HEALTH_PING_TIMEOUT, self.kv.ping())
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        let bus_ok = self.bus.input_channel_has_capacity();
        sneakdex_types::HealthReport::from_dependencies(kv_ok, bus_ok)
    }

    fn render_prometheus_text(&self) -> String {
        self.gauges.encode()
    }

    /// Background 5 s gauge sync (§4.7).
    pub fn spawn_sync_task(self: &Arc<Self>, mut shutdown: ShutdownSignal) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SYNC_INTERVAL);
            loop {
                tokio::select! {
                    _ = tick.tick() => this.sync().await,
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    /// 10 s structured snapshot log including `pages_per_second` (§4.7).
    pub fn spawn_logger_task(self: &Arc<Self>, mut shutdown: ShutdownSignal) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(LOG_INTERVAL);
            let mut last_processed = this.metrics.pages_processed();
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let snapshot = this.metrics.snapshot();
                        let pages_per_second =
                            (snapshot.pages_processed.saturating_sub(last_processed)) as f64
                                / LOG_INTERVAL.as_secs_f64();
                        last_processed = snapshot.pages_processed;
                        info!(
                            pages_processed = snapshot.pages_processed,
                            pages_successful = snapshot.pages_successful,
                            pages_failed = snapshot.pages_failed,
                            pages_nonhtml_skipped = snapshot.pages_nonhtml_skipped,
                            pages_aborted = snapshot.pages_aborted,
                            inflight_pages = snapshot.inflight_pages,
                            kafka_successful = snapshot.kafka_successful,
                            kafka_failed = snapshot.kafka_failed,
                            redis_errored = snapshot.redis_errored,
                            uptime_seconds = snapshot.uptime_seconds,
                            pages_per_second,
                            "crawler metrics snapshot"
                        );
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    /// Starts the `/health` + `/metrics` HTTP server; resolves when the
    /// shutdown signal fires.
    pub async fn serve(self: Arc<Self>, addr: SocketAddr, mut shutdown: ShutdownSignal) {
        let router = routes::router(self.clone());
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, %addr, "failed to bind monitor server");
                return;
            }
        };
        info!(%addr, "monitor server listening");

        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "monitor server exited with error");
        }
    }
}
