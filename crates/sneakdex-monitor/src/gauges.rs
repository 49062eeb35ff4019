//! Prometheus gauge/counter mirror of [`sneakdex_types::MetricsSnapshot`]
//! plus a depth-labeled queue-depth vector.
//!
//! Grounded on `riptide-api::metrics::RipTideMetrics`'s use of
//! `Registry`/`Counter`/`GaugeVec` and `TextEncoder`.

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use sneakdex_queue::QueueStats;
use sneakdex_types::MetricsSnapshot;

pub struct Gauges {
    registry: Registry,
    pages_processed: Gauge,
    pages_successful: Gauge,
    pages_failed: Gauge,
    pages_nonhtml_skipped: Gauge,
    pages_aborted: Gauge,
    kafka_successful: Gauge,
    kafka_failed: Gauge,
    kafka_errored: Gauge,
    redis_successful: Gauge,
    redis_failed: Gauge,
    redis_errored: Gauge,
    inflight_pages: Gauge,
    uptime_seconds: Gauge,
    queue_depth: GaugeVec,
}

impl Gauges {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        macro_rules! counter_gauge {
            ($name:literal, $help:literal) => {{
                let g = Gauge::with_opts(Opts::new($name, $help))?;
                registry.register(Box::new(g.clone()))?;
                g
            }};
        }

        let pages_processed =
            counter_gauge!("sneakdex_pages_processed_total", "total pages processed");
        let pages_successful = counter_gauge!(
            "sneakdex_pages_successful_total",
            "pages fetched and published successfully"
        );
        let pages_failed =
            counter_gauge!("sneakdex_pages_failed_total", "pages that failed permanently");
        let pages_nonhtml_skipped = counter_gauge!(
            "sneakdex_pages_nonhtml_skipped_total",
            "pages skipped because the response was not HTML"
        );
        let pages_aborted =
            counter_gauge!("sneakdex_pages_aborted_total", "pages aborted mid-fetch");
        let kafka_successful = counter_gauge!(
            "sneakdex_kafka_successful_total",
            "records the publisher confirmed delivered"
        );
        let kafka_failed = counter_gauge!(
            "sneakdex_kafka_failed_total",
            "records abandoned after exhausting the requeue policy"
        );
        let kafka_errored =
            counter_gauge!("sneakdex_kafka_errored_total", "producer dispatch errors");
        let redis_successful =
            counter_gauge!("sneakdex_redis_successful_total", "successful KV operations");
        let redis_failed = counter_gauge!("sneakdex_redis_failed_total", "failed KV operations");
        let redis_errored = counter_gauge!("sneakdex_redis_errored_total", "KV operation errors");
        let inflight_pages = counter_gauge!(
            "sneakdex_inflight_pages",
            "fetches currently in flight"
        );
        let uptime_seconds =
            counter_gauge!("sneakdex_uptime_seconds", "seconds since process start");

        let queue_depth = GaugeVec::new(
            Opts::new("sneakdex_queue_depth", "pending queue length by crawl depth"),
            &["depth"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            pages_processed,
            pages_successful,
            pages_failed,
            pages_nonhtml_skipped,
            pages_aborted,
            kafka_successful,
            kafka_failed,
            kafka_errored,
            redis_successful,
            redis_failed,
            redis_errored,
            inflight_pages,
            uptime_seconds,
            queue_depth,
        })
    }

    pub fn update_counters(&self, snapshot: &MetricsSnapshot) {
        self.pages_processed.set(snapshot.pages_processed as f64);
        self.pages_successful.set(snapshot.pages_successful as f64);
        self.pages_failed.set(snapshot.pages_failed as f64);
        self.pages_nonhtml_skipped
            .set(snapshot.pages_nonhtml_skipped as f64);
        self.pages_aborted.set(snapshot.pages_aborted as f64);
        self.kafka_successful.set(snapshot.kafka_successful as f64);
        self.kafka_failed.set(snapshot.kafka_failed as f64);
        self.kafka_errored.set(snapshot.kafka_errored as f64);
        self.redis_successful.set(snapshot.redis_successful as f64);
        self.redis_failed.set(snapshot.redis_failed as f64);
        self.redis_errored.set(snapshot.redis_errored as f64);
        self.inflight_pages.set(snapshot.inflight_pages as f64);
        self.uptime_seconds.set(snapshot.uptime_seconds as f64);
    }

    pub fn update_queue_depths(&self, stats: &QueueStats) {
        for (depth, len) in &stats.depth_lengths {
            self.queue_depth
                .with_label_values(&[&depth.to_string()])
                .set(*len as f64);
        }
    }

    pub fn encode(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .expect("prometheus text encoding is infallible for well-formed registries");
        String::from_utf8(buffer).expect("prometheus text encoder always emits valid utf8")
    }
}
