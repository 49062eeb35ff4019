//! Message Publisher (§4.4): an asynchronous Kafka producer exposing an
//! input channel and internally running the success/error stream
//! handlers the crawler would otherwise start as two long-lived tasks.
//!
//! Grounded on `riptide-fetch::fetch::ReliableHttpClient`'s retry/circuit
//! shape for the overall "reliable async client" structure, adapted here
//! to rdkafka's `FutureProducer` since no example crate ships a message
//! bus producer.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, Headers, OwnedHeaders, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use sneakdex_types::ports::{MessageBus, PublishOutcome, RequeueDecision, RequeuePolicy};
use sneakdex_types::{Metrics, ProducerRecord, QueueItem, Result, SneakdexError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const METADATA_HEADER: &str = "queue-item";
const METADATA_REFRESH: Duration = Duration::from_secs(10 * 60);
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub brokers: String,
    pub topic: String,
    pub retry_max: u32,
    pub max_content_size: usize,
    pub channel_capacity: usize,
    pub offer_timeout: Duration,
}

impl PublisherConfig {
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            retry_max: 3,
            max_content_size: 10 * 1024 * 1024,
            channel_capacity: 1024,
            offer_timeout: Duration::from_millis(100),
        }
    }
}

/// Kafka-backed [`MessageBus`] implementation.
///
/// `new` spawns the dispatch task (drains the input channel and calls
/// `FutureProducer::send`) plus the success- and error-stream handlers
/// described in §4.4; all three exit when the input channel is dropped
/// or `close()` is called.
pub struct KafkaPublisher {
    input_tx: Mutex<Option<mpsc::Sender<ProducerRecord>>>,
    max_content_size: usize,
    closed: Arc<AtomicBool>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
}

impl KafkaPublisher {
    pub fn new(
        config: PublisherConfig,
        metrics: Arc<Metrics>,
        requeue: Arc<dyn RequeuePolicy>,
    ) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "1") // leader/local, per configuration contract
            .set("compression.type", "snappy")
            .set("batch.size", "1048576") // 1 MiB
            .set("batch.num.messages", "100")
            .set("linger.ms", "100")
            .set("message.max.bytes", config.max_content_size.to_string())
            .set("message.send.max.retries", config.retry_max.to_string())
            .set(
                "topic.metadata.refresh.interval.ms",
                METADATA_REFRESH.as_millis().to_string(),
            )
            .create()
            .map_err(|e| SneakdexError::Publish(format!("failed to create producer: {e}")))?;

        let (input_tx, input_rx) = mpsc::channel(config.channel_capacity);
        let (success_tx, success_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let dispatch_handle = tokio::spawn(dispatch_loop(
            producer,
            config.topic.clone(),
            input_rx,
            success_tx,
            error_tx,
        ));
        tokio::spawn(success_stream_handler(success_rx, metrics.clone()));
        tokio::spawn(error_stream_handler(error_rx, metrics, requeue));

        Ok(Self {
            input_tx: Mutex::new(Some(input_tx)),
            max_content_size: config.max_content_size,
            closed,
            dispatch_handle: Mutex::new(Some(dispatch_handle)),
        })
    }
}

#[async_trait]
impl MessageBus for KafkaPublisher {
    async fn publish(&self, record: ProducerRecord) -> Result<PublishOutcome> {
        if record.value.len() > self.max_content_size {
            return Err(SneakdexError::Publish(
                "payload exceeds MaxContentSize".into(),
            ));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(SneakdexError::Publish("producer is closed".into()));
        }

        let tx = match self.input_tx.lock().await.as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(SneakdexError::Publish("producer is closed".into())),
        };

        match tx.try_send(record) {
            Ok(()) => Ok(PublishOutcome::Accepted),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SneakdexError::Publish("producer channel closed".into()))
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                let wait =
                    tokio::time::timeout(Duration::from_millis(100), tx.send(record)).await;
                match wait {
                    Ok(Ok(())) => Ok(PublishOutcome::Accepted),
                    _ => Ok(PublishOutcome::Backpressure),
                }
            }
        }
    }

    fn input_channel_has_capacity(&self) -> bool {
        match self.input_tx.try_lock() {
            Ok(guard) => guard.as_ref().map(|tx| tx.capacity() > 0).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Flushes in-flight records and closes the streams (§4.4): drops
    /// the input sender so `dispatch_loop` drains whatever is already
    /// buffered and exits on its own, then joins it under a bounded
    /// deadline.
    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.input_tx.lock().await.take();

        let handle = self.dispatch_handle.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "dispatch loop task panicked during close"),
                Err(_) => warn!("dispatch loop did not drain within the close deadline"),
            }
        }
        Ok(())
    }
}

struct PublishSuccess {
    url: String,
    depth: u32,
}

struct PublishFailure {
    item: QueueItem,
    error: String,
}

async fn dispatch_loop(
    producer: FutureProducer,
    topic: String,
    mut input_rx: mpsc::Receiver<ProducerRecord>,
    success_tx: mpsc::UnboundedSender<PublishSuccess>,
    error_tx: mpsc::UnboundedSender<PublishFailure>,
) {
    while let Some(record) = input_rx.recv().await {
        let metadata_bytes = match serde_json::to_vec(&record.user_metadata) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %record.key, error = %e, "failed to serialize queue item metadata");
                continue;
            }
        };
        let headers = OwnedHeaders::new().insert(Header {
            key: METADATA_HEADER,
            value: Some(&metadata_bytes),
        });

        let future_record: FutureRecord<'_, str, [u8]> = FutureRecord::to(&topic)
            .key(&record.key)
            .payload(&record.value[..])
            .headers(headers)
            .timestamp(record.timestamp.timestamp_millis());

        match producer.send(future_record, Duration::from_secs(0)).await {
            Ok(_) => {
                let _ = success_tx.send(PublishSuccess {
                    url: record.user_metadata.url.clone(),
                    depth: record.user_metadata.depth,
                });
            }
            Err((error, _owned)) => {
                let _ = error_tx.send(PublishFailure {
                    item: record.user_metadata,
                    error: error.to_string(),
                });
            }
        }
    }
}

async fn success_stream_handler(
    mut success_rx: mpsc::UnboundedReceiver<PublishSuccess>,
    metrics: Arc<Metrics>,
) {
    while let Some(success) = success_rx.recv().await {
        metrics.kafka_successful.fetch_add(1, Ordering::Relaxed);
        debug!(url = %success.url, depth = success.depth, "published to kafka");
    }
}

async fn error_stream_handler(
    mut error_rx: mpsc::UnboundedReceiver<PublishFailure>,
    metrics: Arc<Metrics>,
    requeue: Arc<dyn RequeuePolicy>,
) {
    while let Some(failure) = error_rx.recv().await {
        let retriable = sneakdex_types::error::classify_retriable(&failure.error);
        let url = failure.item.url.clone();

        if retriable {
            let decision = match requeue.decide(&url).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(url = %url, error = %e, "requeue decision failed");
                    metrics.kafka_errored.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            if let Err(e) = requeue.apply(decision, failure.item).await {
                warn!(url = %url, error = %e, "failed to apply requeue decision");
                metrics.kafka_errored.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            if let Err(e) = requeue.apply(RequeueDecision::GiveUp, failure.item).await {
                warn!(url = %url, error = %e, "failed to mark visited after permanent publish error");
            }
            metrics.kafka_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Recovers the [`QueueItem`] a failed message carried as a header, used
/// when wiring a raw `OwnedMessage` from outside the dispatch loop (e.g.
/// integration tests against a real broker).
pub fn recover_metadata(message: &OwnedMessage) -> Option<QueueItem> {
    let headers = message.headers()?;
    for i in 0..headers.count() {
        let header = headers.get(i);
        if header.key == METADATA_HEADER {
            let value = header.value?;
            return serde_json::from_slice(value).ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysRequeue;

    #[async_trait]
    impl RequeuePolicy for AlwaysRequeue {
        async fn decide(&self, _url: &str) -> Result<RequeueDecision> {
            Ok(RequeueDecision::Requeue)
        }
        async fn apply(&self, _decision: RequeueDecision, _item: QueueItem) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn publisher_config_defaults_match_contract() {
        let cfg = PublisherConfig::new("localhost:9092", "html");
        assert_eq!(cfg.retry_max, 3);
        assert_eq!(cfg.offer_timeout, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn error_stream_requeues_retriable_failures() {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(Metrics::new());
        let requeue: Arc<dyn RequeuePolicy> = Arc::new(AlwaysRequeue);

        let handle = tokio::spawn(error_stream_handler(error_rx, metrics.clone(), requeue));
        error_tx
            .send(PublishFailure {
                item: QueueItem::seed("https://a.test"),
                error: "operation timeout".to_string(),
            })
            .unwrap();
        drop(error_tx);
        handle.await.unwrap();
        assert_eq!(metrics.kafka_failed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn error_stream_marks_visited_on_permanent_failure() {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(Metrics::new());
        let requeue: Arc<dyn RequeuePolicy> = Arc::new(AlwaysRequeue);

        let handle = tokio::spawn(error_stream_handler(error_rx, metrics.clone(), requeue));
        error_tx
            .send(PublishFailure {
                item: QueueItem::seed("https://a.test"),
                error: "payload too large".to_string(),
            })
            .unwrap();
        drop(error_tx);
        handle.await.unwrap();
        assert_eq!(metrics.kafka_failed.load(Ordering::Relaxed), 1);
    }
}
