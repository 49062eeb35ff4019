//! Redis adapter implementing [`sneakdex_types::ports::KvStore`].
//!
//! Mirrors `riptide-workers::queue::JobQueue`'s connection handling: a
//! single multiplexed async connection shared behind `Clone`, every
//! call wrapped in [`sneakdex_utils::RetryPolicy`] and a deadline.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use sneakdex_types::ports::KvStore;
use sneakdex_types::{Metrics, Result, SneakdexError};
use sneakdex_utils::RetryPolicy;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Redis-backed KV store with a bounded per-call deadline and the
/// client's own retry policy (§4.3 "Failure semantics").
#[derive(Clone)]
pub struct RedisKvStore {
    conn: MultiplexedConnection,
    timeout: Duration,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl RedisKvStore {
    pub async fn connect(
        redis_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| SneakdexError::Kv(format!("failed to create client: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SneakdexError::Kv(format!("failed to connect: {e}")))?;
        Ok(Self {
            conn,
            timeout,
            retry,
            metrics,
        })
    }

    /// Runs one Redis command under the client's retry policy (§4.3
    /// "the underlying client's own retry policy"), each attempt bounded
    /// by `timeout`. Records every attempt's outcome in `redis_errored`
    /// and the call's final outcome in `redis_successful`/`redis_failed`.
    async fn call<T, F, Fut>(&self, make_fut: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, redis::RedisError>>,
    {
        let result = self
            .retry
            .execute(|| async {
                let outcome = tokio::time::timeout(self.timeout, make_fut())
                    .await
                    .unwrap_or_else(|_| {
                        Err(redis::RedisError::from(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "operation timed out",
                        )))
                    });
                if outcome.is_err() {
                    self.metrics.redis_errored.fetch_add(1, Ordering::Relaxed);
                }
                outcome
            })
            .await;

        match &result {
            Ok(_) => self.metrics.redis_successful.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.metrics.redis_failed.fetch_add(1, Ordering::Relaxed),
        };
        result.map_err(|e: redis::RedisError| SneakdexError::Kv(e.to_string()))
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn list_push_back(&self, key: &str, value: &[u8]) -> Result<()> {
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            let value = value.to_vec();
            async move { conn.rpush::<_, _, ()>(&key, value).await }
        })
        .await
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            async move { conn.lpop(&key, None).await }
        })
        .await
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            async move { conn.llen(&key).await }
        })
        .await
    }

    async fn list_delete_if_empty(&self, key: &str) -> Result<()> {
        let len = self.list_len(key).await?;
        if len == 0 {
            self.call(|| {
                let mut conn = self.conn.clone();
                let key = key.to_string();
                async move { conn.del::<_, ()>(&key).await }
            })
            .await?;
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let added: i64 = self
            .call(|| {
                let mut conn = self.conn.clone();
                let key = key.to_string();
                let member = member.to_string();
                async move { conn.sadd(&key, &member).await }
            })
            .await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            let member = member.to_string();
            async move { conn.srem::<_, _, ()>(&key, &member).await }
        })
        .await
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            let member = member.to_string();
            async move { conn.sismember(&key, &member).await }
        })
        .await
    }

    async fn set_sample(&self, key: &str, count: usize) -> Result<Vec<String>> {
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            async move { conn.srandmember_multiple(&key, count).await }
        })
        .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            async move { conn.smembers(&key).await }
        })
        .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl_secs = ttl.as_secs().max(1);
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            let value = value.to_string();
            async move { conn.set_ex::<_, _, ()>(&key, &value, ttl_secs).await }
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.call(|| {
            let mut conn = self.conn.clone();
            let key = key.to_string();
            async move { conn.exists(&key).await }
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        match tokio::time::timeout(Duration::from_millis(500), async move {
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        })
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                warn!("redis ping failed: {e}");
                Err(SneakdexError::Kv(e.to_string()))
            }
            Err(_) => {
                warn!("redis ping timed out");
                Err(SneakdexError::Kv("ping timed out".into()))
            }
        }
    }
}
