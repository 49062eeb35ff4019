//! Object-safe facade over [`QueueManager::queue_stats`] so the Monitor
//! can hold an `Arc<dyn QueueStatsSource>` without being generic over
//! the KV backend.

use crate::manager::{QueueManager, QueueStats};
use async_trait::async_trait;
use sneakdex_types::ports::KvStore;
use sneakdex_types::Result;

#[async_trait]
pub trait QueueStatsSource: Send + Sync {
    async fn queue_stats(&self) -> Result<QueueStats>;
}

#[async_trait]
impl<K: KvStore + 'static> QueueStatsSource for QueueManager<K> {
    async fn queue_stats(&self) -> Result<QueueStats> {
        QueueManager::<K>::queue_stats(self).await
    }
}
