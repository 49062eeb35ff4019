//! Shared single-retry requeue policy (§4.4, §4.5), implemented once
//! against [`QueueManager`] and used by both the Publisher's
//! error-stream handler and the Fetcher's inline requeue path.

use crate::manager::QueueManager;
use async_trait::async_trait;
use sneakdex_types::ports::{KvStore, RequeueDecision, RequeuePolicy};
use sneakdex_types::{QueueItem, Result};
use std::sync::Arc;

pub struct QueueRequeuePolicy<K: KvStore> {
    queue: Arc<QueueManager<K>>,
}

#[cfg(test)]
impl<K: KvStore> QueueRequeuePolicy<K> {
    fn queue(&self) -> &QueueManager<K> {
        &self.queue
    }
}

impl<K: KvStore> QueueRequeuePolicy<K> {
    pub fn new(queue: Arc<QueueManager<K>>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl<K: KvStore + 'static> RequeuePolicy for QueueRequeuePolicy<K> {
    async fn decide(&self, url: &str) -> Result<RequeueDecision> {
        if self.queue.is_requeued(url).await? {
            Ok(RequeueDecision::GiveUp)
        } else {
            Ok(RequeueDecision::Requeue)
        }
    }

    async fn apply(&self, decision: RequeueDecision, item: QueueItem) -> Result<()> {
        match decision {
            RequeueDecision::GiveUp => {
                self.queue.remove_from_requeued(&item.url).await?;
                self.queue.mark_visited(&item.url).await
            }
            RequeueDecision::Requeue => {
                self.queue.add_to_pending(item.clone()).await?;
                self.queue.add_to_requeued(&item.url).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::test_support::FakeKv;

    fn policy() -> QueueRequeuePolicy<FakeKv> {
        QueueRequeuePolicy::new(Arc::new(QueueManager::new(Arc::new(FakeKv::default()), 3)))
    }

    #[tokio::test]
    async fn first_failure_requeues() {
        let p = policy();
        let item = QueueItem::seed("https://a.test");
        let decision = p.decide(&item.url).await.unwrap();
        assert_eq!(decision, RequeueDecision::Requeue);
        p.apply(decision, item.clone()).await.unwrap();
        assert_eq!(p.decide(&item.url).await.unwrap(), RequeueDecision::GiveUp);
    }

    #[tokio::test]
    async fn second_failure_gives_up_and_marks_visited() {
        let p = policy();
        let item = QueueItem::seed("https://a.test");
        p.apply(RequeueDecision::Requeue, item.clone()).await.unwrap();
        let decision = p.decide(&item.url).await.unwrap();
        assert_eq!(decision, RequeueDecision::GiveUp);
        p.apply(decision, item.clone()).await.unwrap();
        assert!(!p.queue().is_requeued(&item.url).await.unwrap());
    }
}
