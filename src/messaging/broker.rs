//! # Message Broker Abstraction
//!
//! Provider-agnostic named queues used by the remote transport. Consumption is
//! destructive and competing: a message is handed to exactly one consumer.
//! Redelivery, when a provider does it, shows up as a duplicate message.

use super::message::BrokerMessage;
use crate::error::{DispatchError, DispatchResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Create a queue if it doesn't exist (idempotent)
    async fn ensure_queue(&self, queue: &str) -> DispatchResult<()>;

    /// Append a message and return its broker-assigned id
    async fn publish(&self, queue: &str, message: BrokerMessage) -> DispatchResult<i64>;

    /// Take up to `max_messages`, waiting at most `wait` for the first one
    async fn consume(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> DispatchResult<Vec<BrokerMessage>>;

    fn provider_name(&self) -> &'static str;
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    messages: parking_lot::Mutex<VecDeque<BrokerMessage>>,
    ready: Notify,
    next_id: AtomicI64,
}

/// Process-local broker for single-host deployments and tests
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    queues: DashMap<String, Arc<InMemoryQueue>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<InMemoryQueue> {
        Arc::clone(self.queues.entry(name.to_string()).or_default().value())
    }

    /// Messages currently waiting in `queue`
    pub fn depth(&self, queue: &str) -> usize {
        self.queues
            .get(queue)
            .map(|q| q.messages.lock().len())
            .unwrap_or(0)
    }

    fn take(queue: &InMemoryQueue, max_messages: usize) -> Vec<BrokerMessage> {
        let mut messages = queue.messages.lock();
        let count = max_messages.min(messages.len());
        messages.drain(..count).collect()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn ensure_queue(&self, queue: &str) -> DispatchResult<()> {
        self.queue(queue);
        Ok(())
    }

    async fn publish(&self, queue: &str, mut message: BrokerMessage) -> DispatchResult<i64> {
        let target = self.queue(queue);
        let message_id = target.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        message.message_id = Some(message_id);
        target.messages.lock().push_back(message);
        target.ready.notify_one();
        debug!(queue = queue, message_id = message_id, "Published message");
        Ok(message_id)
    }

    async fn consume(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> DispatchResult<Vec<BrokerMessage>> {
        if max_messages == 0 {
            return Err(DispatchError::transport(
                "consume",
                "max_messages must be at least 1",
            ));
        }

        let source = self.queue(queue);
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let batch = Self::take(&source, max_messages);
            if !batch.is_empty() {
                // Leave a wakeup behind for other consumers if messages remain
                if !source.messages.lock().is_empty() {
                    source.ready.notify_one();
                }
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, source.ready.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn message(n: i64) -> BrokerMessage {
        BrokerMessage::new(HashMap::new(), json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_competing_consumers_each_message_once() {
        let broker = Arc::new(InMemoryBroker::new());
        for n in 0..20 {
            broker.publish("requests", message(n)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..3 {
            let broker = Arc::clone(&broker);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                loop {
                    let batch = broker
                        .consume("requests", 3, Duration::from_millis(30))
                        .await
                        .unwrap();
                    if batch.is_empty() {
                        return seen;
                    }
                    seen.extend(batch.into_iter().map(|m| m.payload["n"].as_i64().unwrap()));
                }
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
        assert_eq!(broker.depth("requests"), 0);
    }

    #[tokio::test]
    async fn test_consume_wakes_on_publish() {
        let broker = Arc::new(InMemoryBroker::new());
        let consumer = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .consume("replies", 1, Duration::from_secs(2))
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish("replies", message(42)).await.unwrap();

        let batch = consumer.await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message_id, Some(1));
    }

    #[tokio::test]
    async fn test_consume_times_out_empty() {
        let broker = InMemoryBroker::new();
        let batch = broker
            .consume("empty", 5, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }
}
