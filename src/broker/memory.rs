//! In-process message broker.
//!
//! Topics fan out to per-subscription bounded queues. A subscription
//! buffers messages from the moment it is created, so subscribing after
//! publishing has started does not lose the backlog. Existence is always
//! answered from live broker state, never cached by callers.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::error::{
    BrokerError, SubscriptionAttachedSnafu, SubscriptionExistsSnafu, SubscriptionNotFoundSnafu,
    TopicExistsSnafu, TopicNotFoundSnafu,
};
use snafu::prelude::*;

use super::{Message, MessageBroker, Subscription, SubscriptionPath, TopicPath};

/// Queue depth per subscription before publishers feel backpressure.
const SUBSCRIPTION_BUFFER: usize = 1024;

struct TopicState {
    /// Names of subscriptions attached to this topic.
    subscriptions: Vec<String>,
}

struct SubscriptionState {
    tx: mpsc::Sender<Message>,
    /// Taken by the first `subscribe` call.
    rx: Option<mpsc::Receiver<Message>>,
}

#[derive(Default)]
struct Registry {
    topics: HashMap<String, TopicState>,
    subscriptions: HashMap<String, SubscriptionState>,
}

/// In-memory broker backing the pipeline for local and test runs.
#[derive(Default)]
pub struct InMemoryBroker {
    registry: RwLock<Registry>,
    /// Serializes publishes per broker so fan-out sends cannot interleave
    /// with subscription deletion mid-batch.
    publish_lock: Mutex<()>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MpscSubscription {
    rx: mpsc::Receiver<Message>,
}

#[async_trait]
impl Subscription for MpscSubscription {
    async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn topic_exists(&self, topic: &TopicPath) -> Result<bool, BrokerError> {
        let registry = self.registry.read().await;
        Ok(registry.topics.contains_key(topic.path()))
    }

    async fn create_topic(&self, topic: &TopicPath) -> Result<(), BrokerError> {
        let mut registry = self.registry.write().await;
        ensure!(
            !registry.topics.contains_key(topic.path()),
            TopicExistsSnafu { name: topic.name() }
        );
        registry.topics.insert(
            topic.path().to_string(),
            TopicState {
                subscriptions: Vec::new(),
            },
        );
        tracing::debug!(topic = %topic, "Created topic");
        Ok(())
    }

    async fn delete_topic(&self, topic: &TopicPath) -> Result<(), BrokerError> {
        let mut registry = self.registry.write().await;
        registry
            .topics
            .remove(topic.path())
            .context(TopicNotFoundSnafu { name: topic.name() })?;
        tracing::debug!(topic = %topic, "Deleted topic");
        Ok(())
    }

    async fn subscription_exists(
        &self,
        subscription: &SubscriptionPath,
    ) -> Result<bool, BrokerError> {
        let registry = self.registry.read().await;
        Ok(registry.subscriptions.contains_key(subscription.path()))
    }

    async fn create_subscription(
        &self,
        subscription: &SubscriptionPath,
        topic: &TopicPath,
    ) -> Result<(), BrokerError> {
        let mut registry = self.registry.write().await;
        ensure!(
            !registry.subscriptions.contains_key(subscription.path()),
            SubscriptionExistsSnafu {
                name: subscription.name()
            }
        );
        let topic_state = registry
            .topics
            .get_mut(topic.path())
            .context(TopicNotFoundSnafu { name: topic.name() })?;
        topic_state
            .subscriptions
            .push(subscription.path().to_string());

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        registry.subscriptions.insert(
            subscription.path().to_string(),
            SubscriptionState { tx, rx: Some(rx) },
        );
        tracing::debug!(subscription = %subscription, topic = %topic, "Created subscription");
        Ok(())
    }

    async fn delete_subscription(
        &self,
        subscription: &SubscriptionPath,
    ) -> Result<(), BrokerError> {
        let mut registry = self.registry.write().await;
        registry
            .subscriptions
            .remove(subscription.path())
            .context(SubscriptionNotFoundSnafu {
                name: subscription.name(),
            })?;
        // Detach from any topic that still references it.
        for topic in registry.topics.values_mut() {
            topic.subscriptions.retain(|s| s != subscription.path());
        }
        tracing::debug!(subscription = %subscription, "Deleted subscription");
        Ok(())
    }

    async fn publish(&self, topic: &TopicPath, payload: Bytes) -> Result<(), BrokerError> {
        let _guard = self.publish_lock.lock().await;

        // Snapshot the senders under the read lock, then send without it
        // so a full queue cannot wedge admin operations.
        let senders: Vec<mpsc::Sender<Message>> = {
            let registry = self.registry.read().await;
            let topic_state = registry
                .topics
                .get(topic.path())
                .context(TopicNotFoundSnafu { name: topic.name() })?;
            topic_state
                .subscriptions
                .iter()
                .filter_map(|name| registry.subscriptions.get(name))
                .map(|s| s.tx.clone())
                .collect()
        };

        let message = Message::new(payload);
        for tx in senders {
            // A closed receiver means the subscription was deleted between
            // the snapshot and the send; not an error for the publisher.
            if tx.send(message.clone()).await.is_err() {
                tracing::warn!(topic = %topic, "Subscriber closed during publish");
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: &SubscriptionPath,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        let mut registry = self.registry.write().await;
        let state = registry
            .subscriptions
            .get_mut(subscription.path())
            .context(SubscriptionNotFoundSnafu {
                name: subscription.name(),
            })?;
        let rx = state.rx.take().context(SubscriptionAttachedSnafu {
            name: subscription.name(),
        })?;
        Ok(Box::new(MpscSubscription { rx }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> (TopicPath, SubscriptionPath) {
        (
            TopicPath::new("test-project", "lines"),
            SubscriptionPath::new("test-project", "lines-sub"),
        )
    }

    #[tokio::test]
    async fn test_create_and_exists() {
        let broker = InMemoryBroker::new();
        let (topic, sub) = paths();

        assert!(!broker.topic_exists(&topic).await.unwrap());
        broker.create_topic(&topic).await.unwrap();
        assert!(broker.topic_exists(&topic).await.unwrap());

        assert!(!broker.subscription_exists(&sub).await.unwrap());
        broker.create_subscription(&sub, &topic).await.unwrap();
        assert!(broker.subscription_exists(&sub).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_duplicate_topic_fails() {
        let broker = InMemoryBroker::new();
        let (topic, _) = paths();
        broker.create_topic(&topic).await.unwrap();
        let err = broker.create_topic(&topic).await.unwrap_err();
        assert!(matches!(err, BrokerError::TopicExists { .. }));
    }

    #[tokio::test]
    async fn test_delete_absent_is_not_found() {
        let broker = InMemoryBroker::new();
        let (topic, sub) = paths();
        assert!(broker.delete_topic(&topic).await.unwrap_err().is_not_found());
        assert!(broker
            .delete_subscription(&sub)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_publish_requires_topic() {
        let broker = InMemoryBroker::new();
        let (topic, _) = paths();
        let err = broker
            .publish(&topic, Bytes::from_static(b"hello"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_publish_buffers_before_subscribe() {
        let broker = InMemoryBroker::new();
        let (topic, sub) = paths();
        broker.create_topic(&topic).await.unwrap();
        broker.create_subscription(&sub, &topic).await.unwrap();

        broker
            .publish(&topic, Bytes::from_static(b"first"))
            .await
            .unwrap();
        broker
            .publish(&topic, Bytes::from_static(b"second"))
            .await
            .unwrap();

        let mut subscription = broker.subscribe(&sub).await.unwrap();
        let first = subscription.recv().await.unwrap();
        assert_eq!(first.payload, Bytes::from_static(b"first"));
        assert!(first.publish_time_ms > 0);
        let second = subscription.recv().await.unwrap();
        assert_eq!(second.payload, Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn test_delete_subscription_closes_stream() {
        let broker = InMemoryBroker::new();
        let (topic, sub) = paths();
        broker.create_topic(&topic).await.unwrap();
        broker.create_subscription(&sub, &topic).await.unwrap();

        let mut subscription = broker.subscribe(&sub).await.unwrap();
        broker.delete_subscription(&sub).await.unwrap();
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_second_subscribe_fails() {
        let broker = InMemoryBroker::new();
        let (topic, sub) = paths();
        broker.create_topic(&topic).await.unwrap();
        broker.create_subscription(&sub, &topic).await.unwrap();

        let _subscription = broker.subscribe(&sub).await.unwrap();
        let err = broker.subscribe(&sub).await.unwrap_err();
        assert!(matches!(err, BrokerError::SubscriptionAttached { .. }));
    }
}
