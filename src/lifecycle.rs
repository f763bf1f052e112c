//! Idempotent lifecycle management for messaging resources.
//!
//! The pipeline owns its topic and subscription: create-if-absent before
//! the run, best-effort delete afterwards. Only this module mutates
//! resource existence; every check goes to the broker so repeated or
//! concurrent runs see the truth, not a cached view.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broker::{MessageBroker, SubscriptionPath, TopicPath};
use crate::error::BrokerError;

/// Manages the existence of the topic/subscription pair for one run.
pub struct ResourceLifecycle {
    broker: Arc<dyn MessageBroker>,
    topic: TopicPath,
    subscription: SubscriptionPath,
}

impl ResourceLifecycle {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        topic: TopicPath,
        subscription: SubscriptionPath,
    ) -> Self {
        Self {
            broker,
            topic,
            subscription,
        }
    }

    /// Ensure the topic and subscription exist, creating whichever is absent.
    ///
    /// Calling this when both resources already exist is a no-op. Any
    /// failure during the existence probes or creation is fatal for the
    /// run; the pipeline must not start against unknown resource state.
    pub async fn ensure(&self) -> Result<(), BrokerError> {
        if self.broker.topic_exists(&self.topic).await? {
            debug!(topic = %self.topic, "Topic already exists");
        } else {
            self.broker.create_topic(&self.topic).await?;
            info!(topic = %self.topic, "Created topic");
        }

        if self.broker.subscription_exists(&self.subscription).await? {
            debug!(subscription = %self.subscription, "Subscription already exists");
        } else {
            self.broker
                .create_subscription(&self.subscription, &self.topic)
                .await?;
            info!(subscription = %self.subscription, "Created subscription");
        }

        Ok(())
    }

    /// Delete the subscription, then the topic, best-effort.
    ///
    /// Each deletion is attempted independently; already-absent resources
    /// are a quiet no-op and other failures are reported without aborting
    /// the remaining deletions. Cleanup never fails the run.
    pub async fn cleanup(&self) {
        match self.broker.delete_subscription(&self.subscription).await {
            Ok(()) => info!(subscription = %self.subscription, "Deleted subscription"),
            Err(e) if e.is_not_found() => {
                debug!(subscription = %self.subscription, "Subscription already absent");
            }
            Err(e) => warn!(subscription = %self.subscription, "Failed to delete subscription: {e}"),
        }

        match self.broker.delete_topic(&self.topic).await {
            Ok(()) => info!(topic = %self.topic, "Deleted topic"),
            Err(e) if e.is_not_found() => debug!(topic = %self.topic, "Topic already absent"),
            Err(e) => warn!(topic = %self.topic, "Failed to delete topic: {e}"),
        }
    }

    pub fn topic(&self) -> &TopicPath {
        &self.topic
    }

    pub fn subscription(&self) -> &SubscriptionPath {
        &self.subscription
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;

    fn lifecycle() -> (Arc<InMemoryBroker>, ResourceLifecycle) {
        let broker = Arc::new(InMemoryBroker::new());
        let topic = TopicPath::new("test-project", "lines");
        let subscription = SubscriptionPath::new("test-project", "lines-sub");
        let lifecycle = ResourceLifecycle::new(broker.clone(), topic, subscription);
        (broker, lifecycle)
    }

    #[tokio::test]
    async fn test_ensure_creates_both_resources() {
        let (broker, lifecycle) = lifecycle();
        lifecycle.ensure().await.unwrap();

        assert!(broker.topic_exists(lifecycle.topic()).await.unwrap());
        assert!(broker
            .subscription_exists(lifecycle.subscription())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (broker, lifecycle) = lifecycle();
        lifecycle.ensure().await.unwrap();
        lifecycle.ensure().await.unwrap();

        assert!(broker.topic_exists(lifecycle.topic()).await.unwrap());
        assert!(broker
            .subscription_exists(lifecycle.subscription())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ensure_creates_only_missing_subscription() {
        let (broker, lifecycle) = lifecycle();
        broker.create_topic(lifecycle.topic()).await.unwrap();

        lifecycle.ensure().await.unwrap();

        assert!(broker.topic_exists(lifecycle.topic()).await.unwrap());
        assert!(broker
            .subscription_exists(lifecycle.subscription())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_removes_both_resources() {
        let (broker, lifecycle) = lifecycle();
        lifecycle.ensure().await.unwrap();
        lifecycle.cleanup().await;

        assert!(!broker.topic_exists(lifecycle.topic()).await.unwrap());
        assert!(!broker
            .subscription_exists(lifecycle.subscription())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let (broker, lifecycle) = lifecycle();
        lifecycle.ensure().await.unwrap();
        lifecycle.cleanup().await;
        // Second cleanup on absent resources must be a quiet no-op.
        lifecycle.cleanup().await;

        assert!(!broker.topic_exists(lifecycle.topic()).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_without_ensure_is_noop() {
        let (_broker, lifecycle) = lifecycle();
        lifecycle.cleanup().await;
    }
}
