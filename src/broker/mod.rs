//! Messaging channel abstraction.
//!
//! The pipeline treats the message broker as an external collaborator with
//! a narrow contract: admin operations for topics and subscriptions (all
//! existence checks go to the backend, never a cache), `publish`, and
//! `subscribe`. The channel promises neither ordering nor exactly-once
//! delivery; downstream stages must not assume either.

pub mod memory;
mod path;

pub use memory::InMemoryBroker;
pub use path::{SubscriptionPath, TopicPath};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::BrokerError;

/// Current wall-clock time as unix milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A published message: opaque payload plus the publish timestamp
/// assigned by the broker. Immutable once published.
#[derive(Debug, Clone)]
pub struct Message {
    pub payload: Bytes,
    pub publish_time_ms: i64,
}

impl Message {
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            publish_time_ms: now_ms(),
        }
    }
}

/// Receiving end of a subscription.
///
/// `recv` blocks until a message arrives; `None` means the subscription
/// was deleted and fully drained.
#[async_trait]
pub trait Subscription: Send {
    async fn recv(&mut self) -> Option<Message>;
}

impl std::fmt::Debug for dyn Subscription + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}

/// Messaging backend contract.
///
/// Implementations can back onto any pub/sub system; the pipeline only
/// ever mutates resource existence through the lifecycle manager.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Check topic existence against the backend.
    async fn topic_exists(&self, topic: &TopicPath) -> Result<bool, BrokerError>;

    /// Create a topic. Fails if the topic already exists.
    async fn create_topic(&self, topic: &TopicPath) -> Result<(), BrokerError>;

    /// Delete a topic. Fails with a not-found error if absent.
    async fn delete_topic(&self, topic: &TopicPath) -> Result<(), BrokerError>;

    /// Check subscription existence against the backend.
    async fn subscription_exists(&self, subscription: &SubscriptionPath)
        -> Result<bool, BrokerError>;

    /// Create a subscription bound to a topic. Fails if it already exists
    /// or the topic is absent.
    async fn create_subscription(
        &self,
        subscription: &SubscriptionPath,
        topic: &TopicPath,
    ) -> Result<(), BrokerError>;

    /// Delete a subscription. Fails with a not-found error if absent.
    async fn delete_subscription(&self, subscription: &SubscriptionPath)
        -> Result<(), BrokerError>;

    /// Publish a payload to a topic. The broker assigns the publish timestamp.
    async fn publish(&self, topic: &TopicPath, payload: Bytes) -> Result<(), BrokerError>;

    /// Attach to a subscription's message stream.
    async fn subscribe(
        &self,
        subscription: &SubscriptionPath,
    ) -> Result<Box<dyn Subscription>, BrokerError>;
}
