//! Intake task: consumes the subscription and buffers elements into windows.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{now_ms, Message, Subscription};
use crate::emit;
use crate::metrics::events::{
    ElementFailed, FailureStage, LateMessagesDropped, MessagesConsumed, OpenWindows,
};
use crate::window::{InsertOutcome, WindowStore};

/// Counters returned when the intake task finishes.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntakeStats {
    pub consumed: usize,
    pub late_dropped: usize,
    pub decode_failures: usize,
}

/// Handle to the spawned intake task.
pub struct Intake {
    handle: JoinHandle<IntakeStats>,
}

impl Intake {
    /// Spawn the intake loop.
    ///
    /// `stream_done` is cancelled when the subscription stream ends, so the
    /// driver can distinguish a finished stream from a deadline.
    pub fn spawn(
        subscription: Box<dyn Subscription>,
        store: Arc<WindowStore>,
        shutdown: CancellationToken,
        stream_done: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(run(subscription, store, shutdown, stream_done));
        Self { handle }
    }

    /// Wait for the task to finish and collect its counters.
    pub async fn finish(self) -> Result<IntakeStats, tokio::task::JoinError> {
        self.handle.await
    }
}

async fn run(
    mut subscription: Box<dyn Subscription>,
    store: Arc<WindowStore>,
    shutdown: CancellationToken,
    stream_done: CancellationToken,
) -> IntakeStats {
    let mut stats = IntakeStats::default();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("Intake task shutting down");
                break;
            }

            message = subscription.recv() => {
                match message {
                    Some(message) => buffer_message(message, &store, &mut stats).await,
                    None => {
                        info!("Subscription stream ended");
                        stream_done.cancel();
                        break;
                    }
                }
            }
        }
    }

    debug!(
        consumed = stats.consumed,
        late_dropped = stats.late_dropped,
        decode_failures = stats.decode_failures,
        "Intake task finished"
    );
    stats
}

async fn buffer_message(message: Message, store: &WindowStore, stats: &mut IntakeStats) {
    let text = match String::from_utf8(message.payload.to_vec()) {
        Ok(text) => text,
        Err(e) => {
            warn!("Skipping undecodable payload: {}", e);
            emit!(ElementFailed {
                stage: FailureStage::Decode
            });
            stats.decode_failures += 1;
            return;
        }
    };

    stats.consumed += 1;
    emit!(MessagesConsumed { count: 1 });

    match store.insert(text, message.publish_time_ms, now_ms()).await {
        InsertOutcome::Buffered(_) => {}
        InsertOutcome::Late(window) => {
            debug!(window = %window, "Dropped late message");
            emit!(LateMessagesDropped { count: 1 });
            stats.late_dropped += 1;
        }
    }

    emit!(OpenWindows {
        count: store.open_windows().await
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, MessageBroker, SubscriptionPath, TopicPath};
    use bytes::Bytes;
    use std::time::Duration;

    async fn broker_with_stream() -> (InMemoryBroker, TopicPath, SubscriptionPath) {
        let broker = InMemoryBroker::new();
        let topic = TopicPath::new("p", "t");
        let sub = SubscriptionPath::new("p", "s");
        broker.create_topic(&topic).await.unwrap();
        broker.create_subscription(&sub, &topic).await.unwrap();
        (broker, topic, sub)
    }

    #[tokio::test]
    async fn test_buffers_messages_until_cancelled() {
        let (broker, topic, sub) = broker_with_stream().await;
        broker
            .publish(&topic, Bytes::from_static(b"hello"))
            .await
            .unwrap();
        broker
            .publish(&topic, Bytes::from_static(b"world"))
            .await
            .unwrap();

        let store = Arc::new(WindowStore::new(
            Duration::from_secs(60),
            Duration::from_secs(30),
        ));
        let shutdown = CancellationToken::new();
        let subscription = broker.subscribe(&sub).await.unwrap();
        let intake = Intake::spawn(
            subscription,
            store.clone(),
            shutdown.clone(),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        let stats = intake.finish().await.unwrap();

        assert_eq!(stats.consumed, 2);
        assert_eq!(stats.late_dropped, 0);
        let fired = store.drain_all().await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].elements, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_skipped() {
        let (broker, topic, sub) = broker_with_stream().await;
        broker
            .publish(&topic, Bytes::from_static(&[0xff, 0xfe]))
            .await
            .unwrap();
        broker
            .publish(&topic, Bytes::from_static(b"ok"))
            .await
            .unwrap();

        let store = Arc::new(WindowStore::new(
            Duration::from_secs(60),
            Duration::from_secs(30),
        ));
        let shutdown = CancellationToken::new();
        let subscription = broker.subscribe(&sub).await.unwrap();
        let intake = Intake::spawn(
            subscription,
            store.clone(),
            shutdown.clone(),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        let stats = intake.finish().await.unwrap();

        assert_eq!(stats.consumed, 1);
        assert_eq!(stats.decode_failures, 1);
        let fired = store.drain_all().await;
        assert_eq!(fired[0].elements, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_stream_end_signals_done() {
        let (broker, _topic, sub) = broker_with_stream().await;
        let store = Arc::new(WindowStore::new(
            Duration::from_secs(60),
            Duration::from_secs(30),
        ));
        let stream_done = CancellationToken::new();
        let subscription = broker.subscribe(&sub).await.unwrap();
        let intake = Intake::spawn(
            subscription,
            store,
            CancellationToken::new(),
            stream_done.clone(),
        );

        broker.delete_subscription(&sub).await.unwrap();
        stream_done.cancelled().await;
        let stats = intake.finish().await.unwrap();
        assert_eq!(stats.consumed, 0);
    }
}
