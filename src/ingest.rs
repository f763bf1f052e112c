//! Ingest bridge: bounded text source into the message topic.
//!
//! Reads the input file line by line, skips lines that are empty after
//! trimming, and publishes each surviving line as one message. The source
//! is bounded, so this stage runs to completion and does not keep the
//! pipeline alive by itself.

use bytes::Bytes;
use snafu::prelude::*;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::{MessageBroker, TopicPath};
use crate::emit;
use crate::error::{IngestError, OpenInputSnafu, PublishSnafu, ReadLineSnafu};
use crate::metrics::events::LinesPublished;

/// Publishes a bounded file of text lines onto a topic.
pub struct IngestBridge {
    broker: Arc<dyn MessageBroker>,
    topic: TopicPath,
    input_path: String,
}

impl IngestBridge {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: TopicPath, input_path: String) -> Self {
        Self {
            broker,
            topic,
            input_path,
        }
    }

    /// Read the input and publish every non-blank line.
    ///
    /// Returns the number of lines published. Stops early (without error)
    /// if shutdown is requested mid-file.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<usize, IngestError> {
        let file = File::open(&self.input_path).await.context(OpenInputSnafu {
            path: self.input_path.clone(),
        })?;
        let mut lines = BufReader::new(file).lines();
        let mut published = 0usize;

        loop {
            let line = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested during ingest");
                    break;
                }

                line = lines.next_line() => line.context(ReadLineSnafu)?,
            };

            let Some(line) = line else {
                break;
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                debug!("Skipping blank line");
                continue;
            }

            self.broker
                .publish(&self.topic, Bytes::from(trimmed.to_string()))
                .await
                .context(PublishSnafu)?;
            published += 1;
            emit!(LinesPublished { count: 1 });
        }

        info!(
            published,
            input = %self.input_path,
            "Ingest complete"
        );
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, SubscriptionPath};
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn broker_with_resources() -> (Arc<InMemoryBroker>, TopicPath, SubscriptionPath) {
        let broker = Arc::new(InMemoryBroker::new());
        let topic = TopicPath::new("test-project", "lines");
        let sub = SubscriptionPath::new("test-project", "lines-sub");
        broker.create_topic(&topic).await.unwrap();
        broker.create_subscription(&sub, &topic).await.unwrap();
        (broker, topic, sub)
    }

    #[tokio::test]
    async fn test_publishes_non_blank_lines() {
        let (broker, topic, sub) = broker_with_resources().await;

        let mut input = NamedTempFile::new().unwrap();
        writeln!(input, "I love this").unwrap();
        writeln!(input).unwrap();
        writeln!(input, "   ").unwrap();
        writeln!(input, "This is terrible").unwrap();
        input.flush().unwrap();

        let bridge = IngestBridge::new(
            broker.clone(),
            topic,
            input.path().to_str().unwrap().to_string(),
        );
        let published = bridge.run(CancellationToken::new()).await.unwrap();
        assert_eq!(published, 2);

        let mut subscription = broker.subscribe(&sub).await.unwrap();
        let first = subscription.recv().await.unwrap();
        assert_eq!(first.payload, Bytes::from_static(b"I love this"));
        let second = subscription.recv().await.unwrap();
        assert_eq!(second.payload, Bytes::from_static(b"This is terrible"));
    }

    #[tokio::test]
    async fn test_blank_only_input_publishes_nothing() {
        let (broker, topic, _sub) = broker_with_resources().await;

        let mut input = NamedTempFile::new().unwrap();
        writeln!(input).unwrap();
        writeln!(input, "\t  ").unwrap();
        input.flush().unwrap();

        let bridge = IngestBridge::new(
            broker,
            topic,
            input.path().to_str().unwrap().to_string(),
        );
        let published = bridge.run(CancellationToken::new()).await.unwrap();
        assert_eq!(published, 0);
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let (broker, topic, _sub) = broker_with_resources().await;
        let bridge = IngestBridge::new(broker, topic, "/nonexistent/input.txt".to_string());
        let err = bridge.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, IngestError::OpenInput { .. }));
    }
}
