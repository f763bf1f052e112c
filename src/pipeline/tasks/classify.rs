//! Classification worker pool: drains fired batches and appends rows.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::emit;
use crate::inference::InferenceStage;
use crate::metrics::events::{
    ElementFailed, ElementsClassified, FailureStage, RowsAppended, SinkAppendCompleted,
};
use crate::sink::{AnalyticsSink, SentimentRow};
use crate::window::FiredWindow;

/// Counters summed over all workers when the pool finishes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassifyStats {
    pub classified: usize,
    pub failed: usize,
    pub appended: usize,
}

impl ClassifyStats {
    fn merge(&mut self, other: ClassifyStats) {
        self.classified += other.classified;
        self.failed += other.failed;
        self.appended += other.appended;
    }
}

/// Handle to the spawned worker pool.
///
/// Workers run until the batch channel closes (the trigger task drops its
/// sender after the final flush), so no separate shutdown signal is needed;
/// every queued batch gets processed.
pub struct ClassifyPool {
    handles: Vec<JoinHandle<ClassifyStats>>,
}

impl ClassifyPool {
    pub fn spawn(
        batches: mpsc::Receiver<FiredWindow>,
        stage: Arc<InferenceStage>,
        sink: Arc<dyn AnalyticsSink>,
        workers: usize,
    ) -> Self {
        let batches = Arc::new(Mutex::new(batches));
        let handles = (0..workers)
            .map(|id| tokio::spawn(run_worker(id, batches.clone(), stage.clone(), sink.clone())))
            .collect();
        Self { handles }
    }

    /// Wait for every worker and sum their counters.
    pub async fn finish(self) -> Result<ClassifyStats, tokio::task::JoinError> {
        let mut stats = ClassifyStats::default();
        for handle in self.handles {
            stats.merge(handle.await?);
        }
        Ok(stats)
    }
}

async fn run_worker(
    id: usize,
    batches: Arc<Mutex<mpsc::Receiver<FiredWindow>>>,
    stage: Arc<InferenceStage>,
    sink: Arc<dyn AnalyticsSink>,
) -> ClassifyStats {
    let mut stats = ClassifyStats::default();

    loop {
        // Hold the receiver lock only while waiting for the next batch;
        // classification and the append run outside it.
        let batch = match batches.lock().await.recv().await {
            Some(batch) => batch,
            None => break,
        };

        let (results, failed) = stage.process_batch(&batch.elements).await;
        stats.classified += results.len();
        stats.failed += failed;
        emit!(ElementsClassified {
            count: results.len() as u64
        });

        if results.is_empty() {
            continue;
        }

        let rows: Vec<SentimentRow> = results.into_iter().map(SentimentRow::from).collect();
        let start = Instant::now();
        match sink.append_rows(&rows).await {
            Ok(()) => {
                emit!(SinkAppendCompleted {
                    duration: start.elapsed()
                });
                emit!(RowsAppended {
                    count: rows.len() as u64
                });
                stats.appended += rows.len();
                debug!(worker = id, window = %batch.key, rows = rows.len(), "Appended rows");
            }
            Err(e) => {
                // Skip-and-report: the batch is lost but the pipeline
                // keeps running.
                error!(worker = id, window = %batch.key, "Failed to append rows: {e}");
                emit!(ElementFailed {
                    stage: FailureStage::Append
                });
                stats.failed += rows.len();
            }
        }
    }

    info!(worker = id, "Classify worker finished");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{LinearClassifier, Tokenizer};
    use crate::sink::MemorySink;
    use crate::window::WindowKey;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const SIZE: Duration = Duration::from_secs(60);

    fn stage() -> Arc<InferenceStage> {
        let mut vocab = NamedTempFile::new().unwrap();
        writeln!(vocab, "love\nterrible").unwrap();
        vocab.flush().unwrap();
        let tokenizer = Tokenizer::from_file(vocab.path()).unwrap();

        let mut weights = NamedTempFile::new().unwrap();
        let model = serde_json::json!({
            "weights": [[0.0, 0.0], [0.0, 0.0], [-1.0, 2.0], [2.0, -1.0]],
            "bias": [0.0, 0.0],
        });
        write!(weights, "{model}").unwrap();
        weights.flush().unwrap();
        let classifier = LinearClassifier::from_file(weights.path(), tokenizer.vocab_size()).unwrap();

        Arc::new(InferenceStage::new(tokenizer, Arc::new(classifier)))
    }

    #[tokio::test]
    async fn test_batches_become_rows() {
        let sink = Arc::new(MemorySink::new());
        let (tx, rx) = mpsc::channel(4);
        let pool = ClassifyPool::spawn(rx, stage(), sink.clone(), 2);

        tx.send(FiredWindow {
            key: WindowKey::for_timestamp(0, SIZE),
            elements: vec!["I love this".to_string(), "this is terrible".to_string()],
        })
        .await
        .unwrap();
        drop(tx);

        let stats = pool.finish().await.unwrap();
        assert_eq!(stats.classified, 2);
        assert_eq!(stats.appended, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(sink.rows().await.len(), 2);
    }

    #[tokio::test]
    async fn test_pool_drains_queue_after_sender_drops() {
        let sink = Arc::new(MemorySink::new());
        let (tx, rx) = mpsc::channel(8);
        for i in 0..5 {
            tx.send(FiredWindow {
                key: WindowKey::for_timestamp(i * 60_000, SIZE),
                elements: vec!["love".to_string()],
            })
            .await
            .unwrap();
        }
        drop(tx);

        let pool = ClassifyPool::spawn(rx, stage(), sink.clone(), 3);
        let stats = pool.finish().await.unwrap();
        assert_eq!(stats.appended, 5);
        assert_eq!(sink.rows().await.len(), 5);
    }
}
