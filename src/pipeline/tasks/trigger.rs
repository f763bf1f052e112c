//! Trigger task: periodically scans the window store and emits due batches.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::now_ms;
use crate::emit;
use crate::metrics::events::{ClassifyQueueDepth, WindowFired};
use crate::window::{FiredWindow, WindowStore};

/// How often the store is scanned for due triggers. Coarse relative to the
/// trigger delay, fine enough that firings land close to their deadline.
const SCAN_INTERVAL: Duration = Duration::from_millis(100);

/// Counters returned when the trigger task finishes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerStats {
    pub windows_fired: usize,
}

/// Handle to the spawned trigger task.
pub struct Trigger {
    handle: JoinHandle<TriggerStats>,
}

impl Trigger {
    /// Spawn the scan loop.
    ///
    /// On `stop`, the store is drained completely (the final flush) before
    /// the sender is dropped, which in turn lets the classify pool wind
    /// down once the queue is empty.
    pub fn spawn(
        store: Arc<WindowStore>,
        batches: mpsc::Sender<FiredWindow>,
        stop: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(run(store, batches, stop));
        Self { handle }
    }

    /// Wait for the task to finish and collect its counters.
    pub async fn finish(self) -> Result<TriggerStats, tokio::task::JoinError> {
        self.handle.await
    }
}

async fn run(
    store: Arc<WindowStore>,
    batches: mpsc::Sender<FiredWindow>,
    stop: CancellationToken,
) -> TriggerStats {
    let mut stats = TriggerStats::default();
    let mut ticker = tokio::time::interval(SCAN_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => {
                info!("Trigger task flushing remaining windows");
                let remaining = store.drain_all().await;
                forward(remaining, &batches, &mut stats).await;
                break;
            }

            _ = ticker.tick() => {
                let due = store.drain_due(now_ms()).await;
                if !forward(due, &batches, &mut stats).await {
                    break;
                }
            }
        }
    }

    debug!(windows_fired = stats.windows_fired, "Trigger task finished");
    stats
}

/// Send fired batches downstream. Returns false once the receiver is gone.
async fn forward(
    fired: Vec<FiredWindow>,
    batches: &mpsc::Sender<FiredWindow>,
    stats: &mut TriggerStats,
) -> bool {
    for batch in fired {
        debug!(window = %batch.key, elements = batch.elements.len(), "Window fired");
        emit!(WindowFired {
            elements: batch.elements.len()
        });
        stats.windows_fired += 1;
        if batches.send(batch).await.is_err() {
            info!("Batch receiver dropped; stopping trigger task");
            return false;
        }
        emit!(ClassifyQueueDepth {
            count: batches.max_capacity() - batches.capacity()
        });
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_due_windows_flow_to_channel() {
        let store = Arc::new(WindowStore::new(
            Duration::from_secs(60),
            Duration::from_millis(200),
        ));
        let (tx, mut rx) = mpsc::channel(8);
        let stop = CancellationToken::new();
        let trigger = Trigger::spawn(store.clone(), tx, stop.clone());

        let now = now_ms();
        store.insert("a".to_string(), now, now).await;
        // Past the trigger delay plus one scan interval.
        tokio::time::sleep(Duration::from_millis(400)).await;

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.elements, vec!["a"]);

        stop.cancel();
        let stats = trigger.finish().await.unwrap();
        assert_eq!(stats.windows_fired, 1);
    }

    #[tokio::test]
    async fn test_stop_flushes_undue_windows() {
        let store = Arc::new(WindowStore::new(
            Duration::from_secs(60),
            Duration::from_secs(30),
        ));
        let (tx, mut rx) = mpsc::channel(8);
        let stop = CancellationToken::new();
        let trigger = Trigger::spawn(store.clone(), tx, stop.clone());

        let now = now_ms();
        store.insert("pending".to_string(), now, now).await;
        stop.cancel();

        let stats = trigger.finish().await.unwrap();
        assert_eq!(stats.windows_fired, 1);
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.elements, vec!["pending"]);
        // Sender dropped after the flush.
        assert!(rx.recv().await.is_none());
    }
}
