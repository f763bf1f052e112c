//! Pipeline driver.
//!
//! Wires the stages together and owns the run's lifetime:
//!
//! 1. Ensure the topic and subscription exist (fatal on failure).
//! 2. Ensure the output table exists.
//! 3. Attach to the subscription, then start publishing — attach-first so
//!    no published message is dropped before anyone is listening.
//! 4. Run until the wall-clock deadline, a shutdown signal, or the
//!    subscription stream ending, whichever comes first.
//! 5. Drain in-flight work within the grace period, then tear down the
//!    messaging resources whether or not the run succeeded.

pub mod signal;
mod tasks;

use snafu::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::{MessageBroker, SubscriptionPath, TopicPath};
use crate::config::Config;
use crate::error::{BrokerSnafu, IngestSnafu, LifecycleSnafu, PipelineError, SinkSnafu, TaskJoinSnafu};
use crate::ingest::IngestBridge;
use crate::inference::InferenceStage;
use crate::lifecycle::ResourceLifecycle;
use crate::sink::{AnalyticsSink, TableSchema};
use crate::window::WindowStore;

use tasks::{ClassifyPool, Intake, Trigger};

/// Bound on batches queued between the trigger and the worker pool.
const BATCH_QUEUE_DEPTH: usize = 64;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The subscription stream ended before the deadline.
    Completed,
    /// The wall-clock deadline elapsed.
    DeadlineExceeded,
    /// A shutdown signal arrived.
    Interrupted,
}

/// Counters accumulated over the whole run.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub lines_published: usize,
    pub messages_consumed: usize,
    pub late_dropped: usize,
    pub windows_fired: usize,
    pub elements_classified: usize,
    pub elements_failed: usize,
    pub rows_appended: usize,
}

/// Final report returned to the caller.
#[derive(Debug, Clone, Copy)]
pub struct PipelineReport {
    pub outcome: RunOutcome,
    pub stats: PipelineStats,
}

/// Run the pipeline to completion.
///
/// The messaging resources are created before processing starts and torn
/// down after it ends, on success and failure alike. `shutdown` is the
/// externally-owned cancellation token; `main` wires it to process signals.
pub async fn run_pipeline(
    config: &Config,
    broker: Arc<dyn MessageBroker>,
    stage: Arc<InferenceStage>,
    sink: Arc<dyn AnalyticsSink>,
    shutdown: CancellationToken,
) -> Result<PipelineReport, PipelineError> {
    let topic = TopicPath::new(&config.messaging.project, &config.messaging.topic);
    let subscription =
        SubscriptionPath::new(&config.messaging.project, &config.messaging.subscription);

    let lifecycle = ResourceLifecycle::new(broker.clone(), topic.clone(), subscription.clone());
    lifecycle.ensure().await.context(LifecycleSnafu)?;

    // Everything after ensure runs under the teardown guarantee.
    let result = execute(config, broker, stage, sink, topic, subscription, shutdown).await;
    lifecycle.cleanup().await;
    result
}

async fn execute(
    config: &Config,
    broker: Arc<dyn MessageBroker>,
    stage: Arc<InferenceStage>,
    sink: Arc<dyn AnalyticsSink>,
    topic: TopicPath,
    subscription: SubscriptionPath,
    shutdown: CancellationToken,
) -> Result<PipelineReport, PipelineError> {
    sink.ensure_table(&TableSchema::sentiment())
        .await
        .context(SinkSnafu)?;

    // Attach before the first publish so nothing is missed.
    let stream = broker.subscribe(&subscription).await.context(BrokerSnafu)?;

    let store = Arc::new(WindowStore::new(
        config.window.size(),
        config.window.trigger_delay(),
    ));
    let (batch_tx, batch_rx) = mpsc::channel(BATCH_QUEUE_DEPTH);
    let stream_done = CancellationToken::new();
    let flush = CancellationToken::new();

    let pool = ClassifyPool::spawn(
        batch_rx,
        stage,
        sink.clone(),
        config.run.inference_workers,
    );
    let trigger = Trigger::spawn(store.clone(), batch_tx, flush.clone());
    let intake = Intake::spawn(stream, store, shutdown.clone(), stream_done.clone());

    let bridge = IngestBridge::new(broker, topic, config.source.path.clone());
    let ingest_shutdown = shutdown.clone();
    let mut ingest = tokio::spawn(async move { bridge.run(ingest_shutdown).await });
    let mut ingest_result: Option<usize> = None;

    info!(
        deadline_secs = config.run.deadline_secs,
        workers = config.run.inference_workers,
        "Pipeline running"
    );

    let deadline = tokio::time::sleep(config.run.deadline());
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break RunOutcome::Interrupted,

            _ = &mut deadline => {
                info!("Deadline reached; draining in-flight work");
                break RunOutcome::DeadlineExceeded;
            }

            _ = stream_done.cancelled() => break RunOutcome::Completed,

            joined = &mut ingest, if ingest_result.is_none() => {
                match joined.context(TaskJoinSnafu).and_then(|r| r.context(IngestSnafu)) {
                    Ok(published) => {
                        info!(lines = published, "Input fully published");
                        ingest_result = Some(published);
                    }
                    Err(e) => {
                        shutdown.cancel();
                        flush.cancel();
                        return Err(e);
                    }
                }
            }
        }
    };

    shutdown.cancel();

    // Ordered drain: stop the intake first so nothing lands in the store
    // after the final flush, then flush the trigger, then let the pool
    // empty the queue.
    let drained = tokio::time::timeout(config.run.grace(), async {
        let lines_published = match ingest_result {
            Some(published) => published,
            None => ingest
                .await
                .context(TaskJoinSnafu)?
                .context(IngestSnafu)
                .unwrap_or_else(|e| {
                    warn!("Ingest stopped with error during shutdown: {e}");
                    0
                }),
        };
        let intake_stats = intake.finish().await.context(TaskJoinSnafu)?;
        flush.cancel();
        let trigger_stats = trigger.finish().await.context(TaskJoinSnafu)?;
        let pool_stats = pool.finish().await.context(TaskJoinSnafu)?;

        Ok::<PipelineStats, PipelineError>(PipelineStats {
            lines_published,
            messages_consumed: intake_stats.consumed,
            late_dropped: intake_stats.late_dropped,
            windows_fired: trigger_stats.windows_fired,
            elements_classified: pool_stats.classified,
            elements_failed: intake_stats.decode_failures + pool_stats.failed,
            rows_appended: pool_stats.appended,
        })
    })
    .await;

    let stats = match drained {
        Ok(stats) => stats?,
        Err(_) => {
            warn!(
                grace_secs = config.run.grace_secs,
                "Grace period elapsed before the drain finished; some in-flight work was abandoned"
            );
            PipelineStats::default()
        }
    };

    info!(
        outcome = ?outcome,
        rows_appended = stats.rows_appended,
        elements_failed = stats.elements_failed,
        "Pipeline finished"
    );
    Ok(PipelineReport { outcome, stats })
}
