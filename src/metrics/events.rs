//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which emits the
//! corresponding Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when lines are published to the topic.
pub struct LinesPublished {
    pub count: u64,
}

impl InternalEvent for LinesPublished {
    fn emit(self) {
        trace!(count = self.count, "Lines published");
        counter!("squall_lines_published_total").increment(self.count);
    }
}

/// Event emitted when messages are consumed from the subscription.
pub struct MessagesConsumed {
    pub count: u64,
}

impl InternalEvent for MessagesConsumed {
    fn emit(self) {
        trace!(count = self.count, "Messages consumed");
        counter!("squall_messages_consumed_total").increment(self.count);
    }
}

/// Event emitted when a message is dropped for arriving after its window
/// closed.
pub struct LateMessagesDropped {
    pub count: u64,
}

impl InternalEvent for LateMessagesDropped {
    fn emit(self) {
        trace!(count = self.count, "Late messages dropped");
        counter!("squall_late_messages_dropped_total").increment(self.count);
    }
}

/// Event emitted when a window trigger fires.
pub struct WindowFired {
    pub elements: usize,
}

impl InternalEvent for WindowFired {
    fn emit(self) {
        trace!(elements = self.elements, "Window fired");
        counter!("squall_windows_fired_total").increment(1);
        histogram!("squall_window_fire_elements").record(self.elements as f64);
    }
}

/// Event emitted when elements complete classification.
pub struct ElementsClassified {
    pub count: u64,
}

impl InternalEvent for ElementsClassified {
    fn emit(self) {
        trace!(count = self.count, "Elements classified");
        counter!("squall_elements_classified_total").increment(self.count);
    }
}

/// Stage at which an element failure occurred.
#[derive(Debug, Clone, Copy)]
pub enum FailureStage {
    Decode,
    Classify,
    Append,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Decode => "decode",
            FailureStage::Classify => "classify",
            FailureStage::Append => "append",
        }
    }
}

/// Event emitted when an element fails and is skipped.
pub struct ElementFailed {
    pub stage: FailureStage,
}

impl InternalEvent for ElementFailed {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Element failed");
        counter!("squall_elements_failed_total", "stage" => self.stage.as_str()).increment(1);
    }
}

/// Event emitted when rows are appended to the sink.
pub struct RowsAppended {
    pub count: u64,
}

impl InternalEvent for RowsAppended {
    fn emit(self) {
        trace!(count = self.count, "Rows appended");
        counter!("squall_rows_appended_total").increment(self.count);
    }
}

// ============================================================================
// Histogram events for timing
// ============================================================================

/// Event emitted when a classifier call completes.
pub struct InferenceCompleted {
    pub duration: Duration,
}

impl InternalEvent for InferenceCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Inference completed"
        );
        histogram!("squall_inference_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a sink append completes.
pub struct SinkAppendCompleted {
    pub duration: Duration,
}

impl InternalEvent for SinkAppendCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Sink append completed"
        );
        histogram!("squall_sink_append_duration_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Gauge events for concurrency and backpressure
// ============================================================================

/// Event emitted when the number of open windows changes.
pub struct OpenWindows {
    pub count: usize,
}

impl InternalEvent for OpenWindows {
    fn emit(self) {
        trace!(count = self.count, "Open windows");
        gauge!("squall_open_windows").set(self.count as f64);
    }
}

/// Event emitted when the classification queue depth changes.
pub struct ClassifyQueueDepth {
    pub count: usize,
}

impl InternalEvent for ClassifyQueueDepth {
    fn emit(self) {
        trace!(count = self.count, "Classify queue depth");
        gauge!("squall_classify_queue_depth").set(self.count as f64);
    }
}
