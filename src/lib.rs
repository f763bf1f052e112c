//! squall: windowed streaming sentiment pipeline.
//!
//! Bridges a bounded text source through a pub/sub channel into fixed
//! processing windows, classifies each windowed element, and appends the
//! results to an analytical table. Modules:
//!
//! - `broker/` - Messaging channel abstraction and the in-memory backend
//! - `lifecycle` - Idempotent setup and teardown of messaging resources
//! - `ingest` - Bounded source to topic bridge
//! - `window/` - Fixed-window assignment and the triggered accumulator store
//! - `inference` - Tokenization and sentiment classification
//! - `sink/` - Analytical table abstraction and the JSONL backend
//! - `pipeline/` - Driver, background tasks, and signal handling
//! - `metrics/` - Prometheus metrics infrastructure
//! - `config` - Pipeline configuration
//! - `error` - Error types

pub mod broker;
pub mod config;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod lifecycle;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod window;

// Re-export commonly used items
pub use broker::{InMemoryBroker, Message, MessageBroker, Subscription, SubscriptionPath, TopicPath};
pub use config::Config;
pub use error::PipelineError;
pub use inference::{Classifier, InferenceStage, LinearClassifier, Sentiment, Tokenizer};
pub use ingest::IngestBridge;
pub use lifecycle::ResourceLifecycle;
pub use pipeline::{run_pipeline, signal::shutdown_signal, PipelineReport, PipelineStats, RunOutcome};
pub use sink::{AnalyticsSink, JsonlSink, MemorySink, SentimentRow, TableSchema};
pub use window::{WindowKey, WindowStore};
