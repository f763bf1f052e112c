//! Error types for Squall using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Broker Errors ============

/// Errors that can occur during messaging broker operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BrokerError {
    /// Topic does not exist.
    #[snafu(display("Topic not found: {name}"))]
    TopicNotFound { name: String },

    /// Subscription does not exist.
    #[snafu(display("Subscription not found: {name}"))]
    SubscriptionNotFound { name: String },

    /// Topic already exists.
    #[snafu(display("Topic already exists: {name}"))]
    TopicExists { name: String },

    /// Subscription already exists.
    #[snafu(display("Subscription already exists: {name}"))]
    SubscriptionExists { name: String },

    /// Subscription receiver was already taken by another consumer.
    #[snafu(display("Subscription already attached: {name}"))]
    SubscriptionAttached { name: String },
}

impl BrokerError {
    /// Check if this error represents a "not found" condition.
    ///
    /// Lifecycle management treats not-found as a normal outcome
    /// (resource already absent), not a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BrokerError::TopicNotFound { .. } | BrokerError::SubscriptionNotFound { .. }
        )
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input path is empty.
    #[snafu(display("Input path cannot be empty"))]
    EmptyInputPath,

    /// Output table path is empty.
    #[snafu(display("Output table path cannot be empty"))]
    EmptyOutputTable,

    /// Project identifier is empty.
    #[snafu(display("Project identifier cannot be empty"))]
    EmptyProject,

    /// Window size must be positive.
    #[snafu(display("Window size must be greater than zero"))]
    ZeroWindowSize,

    /// Trigger delay must be positive.
    #[snafu(display("Trigger delay must be greater than zero"))]
    ZeroTriggerDelay,

    /// At least one inference worker is required.
    #[snafu(display("Inference worker count must be greater than zero"))]
    ZeroWorkers,
}

// ============ Ingest Errors ============

/// Errors that can occur while bridging the bounded source into the topic.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// Failed to open the input file.
    #[snafu(display("Failed to open input {path}"))]
    OpenInput {
        source: std::io::Error,
        path: String,
    },

    /// Failed to read a line from the input.
    #[snafu(display("Failed to read line from input"))]
    ReadLine { source: std::io::Error },

    /// Failed to publish a line to the topic.
    #[snafu(display("Failed to publish line"))]
    Publish { source: BrokerError },
}

// ============ Inference Errors ============

/// Errors that can occur during tokenization and classification.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum InferenceError {
    /// Failed to read the vocabulary file.
    #[snafu(display("Failed to read vocabulary {path}"))]
    VocabRead {
        source: std::io::Error,
        path: String,
    },

    /// Vocabulary file contained no tokens.
    #[snafu(display("Vocabulary {path} is empty"))]
    EmptyVocab { path: String },

    /// Failed to read the model weights file.
    #[snafu(display("Failed to read model weights {path}"))]
    WeightsRead {
        source: std::io::Error,
        path: String,
    },

    /// Failed to parse the model weights file.
    #[snafu(display("Failed to parse model weights"))]
    WeightsParse { source: serde_json::Error },

    /// Weight matrix does not cover the vocabulary.
    #[snafu(display("Weight matrix has {actual} rows, expected {expected}"))]
    WeightsShape { expected: usize, actual: usize },

    /// Classifier returned the wrong number of scores.
    #[snafu(display("Classifier returned {actual} scores, expected {expected}"))]
    ScoreShape { expected: usize, actual: usize },
}

// ============ Sink Errors ============

/// Errors that can occur while writing to the analytical sink.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Failed to create the table directory.
    #[snafu(display("Failed to create table at {path}"))]
    CreateTable {
        source: std::io::Error,
        path: String,
    },

    /// Failed to serialize the table schema.
    #[snafu(display("Failed to serialize table schema"))]
    SchemaSerialize { source: serde_json::Error },

    /// Failed to serialize a result row.
    #[snafu(display("Failed to serialize result row"))]
    RowSerialize { source: serde_json::Error },

    /// Failed to append rows to the table.
    #[snafu(display("Failed to append rows to {path}"))]
    Append {
        source: std::io::Error,
        path: String,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Messaging resource lifecycle error during ensure.
    #[snafu(display("Failed to ensure messaging resources"))]
    Lifecycle { source: BrokerError },

    /// Broker error outside of lifecycle management.
    #[snafu(display("Broker error"))]
    Broker { source: BrokerError },

    /// Ingest error.
    #[snafu(display("Ingest error"))]
    Ingest { source: IngestError },

    /// Inference error.
    #[snafu(display("Inference error"))]
    Inference { source: InferenceError },

    /// Sink error.
    #[snafu(display("Sink error"))]
    Sink { source: SinkError },

    /// Task join error.
    #[snafu(display("Task join error"))]
    TaskJoin { source: tokio::task::JoinError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}
