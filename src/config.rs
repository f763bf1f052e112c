//! Pipeline configuration.
//!
//! All values are supplied at startup (one flag per value, assembled by
//! `main`) and never mutated at runtime. Window and deadline knobs carry
//! the production defaults but stay configurable so tests can shrink them.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::time::Duration;

use crate::error::{
    ConfigError, EmptyInputPathSnafu, EmptyOutputTableSnafu, EmptyProjectSnafu,
    ZeroTriggerDelaySnafu, ZeroWindowSizeSnafu, ZeroWorkersSnafu,
};

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub model: ModelConfig,
    pub messaging: MessagingConfig,
    pub sink: SinkConfig,
    /// Windowing configuration (optional, production defaults).
    #[serde(default)]
    pub window: WindowSettings,
    /// Run configuration (optional, production defaults).
    #[serde(default)]
    pub run: RunConfig,
    /// Metrics configuration (optional, enabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Source configuration for the bounded text input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the input file of UTF-8 lines.
    pub path: String,
}

/// Model artifact locations for the classifier collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the vocabulary file (one token per line).
    pub vocab_path: String,
    /// Path to the classifier weights file.
    pub weights_path: String,
}

/// Messaging channel resource names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Project identifier used to build fully qualified resource paths.
    pub project: String,
    /// Topic name or fully qualified topic path.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Subscription name or fully qualified subscription path.
    #[serde(default = "default_subscription")]
    pub subscription: String,
}

fn default_topic() -> String {
    "sentiment-lines".to_string()
}

fn default_subscription() -> String {
    "sentiment-lines-sub".to_string()
}

/// Sink configuration for the analytical output table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Path to the output table.
    pub table: String,
}

/// Fixed-window and trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSettings {
    /// Window size in milliseconds (default: 60s).
    #[serde(default = "default_window_size_ms")]
    pub size_ms: u64,
    /// Processing-time trigger delay in milliseconds (default: 30s).
    /// Fires this long after the first element buffered since the last
    /// firing, repeating while the window stays open.
    #[serde(default = "default_trigger_delay_ms")]
    pub trigger_delay_ms: u64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            size_ms: default_window_size_ms(),
            trigger_delay_ms: default_trigger_delay_ms(),
        }
    }
}

fn default_window_size_ms() -> u64 {
    60_000
}

fn default_trigger_delay_ms() -> u64 {
    30_000
}

impl WindowSettings {
    pub fn size(&self) -> Duration {
        Duration::from_millis(self.size_ms)
    }

    pub fn trigger_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_delay_ms)
    }
}

/// Run-level configuration: deadline, shutdown grace, worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Wall-clock deadline for the whole run in seconds (default: 3 hours).
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Grace period for draining in-flight work after cancellation (default: 30s).
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Number of concurrent inference workers (default: 4).
    #[serde(default = "default_inference_workers")]
    pub inference_workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            grace_secs: default_grace_secs(),
            inference_workers: default_inference_workers(),
        }
    }
}

fn default_deadline_secs() -> u64 {
    3 * 60 * 60
}

fn default_grace_secs() -> u64 {
    30
}

fn default_inference_workers() -> usize {
    4
}

impl RunConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.path.is_empty(), EmptyInputPathSnafu);
        ensure!(!self.sink.table.is_empty(), EmptyOutputTableSnafu);
        ensure!(!self.messaging.project.is_empty(), EmptyProjectSnafu);
        ensure!(self.window.size_ms > 0, ZeroWindowSizeSnafu);
        ensure!(self.window.trigger_delay_ms > 0, ZeroTriggerDelaySnafu);
        ensure!(self.run.inference_workers > 0, ZeroWorkersSnafu);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            source: SourceConfig {
                path: "/data/input.txt".to_string(),
            },
            model: ModelConfig {
                vocab_path: "/models/vocab.txt".to_string(),
                weights_path: "/models/weights.json".to_string(),
            },
            messaging: MessagingConfig {
                project: "test-project".to_string(),
                topic: default_topic(),
                subscription: default_subscription(),
            },
            sink: SinkConfig {
                table: "/data/results".to_string(),
            },
            window: WindowSettings::default(),
            run: RunConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_window_defaults() {
        let settings = WindowSettings::default();
        assert_eq!(settings.size(), Duration::from_secs(60));
        assert_eq!(settings.trigger_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_run_defaults() {
        let run = RunConfig::default();
        assert_eq!(run.deadline(), Duration::from_secs(10800));
        assert_eq!(run.inference_workers, 4);
    }

    #[test]
    fn test_empty_input_rejected() {
        let mut config = base_config();
        config.source.path = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyInputPath)
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = base_config();
        config.window.size_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroWindowSize)));
    }
}
