//! Squall CLI: windowed streaming sentiment pipeline.

use std::sync::Arc;

use clap::Parser;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use squall::config::{
    Config, MessagingConfig, MetricsConfig, ModelConfig, RunConfig, SinkConfig, SourceConfig,
    WindowSettings,
};
use squall::error::{
    AddressParseSnafu, ConfigSnafu, InferenceSnafu, MetricsSnafu, PipelineError,
};
use squall::inference::{InferenceStage, LinearClassifier, Tokenizer};
use squall::sink::JsonlSink;
use squall::{run_pipeline, shutdown_signal, InMemoryBroker, RunOutcome};

#[derive(Debug, Parser)]
#[command(name = "squall", about = "Windowed streaming sentiment pipeline")]
struct Args {
    /// Path to the input file of UTF-8 lines.
    #[arg(long)]
    input: String,

    /// Path to the output table directory.
    #[arg(long)]
    output_table: String,

    /// Path to the vocabulary file (one token per line).
    #[arg(long)]
    model_path: String,

    /// Path to the classifier weights file.
    #[arg(long)]
    model_weights: String,

    /// Project identifier for messaging resource paths.
    #[arg(long, default_value = "local")]
    project: String,

    /// Topic name or fully qualified topic path.
    #[arg(long, default_value = "sentiment-lines")]
    topic: String,

    /// Subscription name or fully qualified subscription path.
    #[arg(long, default_value = "sentiment-lines-sub")]
    subscription: String,

    /// Window size in milliseconds.
    #[arg(long, default_value_t = 60_000)]
    window_size_ms: u64,

    /// Trigger delay in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    trigger_delay_ms: u64,

    /// Wall-clock deadline for the run in seconds.
    #[arg(long, default_value_t = 3 * 60 * 60)]
    deadline_secs: u64,

    /// Number of concurrent inference workers.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Log level filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable the Prometheus metrics endpoint.
    #[arg(long)]
    no_metrics: bool,

    /// Address for the Prometheus metrics endpoint.
    #[arg(long, default_value = "0.0.0.0:9090")]
    metrics_address: String,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            source: SourceConfig { path: self.input },
            model: ModelConfig {
                vocab_path: self.model_path,
                weights_path: self.model_weights,
            },
            messaging: MessagingConfig {
                project: self.project,
                topic: self.topic,
                subscription: self.subscription,
            },
            sink: SinkConfig {
                table: self.output_table,
            },
            window: WindowSettings {
                size_ms: self.window_size_ms,
                trigger_delay_ms: self.trigger_delay_ms,
            },
            run: RunConfig {
                deadline_secs: self.deadline_secs,
                inference_workers: self.workers,
                ..RunConfig::default()
            },
            metrics: MetricsConfig {
                enabled: !self.no_metrics,
                address: self.metrics_address,
            },
        }
    }
}

fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = args.into_config();
    config.validate().context(ConfigSnafu)?;

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        squall::metrics::init(addr).context(MetricsSnafu)?;
        info!(address = %config.metrics.address, "Metrics endpoint started");
    }

    let tokenizer = Tokenizer::from_file(&config.model.vocab_path).context(InferenceSnafu)?;
    let classifier = LinearClassifier::from_file(&config.model.weights_path, tokenizer.vocab_size())
        .context(InferenceSnafu)?;
    let stage = Arc::new(InferenceStage::new(tokenizer, Arc::new(classifier)));

    let broker = Arc::new(InMemoryBroker::new());
    let sink = Arc::new(JsonlSink::new(&config.sink.table));

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.cancel();
    });

    let report = run_pipeline(&config, broker, stage, sink, shutdown).await?;

    match report.outcome {
        RunOutcome::Completed => info!("Run completed"),
        RunOutcome::DeadlineExceeded => info!("Run stopped at deadline"),
        RunOutcome::Interrupted => info!("Run interrupted by signal"),
    }
    info!(
        lines_published = report.stats.lines_published,
        messages_consumed = report.stats.messages_consumed,
        late_dropped = report.stats.late_dropped,
        windows_fired = report.stats.windows_fired,
        elements_classified = report.stats.elements_classified,
        elements_failed = report.stats.elements_failed,
        rows_appended = report.stats.rows_appended,
        "Run summary"
    );

    Ok(())
}
