// Telemetry module for structured logging and metrics

use crate::config::{LogFormat, ObservabilityConfig};
use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence over the configured level. JSON output
/// carries the current span (and so the cycle's batch id) on every event.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::debug!(
        log_level = %config.log_level,
        log_format = ?config.log_format,
        "Structured logging initialized"
    );

    Ok(())
}

/// Initialize the Prometheus metrics exporter and describe all metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("filesync_cycles_total", "Sync cycles run, by outcome");
    describe_counter!(
        "filesync_workflows_created_total",
        "Workflows created in the backend"
    );
    describe_counter!(
        "filesync_workflows_skipped_total",
        "Candidates skipped because their workflow already existed"
    );
    describe_counter!(
        "filesync_candidate_failures_total",
        "Candidates that failed submission, by reason"
    );
    describe_gauge!(
        "filesync_watermark_seconds",
        "Last persisted watermark as epoch seconds"
    );
    describe_histogram!(
        "filesync_cycle_duration_seconds",
        "Duration of sync cycles in seconds"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_cycle(outcome: &'static str, duration_seconds: f64) {
    counter!("filesync_cycles_total", "outcome" => outcome).increment(1);
    histogram!("filesync_cycle_duration_seconds", "outcome" => outcome).record(duration_seconds);
}

#[inline]
pub fn record_workflow_created(workflow_type: &str) {
    counter!("filesync_workflows_created_total", "workflow" => workflow_type.to_string())
        .increment(1);
}

#[inline]
pub fn record_workflow_skipped() {
    counter!("filesync_workflows_skipped_total").increment(1);
}

#[inline]
pub fn record_candidate_failure(reason: &'static str) {
    counter!("filesync_candidate_failures_total", "reason" => reason).increment(1);
}

#[inline]
pub fn record_watermark(watermark: DateTime<Utc>) {
    gauge!("filesync_watermark_seconds").set(watermark.timestamp_millis() as f64 / 1000.0);
}
