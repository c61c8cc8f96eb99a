//! Prometheus metrics for the partition runtime.
//!
//! - Commands processed, rejected and timed per intent
//! - Events written to the log
//! - Cross-partition subscription commands sent and failed
//! - Messages expired by the TTL checker
//!
//! # Example
//!
//! ```rust,no_run
//! use correlation_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use correlation_core::ProcessingResult;
use correlation_core::record::{Intent, MessageIntent};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics recorder
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or the recorder cannot
    /// be installed. An already installed recorder is tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                self.handle = Some(handle);
                tokio::spawn(async move {
                    if let Err(_error) = exporter.await {
                        // ExporterError (metrics-exporter-prometheus 0.15) implements neither Display nor Debug.
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "correlation_commands_processed_total",
        "Total number of commands processed by partitions"
    );
    describe_counter!(
        "correlation_events_written_total",
        "Total number of events appended to the log"
    );
    describe_counter!(
        "correlation_command_rejections_total",
        "Total number of commands rejected"
    );
    describe_histogram!(
        "correlation_processing_duration_seconds",
        "Time taken to process one command, including log append and commit"
    );
    describe_counter!(
        "subscription_commands_sent_total",
        "Total number of cross-partition subscription commands attempted"
    );
    describe_counter!(
        "subscription_commands_failed_total",
        "Total number of cross-partition subscription commands that could not be enqueued"
    );
    describe_counter!(
        "messages_expired_total",
        "Total number of buffered messages expired"
    );
}

/// Partition metrics recorder.
pub struct CorrelationMetrics;

impl CorrelationMetrics {
    /// Record one processed command and everything it produced.
    pub fn record_command(intent: Intent, result: &ProcessingResult, duration: Duration) {
        let name = intent.name();
        counter!("correlation_commands_processed_total", "intent" => name).increment(1);
        histogram!("correlation_processing_duration_seconds", "intent" => name)
            .record(duration.as_secs_f64());

        if result.rejection.is_some() {
            counter!("correlation_command_rejections_total", "intent" => name).increment(1);
        }

        counter!("correlation_events_written_total").increment(result.events.len() as u64);
        counter!("subscription_commands_sent_total").increment(result.sends.attempted as u64);
        counter!("subscription_commands_failed_total").increment(result.sends.failed as u64);

        let expired = result
            .events
            .iter()
            .filter(|event| event.intent == Intent::Message(MessageIntent::Expired))
            .count();
        if expired > 0 {
            counter!("messages_expired_total").increment(expired as u64);
        }
    }
}
