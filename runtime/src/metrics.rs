//! Prometheus metrics for the consuming pipeline.
//!
//! - Records received and dropped (by reason)
//! - Events processed (by event type) and processing latency
//! - Event log, projection and publish failures
//!
//! # Example
//!
//! ```rust,no_run
//! use paysaga_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` from an HTTP handler at /metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Counter: records pulled off the stream.
pub const RECORDS_RECEIVED: &str = "paysaga_records_received_total";
/// Counter: records dropped before choreography, labelled by `reason`.
pub const RECORDS_DROPPED: &str = "paysaga_records_dropped_total";
/// Counter: failed event log appends.
pub const EVENT_LOG_FAILURES: &str = "paysaga_event_log_failures_total";
/// Counter: decoded events choreographed, labelled by `event_type`.
pub const EVENTS_PROCESSED: &str = "paysaga_events_processed_total";
/// Counter: failed projection writes, labelled by `operation`.
pub const PROJECTION_FAILURES: &str = "paysaga_projection_failures_total";
/// Counter: derived events that could not be published.
pub const PUBLISH_FAILURES: &str = "paysaga_publish_failures_total";
/// Histogram: time spent on one record, decode to last effect.
pub const RECORD_PROCESSING_DURATION: &str = "paysaga_record_processing_duration_seconds";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint will be bound to
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address of the scrape endpoint.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. by another test) this logs a
    /// warning and leaves [`render`](Self::render) returning `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
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

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(RECORDS_RECEIVED, "Total number of records read from the stream");
    describe_counter!(
        RECORDS_DROPPED,
        "Total number of records dropped because they could not be decoded"
    );
    describe_counter!(EVENT_LOG_FAILURES, "Total number of failed event log appends");
    describe_counter!(EVENTS_PROCESSED, "Total number of events choreographed");
    describe_counter!(PROJECTION_FAILURES, "Total number of failed projection writes");
    describe_counter!(
        PUBLISH_FAILURES,
        "Total number of derived events that could not be published"
    );
    describe_histogram!(
        RECORD_PROCESSING_DURATION,
        "Time taken to process one stream record"
    );
}

/// Pipeline metrics recorder.
pub struct SagaMetrics;

impl SagaMetrics {
    /// Record a record read from the stream.
    pub fn record_received() {
        counter!(RECORDS_RECEIVED).increment(1);
    }

    /// Record a dropped record.
    pub fn record_dropped(reason: &'static str) {
        counter!(RECORDS_DROPPED, "reason" => reason).increment(1);
    }

    /// Record a failed event log append.
    pub fn record_event_log_failure() {
        counter!(EVENT_LOG_FAILURES).increment(1);
    }

    /// Record a choreographed event and how long its record took.
    pub fn record_processed(event_type: &'static str, duration: Duration) {
        counter!(EVENTS_PROCESSED, "event_type" => event_type).increment(1);
        histogram!(RECORD_PROCESSING_DURATION).record(duration.as_secs_f64());
    }

    /// Record a failed projection write.
    pub fn record_projection_failure(operation: &'static str) {
        counter!(PROJECTION_FAILURES, "operation" => operation).increment(1);
    }

    /// Record a failed publish.
    pub fn record_publish_failure() {
        counter!(PUBLISH_FAILURES).increment(1);
    }
}
