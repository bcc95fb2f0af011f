//! Metric definitions for the instrumentation layer.
//!
//! Naming follows Prometheus conventions: `agent_middleware_` prefix,
//! `_total` for counters, `_seconds` for duration histograms.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// How a request left the instrumentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handler returned a non 4xx response.
    Success,
    /// Handler returned a 400-499 status.
    ClientError,
    /// Handler returned an error or panicked.
    Failure,
    /// The transaction could not be started; the handler ran uninstrumented.
    Skipped,
    /// The request future was dropped while its transaction was open.
    Cancelled,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ClientError => "client_error",
            Outcome::Failure => "failure",
            Outcome::Skipped => "skipped",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// Install the Prometheus recorder and return the handle used to render
/// the `/metrics` endpoint.
///
/// # Errors
///
/// Returns an error if bucket configuration fails or a global recorder is
/// already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("agent_middleware_transaction_duration_seconds".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set transaction duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record a request that passed through the layer.
///
/// Metric: `agent_middleware_transactions_total`,
/// `agent_middleware_transaction_duration_seconds`
/// Labels: `outcome`
pub fn record_transaction(outcome: Outcome, duration: Duration) {
    counter!("agent_middleware_transactions_total", "outcome" => outcome.as_str())
        .increment(1);
    histogram!("agent_middleware_transaction_duration_seconds", "outcome" => outcome.as_str())
        .record(duration.as_secs_f64());
}

/// Record a request the layer could not start a transaction for.
///
/// Metric: `agent_middleware_transactions_total`
/// Labels: `outcome` (always `skipped`)
pub fn record_transaction_skipped() {
    counter!("agent_middleware_transactions_total", "outcome" => Outcome::Skipped.as_str())
        .increment(1);
}

/// Record an agent call whose error was logged and absorbed.
///
/// Metric: `agent_middleware_agent_call_failures_total`
/// Labels: `operation`
pub fn record_agent_call_failure(operation: &'static str) {
    counter!("agent_middleware_agent_call_failures_total", "operation" => operation)
        .increment(1);
}

/// Metric: `agent_middleware_instrumentation_enabled`
pub fn set_instrumentation_enabled(enabled: bool) {
    gauge!("agent_middleware_instrumentation_enabled").set(if enabled { 1.0 } else { 0.0 });
}
